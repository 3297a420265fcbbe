use adafem::element::{FiniteElement, LagrangeElement, MixedElement};
use adafem::function::{Coefficient, Constant, DiscreteFunction, Expression, FunctionSpace, ValueFunction};
use adafem::mesh::procedural::create_unit_square_mesh;
use adafem::mesh::CellType;
use adafem::proptest::point2;
use nalgebra::{DVector, Point2, U2};
use proptest::prelude::*;
use std::sync::Arc;

fn scalar_space(degree: usize) -> FunctionSpace<f64, U2> {
    let mesh = Arc::new(create_unit_square_mesh::<f64>(2, 2));
    FunctionSpace::new(mesh, Arc::new(LagrangeElement::new(CellType::Triangle, degree)))
}

#[test]
fn expression_and_constant_evaluation() {
    let f = Expression::new(2, |values: &mut [f64], x: &Point2<f64>| {
        values[0] = x.x * x.y;
        values[1] = x.x - x.y;
    });
    let mut values = [0.0; 2];
    f.eval(&mut values, &Point2::new(2.0, 3.0));
    assert_eq!(values, [6.0, -1.0]);
    assert_eq!(ValueFunction::<f64, U2>::value_dimension(&f), 2);

    let c = Constant::new(vec![1.0, 2.0, 3.0]);
    let mut values = [0.0; 3];
    ValueFunction::<f64, U2>::eval(&c, &mut values, &Point2::origin());
    assert_eq!(values, [1.0, 2.0, 3.0]);
    assert_eq!(Constant::scalar(4.0).values(), &[4.0]);
}

#[test]
fn linear_interpolation_takes_vertex_values() {
    let space = scalar_space(1);
    assert_eq!(space.dim(), 9);
    let f = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = x.x + 2.0 * x.y);
    let u = DiscreteFunction::interpolate(space.clone(), &f);

    for (v, vertex) in space.mesh().vertices().iter().enumerate() {
        assert!((u.values()[v] - (vertex.x + 2.0 * vertex.y)).abs() < 1e-14);
    }
    assert!((u.values()[4] - 1.5).abs() < 1e-14);

    // Cell 0 is the triangle (0, 0), (0.5, 0), (0.5, 0.5)
    let mut value = [0.0];
    u.eval_in_cell(&mut value, &Point2::new(0.3, 0.1), 0);
    assert!((value[0] - 0.5).abs() < 1e-14);
}

#[test]
fn quadratic_interpolation_is_exact_for_quadratics() {
    let space = scalar_space(2);
    let f = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = x.x * x.y + x.x * x.x);
    let u = DiscreteFunction::interpolate(space, &f);

    let x = Point2::new(0.3, 0.1);
    let mut value = [0.0];
    u.eval_in_cell(&mut value, &x, 0);
    assert!((value[0] - (0.03 + 0.09)).abs() < 1e-13);
}

#[test]
fn vector_interpolation_fills_component_blocks() {
    let mesh = Arc::new(create_unit_square_mesh::<f64>(2, 2));
    let scalar: Arc<dyn FiniteElement<f64, U2>> = Arc::new(LagrangeElement::new(CellType::Triangle, 1));
    let space = FunctionSpace::new(mesh, Arc::new(MixedElement::vector(scalar, 2)));
    let f = Expression::new(2, |values: &mut [f64], x: &Point2<f64>| {
        values[0] = x.x;
        values[1] = -x.y;
    });
    let u = DiscreteFunction::interpolate(space.clone(), &f);
    assert_eq!(u.values().len(), 18);
    for (v, vertex) in space.mesh().vertices().iter().enumerate() {
        assert_eq!(u.values()[v], vertex.x);
        assert_eq!(u.values()[9 + v], -vertex.y);
    }

    let mut values = [0.0; 2];
    u.eval_in_cell(&mut values, &Point2::new(0.3, 0.1), 0);
    assert!((values[0] - 0.3).abs() < 1e-14);
    assert!((values[1] + 0.1).abs() < 1e-14);

    let sub_space = space.sub_space(&[1]).unwrap();
    assert_eq!(sub_space.dim(), 9);
    assert_eq!(sub_space.dofmap().offset(), 9);
    assert!(space.sub_space(&[3]).is_err());
}

#[test]
fn restriction_to_cells() {
    let space = scalar_space(1);
    let f = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = x.x + x.y);
    let u = DiscreteFunction::interpolate(space.clone(), &f);
    let linear = LagrangeElement::new(CellType::Triangle, 1);
    let constant = LagrangeElement::new(CellType::Triangle, 0);

    // Same element: dof values are copied
    let mut local = [0.0; 3];
    u.restrict(&mut local, &linear, space.mesh(), 0);
    assert_eq!(local, [0.0, 0.5, 1.0]);

    // Other element: the function is interpolated, here at the centroid (1/3, 1/6)
    let mut local = [0.0];
    u.restrict(&mut local, &constant, space.mesh(), 0);
    assert!((local[0] - 0.5).abs() < 1e-14);

    // Value functions are interpolated directly
    let mut local = [0.0; 3];
    f.restrict(&mut local, &linear, space.mesh(), 0);
    assert_eq!(local, [0.0, 0.5, 1.0]);
}

#[test]
fn discrete_function_values() {
    let space = scalar_space(0);
    let mut u = DiscreteFunction::zeros(space.clone());
    assert_eq!(u.values(), &DVector::zeros(8));
    u.values_mut()[3] = 2.0;
    let mut value = [0.0];
    let x = space.mesh().cell_midpoint(3);
    u.eval_in_cell(&mut value, &x, 3);
    assert_eq!(value[0], 2.0);

    let w = DiscreteFunction::from_values(space, DVector::from_element(8, 1.0));
    assert_eq!(w.values().sum(), 8.0);
}

proptest! {
    #[test]
    fn linear_functions_are_reproduced(a in point2(), b in -10.0..10.0f64) {
        let space = scalar_space(1);
        let f = Expression::new(1, move |values: &mut [f64], x: &Point2<f64>| {
            values[0] = a.x * x.x + a.y * x.y + b
        });
        let u = DiscreteFunction::interpolate(space.clone(), &f);
        let mesh = space.mesh();
        for cell in 0..mesh.num_cells() {
            let x = mesh.cell_midpoint(cell);
            let mut value = [0.0];
            u.eval_in_cell(&mut value, &x, cell);
            let expected = a.x * x.x + a.y * x.y + b;
            prop_assert!((value[0] - expected).abs() < 1e-10 * (1.0 + expected.abs()));
        }
    }
}
