use adafem::assembly::forms::{
    BoundarySourceForm, IntegralFunctional, JumpPenaltyForm, LaplaceForm, MassForm, MeasureFunctional, SourceForm,
};
use adafem::assembly::{assemble, Assembler, AssemblyDomains, AssemblyError, AssemblyOptions, Form};
use adafem::element::LagrangeElement;
use adafem::function::{Coefficient, Constant, DiscreteFunction, Expression, FunctionSpace};
use adafem::la::{GenericMatrix, ScalarTensor};
use adafem::mesh::function::MeshFunction;
use adafem::mesh::procedural::{create_unit_cube_mesh, create_unit_square_mesh};
use adafem::mesh::{CellType, TriangleMesh2d};
use adafem::proptest::{perturbed_unit_square_mesh, unit_square_mesh};
use adafem::timing::Timings;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Point2, U2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use proptest::prelude::*;
use std::sync::Arc;

fn assemble_matrix(form: &dyn Form<f64, U2>, mesh: &TriangleMesh2d<f64>) -> CsrMatrix<f64> {
    let mut matrix = CsrMatrix::<f64>::identity(1);
    assemble(&mut matrix, form, mesh, &[], &mut Timings::new()).unwrap();
    matrix
}

fn assemble_scalar(
    form: &dyn Form<f64, U2>,
    mesh: &TriangleMesh2d<f64>,
    coefficients: &[&dyn Coefficient<f64, U2>],
) -> f64 {
    let mut scalar = ScalarTensor::<f64>::new();
    assemble(&mut scalar, form, mesh, coefficients, &mut Timings::new()).unwrap();
    scalar.value
}

fn assemble_load(mesh: &TriangleMesh2d<f64>, coefficient: &dyn Coefficient<f64, U2>) -> DVector<f64> {
    let mut load = DVector::<f64>::zeros(0);
    let form = SourceForm::new(CellType::Triangle);
    assemble(&mut load, &form, mesh, &[coefficient], &mut Timings::new()).unwrap();
    load
}

fn interior_facet_length() -> f64 {
    // Four axis-aligned edges of length 1/2 and four diagonals of length sqrt(2)/2
    2.0 + 2.0 * 2.0f64.sqrt()
}

#[test]
fn laplace_matrix_on_unit_square() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let mut matrix = CsrMatrix::<f64>::identity(1);
    let mut timings = Timings::new();
    assemble(&mut matrix, &LaplaceForm::new(CellType::Triangle), &mesh, &[], &mut timings).unwrap();

    assert_eq!(matrix.nrows(), 9);
    assert_eq!(matrix.nnz(), 41);
    let dense = DMatrix::from(&matrix);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-14);
    for row in dense.row_iter() {
        assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-14);
    }
    // The center row is the five-point stencil
    assert_scalar_eq!(GenericMatrix::get(&matrix, 4, 4), 4.0, comp = abs, tol = 1e-14);
    for neighbor in [1, 3, 5, 7] {
        assert_scalar_eq!(GenericMatrix::get(&matrix, 4, neighbor), -1.0, comp = abs, tol = 1e-14);
    }
    assert_scalar_eq!(GenericMatrix::get(&matrix, 4, 0), 0.0, comp = abs, tol = 1e-14);
    assert_eq!(GenericMatrix::get(&matrix, 0, 8), 0.0);

    let eigenvalues = dense.symmetric_eigenvalues();
    assert!(eigenvalues.iter().all(|&lambda| lambda > -1e-12));

    assert!(timings.contains("assembly: initialization"));
    assert!(timings.contains("assembly: cells"));
    assert!(!timings.contains("assembly: interior facets"));
}

#[test]
fn mass_matrix_on_unit_square() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let matrix = assemble_matrix(&MassForm::new(CellType::Triangle, 1.0), &mesh);
    let dense = DMatrix::from(&matrix);
    assert_scalar_eq!(dense.sum(), 1.0, comp = abs, tol = 1e-14);
    // Vertex 0 touches two cells, vertex 2 only one
    assert_scalar_eq!(dense.row(0).sum(), 1.0 / 12.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(dense.row(2).sum(), 1.0 / 24.0, comp = abs, tol = 1e-14);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-14);

    let heavy = MassForm::new(CellType::Triangle, 2.0);
    assert_eq!(heavy.density(), 2.0);
    let dense = DMatrix::from(&assemble_matrix(&heavy, &mesh));
    assert_scalar_eq!(dense.sum(), 2.0, comp = abs, tol = 1e-14);
}

#[test]
fn forms_on_tetrahedra() {
    let mesh = create_unit_cube_mesh::<f64>(1, 1, 1);
    let mut stiffness = CsrMatrix::<f64>::identity(1);
    assemble(&mut stiffness, &LaplaceForm::new(CellType::Tetrahedron), &mesh, &[], &mut Timings::new()).unwrap();
    let stiffness = DMatrix::from(&stiffness);
    assert_eq!(stiffness.nrows(), 8);
    for row in stiffness.row_iter() {
        assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-13);
    }

    let mut mass = DMatrix::<f64>::zeros(0, 0);
    assemble(&mut mass, &MassForm::new(CellType::Tetrahedron, 1.0), &mesh, &[], &mut Timings::new()).unwrap();
    assert_scalar_eq!(mass.sum(), 1.0, comp = abs, tol = 1e-13);

    let mut area = ScalarTensor::<f64>::new();
    assemble(&mut area, &MeasureFunctional::boundary_area(), &mesh, &[], &mut Timings::new()).unwrap();
    assert_scalar_eq!(area.value, 6.0, comp = abs, tol = 1e-13);
}

#[test]
fn sparse_and_dense_backends_agree() {
    let mesh = create_unit_square_mesh::<f64>(3, 2);
    let form = LaplaceForm::new(CellType::Triangle);
    let csr = assemble_matrix(&form, &mesh);

    let mut coo = CooMatrix::<f64>::new(0, 0);
    assemble(&mut coo, &form, &mesh, &[], &mut Timings::new()).unwrap();
    let mut dense = DMatrix::<f64>::zeros(0, 0);
    assemble(&mut dense, &form, &mesh, &[], &mut Timings::new()).unwrap();

    assert_matrix_eq!(DMatrix::from(&csr), DMatrix::from(&coo), comp = abs, tol = 1e-14);
    assert_matrix_eq!(DMatrix::from(&csr), dense, comp = abs, tol = 1e-14);
}

#[test]
fn measures_of_cells_and_facets() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let volume = assemble_scalar(&MeasureFunctional::volume(), &mesh, &[]);
    assert_scalar_eq!(volume, 1.0, comp = abs, tol = 1e-14);
    let boundary = assemble_scalar(&MeasureFunctional::boundary_area(), &mesh, &[]);
    assert_scalar_eq!(boundary, 4.0, comp = abs, tol = 1e-14);

    let interior = MeasureFunctional {
        num_cell_integrals: 0,
        num_exterior_facet_integrals: 0,
        num_interior_facet_integrals: 1,
    };
    let length = assemble_scalar(&interior, &mesh, &[]);
    assert_scalar_eq!(length, interior_facet_length(), comp = abs, tol = 1e-14);
}

#[test]
fn sub_domain_markers_select_integrals() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    // Cells 0..4 form the lower half and keep marker 0, the rest use a nonexistent integral
    let mut cell_markers = MeshFunction::new(&mesh, 2, 1usize);
    cell_markers.values_mut()[..4].iter_mut().for_each(|marker| *marker = 0);
    let domains = AssemblyDomains {
        cells: Some(&cell_markers),
        ..Default::default()
    };
    let assembler = Assembler::default();
    let mut scalar = ScalarTensor::<f64>::new();
    assembler
        .assemble(&mut scalar, &MeasureFunctional::volume(), &mesh, &[], &domains, &mut Timings::new())
        .unwrap();
    assert_scalar_eq!(scalar.value, 0.5, comp = abs, tol = 1e-14);

    // Two cell integrals: marker 1 is now valid as well
    let two_integrals = MeasureFunctional {
        num_cell_integrals: 2,
        num_exterior_facet_integrals: 0,
        num_interior_facet_integrals: 0,
    };
    assembler
        .assemble(&mut scalar, &two_integrals, &mesh, &[], &domains, &mut Timings::new())
        .unwrap();
    assert_scalar_eq!(scalar.value, 1.0, comp = abs, tol = 1e-14);

    let wrong = MeshFunction::new(&mesh, 1, 0usize);
    let domains = AssemblyDomains {
        cells: Some(&wrong),
        ..Default::default()
    };
    let error = assembler
        .assemble(&mut scalar, &MeasureFunctional::volume(), &mesh, &[], &domains, &mut Timings::new())
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<AssemblyError>(),
        Some(&AssemblyError::DomainMismatch {
            kind: "cell",
            expected_dim: 2,
            actual_dim: 1,
            expected_len: 8,
            actual_len: 16,
        })
    );
}

#[test]
fn load_vectors_and_integrals() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let one = Constant::scalar(1.0);
    let coefficients: [&dyn Coefficient<f64, U2>; 1] = [&one];

    let mut load = DVector::<f64>::zeros(0);
    assemble(&mut load, &SourceForm::new(CellType::Triangle), &mesh, &coefficients, &mut Timings::new()).unwrap();
    assert_eq!(load.len(), 9);
    assert_scalar_eq!(load.sum(), 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(load[2], 1.0 / 24.0, comp = abs, tol = 1e-14);

    let mut boundary_load = DVector::<f64>::zeros(0);
    let mut timings = Timings::new();
    assemble(
        &mut boundary_load,
        &BoundarySourceForm::new(CellType::Triangle),
        &mesh,
        &coefficients,
        &mut timings,
    )
    .unwrap();
    assert_scalar_eq!(boundary_load.sum(), 4.0, comp = abs, tol = 1e-14);
    assert_eq!(boundary_load[4], 0.0);
    assert!(timings.contains("assembly: exterior facets"));

    let f = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = x.x + x.y);
    let integral = assemble_scalar(&IntegralFunctional::new(CellType::Triangle), &mesh, &[&f]);
    assert_scalar_eq!(integral, 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn discrete_functions_as_coefficients() {
    let mesh = Arc::new(create_unit_square_mesh::<f64>(2, 2));
    let space = FunctionSpace::new(Arc::clone(&mesh), Arc::new(LagrangeElement::new(CellType::Triangle, 1)));
    let f = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = 2.0 * x.x);
    let u = DiscreteFunction::interpolate(space, &f);
    let integral = assemble_scalar(&IntegralFunctional::new(CellType::Triangle), &mesh, &[&u]);
    assert_scalar_eq!(integral, 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn jump_penalty_on_interior_facets() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);

    // Continuous functions do not jump
    let mut timings = Timings::new();
    let mut matrix = CsrMatrix::<f64>::identity(1);
    assemble(&mut matrix, &JumpPenaltyForm::new(CellType::Triangle, 1), &mesh, &[], &mut timings).unwrap();
    assert!(matrix.values().iter().all(|v| v.abs() < 1e-15));
    assert!(timings.contains("assembly: interior facets"));

    let matrix = assemble_matrix(&JumpPenaltyForm::new(CellType::Triangle, 0), &mesh);
    let dense = DMatrix::from(&matrix);
    assert_eq!(dense.nrows(), 8);
    assert_scalar_eq!(dense.trace(), 2.0 * interior_facet_length(), comp = abs, tol = 1e-13);
    for row in dense.row_iter() {
        assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-14);
    }
    // Cells 0 and 1 share the diagonal of the lower left square
    assert_scalar_eq!(dense[(0, 1)], -0.5f64.sqrt(), comp = abs, tol = 1e-14);
    assert_eq!(dense[(0, 2)], 0.0);
}

#[test]
fn repeated_assembly_without_reset_accumulates() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let form = LaplaceForm::new(CellType::Triangle);
    let reference = DMatrix::from(&assemble_matrix(&form, &mesh));

    let options = AssemblyOptions { reset_tensor: false };
    let assembler = Assembler::new(options);
    assert_eq!(assembler.options(), &options);
    let mut matrix = DMatrix::<f64>::zeros(9, 9);
    for _ in 0..2 {
        assembler
            .assemble(&mut matrix, &form, &mesh, &[], &AssemblyDomains::default(), &mut Timings::new())
            .unwrap();
    }
    assert_matrix_eq!(matrix, 2.0 * reference, comp = abs, tol = 1e-14);
}

#[test]
fn invalid_arguments_are_reported() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);

    let mut vector = DVector::<f64>::zeros(0);
    let error = assemble(&mut vector, &SourceForm::new(CellType::Triangle), &mesh, &[], &mut Timings::new())
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<AssemblyError>(),
        Some(&AssemblyError::CoefficientCountMismatch { expected: 1, actual: 0 })
    );

    let error = assemble(&mut vector, &LaplaceForm::new(CellType::Triangle), &mesh, &[], &mut Timings::new())
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<AssemblyError>(),
        Some(&AssemblyError::RankMismatch {
            form_rank: 2,
            tensor_rank: 1
        })
    );

    let mut matrix = CsrMatrix::<f64>::identity(1);
    let error = assemble(&mut matrix, &LaplaceForm::new(CellType::Tetrahedron), &mesh, &[], &mut Timings::new())
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<AssemblyError>(),
        Some(AssemblyError::CellTypeMismatch {
            element_cell_type: CellType::Tetrahedron,
            mesh_cell_type: CellType::Triangle,
            ..
        })
    ));

    let assembler = Assembler::new(AssemblyOptions { reset_tensor: false });
    let mut matrix = DMatrix::<f64>::zeros(3, 3);
    let error = assembler
        .assemble(
            &mut matrix,
            &LaplaceForm::new(CellType::Triangle),
            &mesh,
            &[],
            &AssemblyDomains::default(),
            &mut Timings::new(),
        )
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<AssemblyError>(),
        Some(&AssemblyError::TensorDimensionMismatch {
            expected: vec![9, 9],
            actual: vec![3, 3]
        })
    );
    // Validation happens before the tensor is touched
    assert_eq!(matrix, DMatrix::zeros(3, 3));
}

#[test]
fn assembly_options_serialization() {
    let options = AssemblyOptions { reset_tensor: false };
    let json = serde_json::to_string(&options).unwrap();
    assert_eq!(serde_json::from_str::<AssemblyOptions>(&json).unwrap(), options);
    assert!(AssemblyOptions::default().reset_tensor);
}

proptest! {
    #[test]
    fn stiffness_and_mass_invariants(mesh in unit_square_mesh()) {
        let stiffness = DMatrix::from(&assemble_matrix(&LaplaceForm::new(CellType::Triangle), &mesh));
        for row in stiffness.row_iter() {
            prop_assert!(row.sum().abs() < 1e-12);
        }
        let mass = DMatrix::from(&assemble_matrix(&MassForm::new(CellType::Triangle, 1.0), &mesh));
        prop_assert!((mass.sum() - 1.0).abs() < 1e-12);
        prop_assert!(mass.iter().all(|&m| m >= 0.0));
    }

    #[test]
    fn stiffness_annihilates_linear_functions_in_the_interior(mesh in perturbed_unit_square_mesh()) {
        let stiffness = DMatrix::from(&assemble_matrix(&LaplaceForm::new(CellType::Triangle), &mesh));
        let u = DVector::from_iterator(mesh.num_vertices(), mesh.vertices().iter().map(|x| 2.0 * x.x - x.y + 1.0));
        let residual = &stiffness * u;
        let boundary = mesh.topology().boundary_vertices();
        for v in 0..mesh.num_vertices() {
            if boundary.binary_search(&v).is_err() {
                prop_assert!(residual[v].abs() < 1e-10);
            }
        }
    }

    #[test]
    fn assembly_is_linear_in_the_coefficients(
        mesh in perturbed_unit_square_mesh(),
        a in -10.0..10.0f64,
        b in -10.0..10.0f64,
    ) {
        let f = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = x.x * x.y + 1.0);
        let g = Expression::new(1, |values: &mut [f64], x: &Point2<f64>| values[0] = x.y * x.y - x.x);
        let combined = Expression::new(1, move |values: &mut [f64], x: &Point2<f64>| {
            values[0] = a * (x.x * x.y + 1.0) + b * (x.y * x.y - x.x)
        });

        let expected = assemble_load(&mesh, &f) * a + assemble_load(&mesh, &g) * b;
        let load = assemble_load(&mesh, &combined);
        prop_assert!((load - expected).amax() < 1e-12);

        let functional = IntegralFunctional::new(CellType::Triangle);
        let expected = a * assemble_scalar(&functional, &mesh, &[&f]) + b * assemble_scalar(&functional, &mesh, &[&g]);
        let integral = assemble_scalar(&functional, &mesh, &[&combined]);
        prop_assert!((integral - expected).abs() < 1e-12);

        let c = Constant::scalar(a);
        let expected = a * assemble_load(&mesh, &Constant::scalar(1.0));
        prop_assert!((assemble_load(&mesh, &c) - expected).amax() < 1e-12);
    }
}
