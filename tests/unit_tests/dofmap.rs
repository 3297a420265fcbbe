use adafem::dofmap::{build_sparsity_pattern, DofMap, DofMapError};
use adafem::element::{FiniteElement, LagrangeElement, MixedElement};
use adafem::mesh::procedural::{create_unit_cube_mesh, create_unit_square_mesh};
use adafem::mesh::CellType;
use adafem::proptest::unit_square_mesh;
use nalgebra::{Point2, U2};
use proptest::prelude::*;
use std::sync::Arc;

#[test]
fn linear_lagrange_dofs_follow_vertices() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let element = LagrangeElement::new(CellType::Triangle, 1);
    let dofmap = DofMap::build(&element, &mesh);

    assert_eq!(dofmap.global_dimension(), 9);
    assert_eq!(dofmap.local_dimension(), 3);
    assert_eq!(dofmap.num_cells(), 8);
    assert_eq!(dofmap.offset(), 0);
    assert_eq!(dofmap.tabulate_dofs(0), &[0, 1, 4]);
    assert_eq!(dofmap.tabulate_dofs(1), &[0, 3, 4]);
    // Facet i is opposite local vertex i
    assert_eq!(dofmap.tabulate_facet_dofs(0), &[1, 2]);
    assert_eq!(dofmap.tabulate_facet_dofs(1), &[0, 2]);
    assert_eq!(dofmap.tabulate_facet_dofs(2), &[0, 1]);
}

#[test]
fn quadratic_lagrange_dofs_include_edges() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let element = LagrangeElement::new(CellType::Triangle, 2);
    let dofmap = DofMap::build(&element, &mesh);
    assert_eq!(dofmap.global_dimension(), 9 + 16);
    assert_eq!(dofmap.local_dimension(), 6);
    // Vertex dofs first, then the midpoint of the opposite edge
    assert_eq!(dofmap.tabulate_facet_dofs(0), &[1, 2, 3]);

    let edge_dofs = &dofmap.tabulate_dofs(0)[3..];
    assert!(edge_dofs.iter().all(|&dof| (9..25).contains(&dof)));

    let coordinates = dofmap.tabulate_coordinates(&element, &mesh, 0);
    assert_eq!(coordinates.len(), 6);
    assert_eq!(coordinates[0], Point2::new(0.0, 0.0));
    assert_eq!(coordinates[3], Point2::new(0.5, 0.25));
    assert_eq!(coordinates[5], Point2::new(0.25, 0.0));
}

#[test]
fn constant_lagrange_dofs_follow_cells() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let element = LagrangeElement::new(CellType::Triangle, 0);
    let dofmap = DofMap::build(&element, &mesh);
    assert_eq!(dofmap.global_dimension(), 8);
    assert_eq!(dofmap.tabulate_dofs(5), &[5]);
    assert!(dofmap.tabulate_facet_dofs(0).is_empty());

    let coordinates = dofmap.tabulate_coordinates(&element, &mesh, 0);
    assert!((coordinates[0] - Point2::new(1.0 / 3.0, 1.0 / 6.0)).norm() < 1e-14);
}

#[test]
fn tetrahedron_dofs() {
    let mesh = create_unit_cube_mesh::<f64>(1, 1, 1);
    let linear = DofMap::build(&LagrangeElement::new(CellType::Tetrahedron, 1), &mesh);
    assert_eq!(linear.global_dimension(), 8);
    assert_eq!(linear.tabulate_facet_dofs(3), &[0, 1, 2]);

    let quadratic = DofMap::build(&LagrangeElement::new(CellType::Tetrahedron, 2), &mesh);
    assert_eq!(quadratic.global_dimension(), 8 + mesh.num_edges());
    assert_eq!(quadratic.local_dimension(), 10);
    assert_eq!(quadratic.tabulate_facet_dofs(0).len(), 6);
}

#[test]
fn vector_element_dofs_are_blocked() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let scalar: Arc<dyn FiniteElement<f64, U2>> = Arc::new(LagrangeElement::new(CellType::Triangle, 1));
    let element: Arc<dyn FiniteElement<f64, U2>> = Arc::new(MixedElement::vector(scalar, 2));
    let dofmap = DofMap::build(element.as_ref(), &mesh);

    assert_eq!(element.value_dimension(), 2);
    assert_eq!(element.dof_component(4), 1);
    assert_eq!(dofmap.global_dimension(), 18);
    assert_eq!(dofmap.tabulate_dofs(0), &[0, 1, 4, 9, 10, 13]);
    assert_eq!(dofmap.tabulate_facet_dofs(0), &[1, 2, 4, 5]);

    let (sub_element, sub_dofmap) = dofmap.extract_sub_dofmap(&element, &mesh, &[1]).unwrap();
    assert_eq!(sub_element.value_dimension(), 1);
    assert_eq!(sub_dofmap.offset(), 9);
    assert_eq!(sub_dofmap.global_dimension(), 9);
    assert_eq!(sub_dofmap.local_dimension(), 3);
    assert_eq!(sub_dofmap.tabulate_dofs(0), &[9, 10, 13]);
    assert_eq!(sub_dofmap.tabulate_facet_dofs(0), &[1, 2]);
}

#[test]
fn invalid_sub_systems_are_rejected() {
    let mesh = create_unit_square_mesh::<f64>(1, 1);
    let scalar: Arc<dyn FiniteElement<f64, U2>> = Arc::new(LagrangeElement::new(CellType::Triangle, 1));
    let element: Arc<dyn FiniteElement<f64, U2>> = Arc::new(MixedElement::vector(scalar, 2));
    let dofmap = DofMap::build(element.as_ref(), &mesh);

    let error = dofmap.extract_sub_dofmap(&element, &mesh, &[2]).unwrap_err();
    assert_eq!(
        error,
        DofMapError::InvalidSubSystem {
            path: vec![2],
            depth: 0,
            num_sub_elements: 2
        }
    );
    let error = dofmap.extract_sub_dofmap(&element, &mesh, &[0, 0]).unwrap_err();
    assert_eq!(
        error,
        DofMapError::InvalidSubSystem {
            path: vec![0, 0],
            depth: 1,
            num_sub_elements: 0
        }
    );
}

#[test]
fn sparsity_pattern_couples_cell_dofs() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let dofmap = DofMap::build(&LagrangeElement::new(CellType::Triangle, 1), &mesh);
    let pattern = dofmap.sparsity_pattern();
    assert_eq!(pattern.major_dim(), 9);
    assert_eq!(pattern.minor_dim(), 9);
    // One entry per vertex and two per edge
    assert_eq!(pattern.nnz(), 9 + 2 * 16);
    assert_eq!(pattern.lane(4), &[0, 1, 3, 4, 5, 7, 8]);
}

#[test]
fn sparsity_pattern_with_interior_facets() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let dofmap = DofMap::build(&LagrangeElement::new(CellType::Triangle, 0), &mesh);
    assert_eq!(dofmap.sparsity_pattern().nnz(), 8);

    let pattern = build_sparsity_pattern(&dofmap, &dofmap, Some(mesh.topology()));
    assert_eq!(pattern.nnz(), 8 + 2 * 8);
    assert_eq!(pattern.lane(0), &[0, 1, 3]);
}

proptest! {
    #[test]
    fn linear_sparsity_pattern_matches_mesh_edges(mesh in unit_square_mesh()) {
        let dofmap = DofMap::build(&LagrangeElement::new(CellType::Triangle, 1), &mesh);
        let pattern = dofmap.sparsity_pattern();
        prop_assert_eq!(pattern.nnz(), mesh.num_vertices() + 2 * mesh.num_edges());

        let quadratic = DofMap::build(&LagrangeElement::new(CellType::Triangle, 2), &mesh);
        prop_assert_eq!(quadratic.global_dimension(), mesh.num_vertices() + mesh.num_edges());
    }
}
