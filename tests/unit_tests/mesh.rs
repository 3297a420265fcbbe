use crate::boundary_measure;
use adafem::mesh::boundary::BoundaryMesh;
use adafem::mesh::function::MeshFunction;
use adafem::mesh::procedural::{create_unit_cube_mesh, create_unit_square_mesh};
use adafem::mesh::subdomain::{mark_cells, mark_facets, EntireBoundary};
use adafem::mesh::{CellType, TriangleMesh2d};
use adafem::proptest::perturbed_unit_square_mesh;
use nalgebra::Point2;
use proptest::prelude::*;

mod refinement;

#[test]
fn unit_square_topology() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    assert_eq!(mesh.num_vertices(), 9);
    assert_eq!(mesh.num_cells(), 8);
    assert_eq!(mesh.num_edges(), 16);
    assert_eq!(mesh.num_facets(), 16);
    assert_eq!(mesh.num_entities(0), 9);
    assert_eq!(mesh.num_entities(2), 8);

    let topology = mesh.topology();
    assert_eq!(topology.boundary_facets().count(), 8);
    assert_eq!(topology.interior_facets().count(), 8);
    assert_eq!(topology.boundary_vertices(), vec![0, 1, 2, 3, 5, 6, 7, 8]);
    // The center vertex is shared by six triangles
    assert_eq!(topology.vertex_cells(4).len(), 6);
    for cell in 0..mesh.num_cells() {
        assert_eq!(topology.cell_edges(cell).len(), 3);
        assert!(topology.cell_neighbors(cell).count() >= 1);
    }
}

#[test]
fn neighbor_across_shared_facet() {
    let mesh = create_unit_square_mesh::<f64>(1, 1);
    let topology = mesh.topology();
    // Both triangles share the diagonal (0, 3), which is opposite local vertex 1 in each cell
    assert_eq!(topology.neighbor_across(0, 1), Some(1));
    assert_eq!(topology.neighbor_across(1, 1), Some(0));
    assert_eq!(topology.neighbor_across(0, 0), None);

    let diagonal = topology.find_edge(0, 3).unwrap();
    assert_eq!(topology.edge_cells(diagonal), &[0, 1]);
    assert_eq!(topology.find_edge(1, 2), None);
}

#[test]
fn unit_square_geometry() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    assert!((mesh.total_volume() - 1.0).abs() < 1e-14);
    assert!((boundary_measure(&mesh) - 4.0).abs() < 1e-14);
    assert!((mesh.cell_volume(0) - 0.125).abs() < 1e-14);
    assert!((mesh.cell_diameter(0) - 0.5f64.sqrt()).abs() < 1e-14);

    let (min, max) = mesh.bounding_box().unwrap();
    assert_eq!(min, Point2::new(0.0, 0.0));
    assert_eq!(max, Point2::new(1.0, 1.0));
}

#[test]
fn unit_cube_boundary_mesh() {
    let mesh = create_unit_cube_mesh::<f64>(1, 1, 1);
    let boundary = BoundaryMesh::new(&mesh);
    assert_eq!(boundary.num_facets(), 12);
    assert_eq!(boundary.vertices().len(), 8);

    let surface = boundary.to_mesh(&mesh).unwrap();
    assert_eq!(surface.cell_type(), CellType::Triangle);
    assert_eq!(surface.num_cells(), 12);
    assert!((surface.total_volume() - 6.0).abs() < 1e-12);

    for boundary_facet in boundary.facets() {
        let cell_facet = mesh.topology().cell_facets(boundary_facet.cell)[boundary_facet.local_facet];
        assert_eq!(cell_facet, boundary_facet.facet);
    }
}

#[test]
fn mark_facets_and_cells_with_sub_domains() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let mut facet_markers = MeshFunction::new(&mesh, 1, 0usize);
    mark_facets(&mesh, &EntireBoundary, &mut facet_markers, 1);
    let left = |x: &Point2<f64>, on_boundary: bool| on_boundary && x.x < 1e-12;
    mark_facets(&mesh, &left, &mut facet_markers, 2);
    assert_eq!(facet_markers.indices_where(&1).count(), 6);
    assert_eq!(facet_markers.indices_where(&2).count(), 2);

    let mut cell_markers = MeshFunction::new(&mesh, 2, 0usize);
    let lower_half = |x: &Point2<f64>, _: bool| x.y <= 0.5 + 1e-12;
    mark_cells(&mesh, &lower_half, &mut cell_markers, 7);
    let marked: Vec<_> = cell_markers.indices_where(&7).collect();
    assert_eq!(marked, vec![0, 1, 2, 3]);
}

#[test]
fn mesh_function_access() {
    let mesh = create_unit_square_mesh::<f64>(1, 1);
    let mut markers = MeshFunction::new(&mesh, 2, false);
    assert_eq!(markers.len(), 2);
    assert!(markers.matches(&mesh));
    markers.set(1, true);
    assert_eq!(markers.get(1), Some(&true));
    assert_eq!(markers.get(2), None);
    markers[0] = true;
    assert_eq!(markers.values(), &[true, true]);

    let wrong_dim = MeshFunction::from_values(1, vec![false; 2]);
    assert!(!wrong_dim.matches(&mesh));
}

#[test]
fn mesh_serialization_round_trip() {
    let mesh = create_unit_square_mesh::<f64>(1, 2);
    let json = serde_json::to_string(&mesh).unwrap();
    let deserialized: TriangleMesh2d<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, mesh);
}

proptest! {
    #[test]
    fn perturbed_meshes_keep_area_and_boundary(mesh in perturbed_unit_square_mesh()) {
        prop_assert!((mesh.total_volume() - 1.0).abs() < 1e-12);
        prop_assert!((boundary_measure(&mesh) - 4.0).abs() < 1e-12);
        for cell in 0..mesh.num_cells() {
            prop_assert!(mesh.cell_volume(cell) > 0.0);
        }
    }
}

#[test]
fn keeping_cells_compacts_vertices() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let (sub_mesh, vertex_origin) = mesh.keep_cells(&[0, 7]);
    assert_eq!(vertex_origin, vec![0, 1, 4, 7, 8]);
    assert_eq!(sub_mesh.num_cells(), 2);
    assert_eq!(sub_mesh.cell_vertices(0), &[0, 1, 2]);
    assert_eq!(sub_mesh.cell_vertices(1), &[2, 3, 4]);
    assert_eq!(sub_mesh.vertices()[2], Point2::new(0.5, 0.5));
    assert!((sub_mesh.total_volume() - 0.25).abs() < 1e-14);
}
