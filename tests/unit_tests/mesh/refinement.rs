use crate::{assert_conforming_in_unit_box, boundary_measure};
use adafem::mesh::function::MeshFunction;
use adafem::mesh::procedural::{create_unit_cube_mesh, create_unit_square_mesh};
use adafem::mesh::refinement::bisection;
use adafem::mesh::refinement::rules::{select_rule, subdivide, IrregularRule, LocalVertex, RefinementRule};
use adafem::mesh::refinement::{refine_uniformly, refine_uniformly_repeat, RefinementError, VertexLabel};
use adafem::mesh::{CellType, TriangleMesh2d};
use adafem::proptest::{marked_unit_cube_mesh, marked_unit_square_mesh};
use adafem::timing::Timings;
use itertools::Itertools;
use nalgebra::{point, Point3};
use proptest::prelude::*;

#[test]
fn uniform_refinement_tri3d2() {
    let mesh = {
        let vertices = vec![
            point![0.0, 0.0],
            point![1.0, 0.0],
            point![2.0, -1.0],
            point![2.5, 1.5],
            point![1.2, 1.0],
            point![0.0, 1.3],
        ];
        let cells = vec![0, 1, 5, 1, 2, 3, 3, 4, 1, 1, 4, 5];
        TriangleMesh2d::<f64>::from_vertices_and_cells(CellType::Triangle, vertices, cells)
    };
    let refined_once = refine_uniformly(&mesh);
    let refined0 = refine_uniformly_repeat(&mesh, 0);
    let refined1 = refine_uniformly_repeat(&mesh, 1);
    let refined2 = refine_uniformly_repeat(&mesh, 2);

    assert_eq!(refined0, mesh);
    assert_eq!(refined1, refined_once);
    assert_eq!(refined1.num_cells(), 16);
    assert_eq!(refined1.num_vertices(), mesh.num_vertices() + mesh.num_edges());
    assert_eq!(refined2.num_cells(), 64);
    assert!((refined2.total_volume() - mesh.total_volume()).abs() < 1e-12);
    assert!((boundary_measure(&refined2) - boundary_measure(&mesh)).abs() < 1e-12);
}

#[test]
fn uniform_refinement_of_tetrahedra() {
    let mesh = create_unit_cube_mesh::<f64>(1, 1, 1);
    let refined = refine_uniformly(&mesh);
    assert_eq!(refined.num_cells(), 48);
    assert_eq!(refined.num_vertices(), 8 + mesh.num_edges());
    assert!((refined.total_volume() - 1.0).abs() < 1e-12);
    assert!((boundary_measure(&refined) - 6.0).abs() < 1e-12);
}

#[test]
fn vertex_labels_locate_new_vertices() {
    let parent = [point![0.0, 0.0], point![2.0, 0.0], point![0.0, 2.0]];
    assert_eq!(VertexLabel::Copy(1).construct_vertex(&parent), point![2.0, 0.0]);
    assert_eq!(VertexLabel::midpoint(2, 1).construct_vertex(&parent), point![1.0, 1.0]);
    assert_eq!(VertexLabel::midpoint(2, 1), VertexLabel::midpoint(1, 2));
    assert_eq!(VertexLabel::Copy(1).parent_vertex(), Some(1));
    assert_eq!(VertexLabel::midpoint(0, 1).parent_vertex(), None);
}

#[test]
fn tetrahedron_with_one_marked_edge_is_split_in_two() {
    let points = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    // Local edge 1 connects vertices 1 and 3
    let marked = [false, true, false, false, false, false];
    let rule = select_rule(CellType::Tetrahedron, &marked).unwrap();
    assert_eq!(rule, RefinementRule::Irregular(IrregularRule::Irregular2));

    let children = subdivide(CellType::Tetrahedron, rule, &marked, &points);
    assert_eq!(children.len(), 2);
    for child in &children {
        assert_eq!(child.len(), 4);
        assert!(child.contains(&LocalVertex::Midpoint(1)));
        assert!(child.contains(&LocalVertex::Corner(0)));
        assert!(child.contains(&LocalVertex::Corner(2)));
    }
    assert!(children[0].contains(&LocalVertex::Corner(1)) != children[1].contains(&LocalVertex::Corner(1)));
}

#[test]
fn bisection_closes_neighbor_sharing_longest_edge() {
    let mesh = create_unit_square_mesh::<f64>(2, 2);
    let mut markers = MeshFunction::new(&mesh, 2, false);
    markers[0] = true;
    let mut timings = Timings::new();
    let output = bisection::refine(&mesh, &markers, &mut timings).unwrap();

    // Cells 0 and 1 share their longest edge, the diagonal from (0, 0) to (0.5, 0.5)
    assert_eq!(output.mesh.num_cells(), 10);
    assert_eq!(output.mesh.num_vertices(), 10);
    assert_eq!(output.mesh.vertex(9), &point![0.25, 0.25]);
    let counts = output.parent_cell.iter().copied().counts();
    assert_eq!(counts[&0], 2);
    assert_eq!(counts[&1], 2);
    assert!((2..8).all(|cell| counts[&cell] == 1));

    assert!((output.mesh.total_volume() - 1.0).abs() < 1e-14);
    assert!((boundary_measure(&output.mesh) - 4.0).abs() < 1e-14);
    assert!(timings.contains("bisection"));
}

#[test]
fn bisection_of_tetrahedra_cuts_shared_diagonal() {
    // All six tetrahedra of the cube share the longest edge, the diagonal through the cube
    let mesh = create_unit_cube_mesh::<f64>(1, 1, 1);
    let mut markers = MeshFunction::new(&mesh, 3, false);
    markers[0] = true;
    let output = bisection::refine(&mesh, &markers, &mut Timings::new()).unwrap();

    assert_eq!(output.mesh.num_cells(), 12);
    assert_eq!(output.mesh.num_vertices(), 9);
    assert_eq!(output.mesh.vertex(8), &Point3::new(0.5, 0.5, 0.5));
    assert!((output.mesh.total_volume() - 1.0).abs() < 1e-12);
    assert!((boundary_measure(&output.mesh) - 6.0).abs() < 1e-12);
}

#[test]
fn bisection_rejects_markers_on_facets() {
    let mesh = create_unit_square_mesh::<f64>(1, 1);
    let markers = MeshFunction::new(&mesh, 1, true);
    let error = bisection::refine(&mesh, &markers, &mut Timings::new()).unwrap_err();
    assert_eq!(
        error,
        RefinementError::MarkerDimensionMismatch {
            expected: 2,
            actual: 1
        }
    );
}

proptest! {
    #[test]
    fn bisection_is_conforming_and_preserves_volume((mesh, markers) in marked_unit_square_mesh()) {
        let output = bisection::refine(&mesh, &markers, &mut Timings::new()).unwrap();
        let refined = &output.mesh;

        prop_assert!((refined.total_volume() - 1.0).abs() < 1e-12);
        prop_assert!((boundary_measure(refined) - 4.0).abs() < 1e-12);
        let num_marked = markers.indices_where(&true).count();
        prop_assert!(refined.num_cells() >= mesh.num_cells() + num_marked);

        // Children tile their parent
        let mut parent_volumes = vec![0.0; mesh.num_cells()];
        for (cell, &parent) in output.parent_cell.iter().enumerate() {
            let volume = refined.cell_volume(cell);
            prop_assert!(volume > 0.0);
            parent_volumes[parent] += volume;
        }
        for (cell, volume) in parent_volumes.into_iter().enumerate() {
            prop_assert!((volume - mesh.cell_volume(cell)).abs() < 1e-12);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn bisection_of_tetrahedra_is_conforming((mesh, markers) in marked_unit_cube_mesh()) {
        let output = bisection::refine(&mesh, &markers, &mut Timings::new()).unwrap();
        let refined = &output.mesh;

        assert_conforming_in_unit_box(refined);
        prop_assert!((refined.total_volume() - 1.0).abs() < 1e-12);
        prop_assert!((boundary_measure(refined) - 6.0).abs() < 1e-12);

        let mut parent_volumes = vec![0.0; mesh.num_cells()];
        for (cell, &parent) in output.parent_cell.iter().enumerate() {
            let volume = refined.cell_volume(cell);
            prop_assert!(volume > 0.0);
            parent_volumes[parent] += volume;
        }
        for (cell, volume) in parent_volumes.into_iter().enumerate() {
            prop_assert!((volume - mesh.cell_volume(cell)).abs() < 1e-12);
        }
        for cell in markers.indices_where(&true) {
            prop_assert!(output.parent_cell.iter().filter(|&&parent| parent == cell).count() >= 2);
        }
    }
}
