//! Strategies for property-based tests of meshes and refinement.
use crate::mesh::function::MeshFunction;
use crate::mesh::procedural::{create_unit_cube_mesh, create_unit_square_mesh};
use crate::mesh::{CellType, TetrahedronMesh3d, TriangleMesh2d};
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::{Point2, Vector2};

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range.clone()].prop_map(|[x, y]| Point2::new(x, y))
}

/// Uniform triangulations of the unit square with 1 to 4 squares per direction.
pub fn unit_square_mesh() -> impl Strategy<Value = TriangleMesh2d<f64>> {
    (1..=4usize, 1..=4usize).prop_map(|(nx, ny)| create_unit_square_mesh(nx, ny))
}

/// Uniform tetrahedralizations of the unit cube with 1 or 2 cubes per direction.
pub fn unit_cube_mesh() -> impl Strategy<Value = TetrahedronMesh3d<f64>> {
    (1..=2usize, 1..=2usize, 1..=2usize).prop_map(|(nx, ny, nz)| create_unit_cube_mesh(nx, ny, nz))
}

/// Unit square triangulations whose interior vertices are moved by up to a tenth of the grid
/// spacing in each coordinate. The boundary is left in place, so the total area stays 1.
pub fn perturbed_unit_square_mesh() -> impl Strategy<Value = TriangleMesh2d<f64>> {
    (1..=4usize, 1..=4usize)
        .prop_flat_map(|(nx, ny)| {
            let num_vertices = (nx + 1) * (ny + 1);
            let perturbations = vec([-1.0..=1.0, -1.0..=1.0], num_vertices);
            (Just((nx, ny)), perturbations)
        })
        .prop_map(|((nx, ny), perturbations)| {
            let mesh = create_unit_square_mesh::<f64>(nx, ny);
            let boundary = mesh.topology().boundary_vertices();
            let scale = Vector2::new(0.1 / nx as f64, 0.1 / ny as f64);
            let vertices = mesh
                .vertices()
                .iter()
                .zip(perturbations)
                .enumerate()
                .map(|(i, (v, [dx, dy]))| {
                    if boundary.binary_search(&i).is_ok() {
                        *v
                    } else {
                        v + Vector2::new(dx, dy).component_mul(&scale)
                    }
                })
                .collect();
            TriangleMesh2d::from_vertices_and_cells(CellType::Triangle, vertices, mesh.connectivity().to_vec())
        })
}

/// A unit square triangulation together with an arbitrary set of marked cells.
pub fn marked_unit_square_mesh() -> impl Strategy<Value = (TriangleMesh2d<f64>, MeshFunction<bool>)> {
    unit_square_mesh().prop_flat_map(|mesh| {
        let num_cells = mesh.num_cells();
        (Just(mesh), vec(any::<bool>(), num_cells))
            .prop_map(|(mesh, marks)| (mesh, MeshFunction::from_values(2, marks)))
    })
}

/// A unit cube tetrahedralization together with an arbitrary set of marked cells.
pub fn marked_unit_cube_mesh() -> impl Strategy<Value = (TetrahedronMesh3d<f64>, MeshFunction<bool>)> {
    unit_cube_mesh().prop_flat_map(|mesh| {
        let num_cells = mesh.num_cells();
        (Just(mesh), vec(any::<bool>(), num_cells))
            .prop_map(|(mesh, marks)| (mesh, MeshFunction::from_values(3, marks)))
    })
}
