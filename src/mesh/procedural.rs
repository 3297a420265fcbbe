//! Basic procedural mesh generation routines.
use crate::mesh::{CellType, IntervalMesh1d, TetrahedronMesh3d, TriangleMesh2d};
use crate::Real;
use nalgebra::{convert, Point1, Point2, Point3};

fn coordinate<T: Real>(i: usize, n: usize) -> T {
    convert(i as f64 / n as f64)
}

/// Uniform mesh of `[0, 1]` with `n` intervals.
pub fn create_unit_interval_mesh<T: Real>(n: usize) -> IntervalMesh1d<T> {
    assert!(n > 0, "Need at least one cell.");
    let vertices = (0..=n).map(|i| Point1::new(coordinate(i, n))).collect();
    let cells = (0..n).flat_map(|i| [i, i + 1]).collect();
    IntervalMesh1d::from_vertices_and_cells(CellType::Interval, vertices, cells)
}

/// Uniform triangulation of `[0, 1]^2`.
///
/// Each of the `nx * ny` squares is split into two triangles along the diagonal from its lower
/// left to its upper right corner, giving `2 * nx * ny` cells and `(nx + 1) * (ny + 1)` vertices.
/// Vertices are numbered row by row, starting at the origin.
pub fn create_unit_square_mesh<T: Real>(nx: usize, ny: usize) -> TriangleMesh2d<T> {
    assert!(nx > 0 && ny > 0, "Need at least one cell in each direction.");
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point2::new(coordinate(i, nx), coordinate(j, ny)));
        }
    }

    let to_global_vertex_index = |i: usize, j: usize| j * (nx + 1) + i;
    let mut cells = Vec::with_capacity(6 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let v0 = to_global_vertex_index(i, j);
            let v1 = to_global_vertex_index(i + 1, j);
            let v2 = to_global_vertex_index(i, j + 1);
            let v3 = to_global_vertex_index(i + 1, j + 1);
            cells.extend_from_slice(&[v0, v1, v3]);
            cells.extend_from_slice(&[v0, v2, v3]);
        }
    }

    TriangleMesh2d::from_vertices_and_cells(CellType::Triangle, vertices, cells)
}

/// Uniform tetrahedralization of `[0, 1]^3`.
///
/// Each cube is split into six tetrahedra sharing the diagonal from its lowest to its highest
/// corner. All cubes use the same split, so the result is conforming.
pub fn create_unit_cube_mesh<T: Real>(nx: usize, ny: usize, nz: usize) -> TetrahedronMesh3d<T> {
    assert!(nx > 0 && ny > 0 && nz > 0, "Need at least one cell in each direction.");
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push(Point3::new(coordinate(i, nx), coordinate(j, ny), coordinate(k, nz)));
            }
        }
    }

    let to_global_vertex_index = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;
    let mut cells = Vec::with_capacity(24 * nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v0 = to_global_vertex_index(i, j, k);
                let v1 = to_global_vertex_index(i + 1, j, k);
                let v2 = to_global_vertex_index(i, j + 1, k);
                let v3 = to_global_vertex_index(i + 1, j + 1, k);
                let v4 = to_global_vertex_index(i, j, k + 1);
                let v5 = to_global_vertex_index(i + 1, j, k + 1);
                let v6 = to_global_vertex_index(i, j + 1, k + 1);
                let v7 = to_global_vertex_index(i + 1, j + 1, k + 1);
                cells.extend_from_slice(&[v0, v1, v3, v7]);
                cells.extend_from_slice(&[v0, v1, v7, v5]);
                cells.extend_from_slice(&[v0, v5, v7, v4]);
                cells.extend_from_slice(&[v0, v3, v2, v7]);
                cells.extend_from_slice(&[v0, v6, v4, v7]);
                cells.extend_from_slice(&[v0, v2, v6, v7]);
            }
        }
    }

    TetrahedronMesh3d::from_vertices_and_cells(CellType::Tetrahedron, vertices, cells)
}
