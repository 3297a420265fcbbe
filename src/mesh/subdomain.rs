use crate::mesh::function::MeshFunction;
use crate::mesh::SimplexMesh;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar};

/// A user-supplied predicate describing part of the domain.
pub trait SubDomain<T: Scalar, D: DimName>
where
    DefaultAllocator: Allocator<T, D>,
{
    /// Returns `true` if `x` is inside the sub-domain. `on_boundary` is set when `x` belongs to
    /// an entity on the exterior boundary of the mesh.
    fn inside(&self, x: &OPoint<T, D>, on_boundary: bool) -> bool;
}

impl<T, D, F> SubDomain<T, D> for F
where
    T: Scalar,
    D: DimName,
    F: Fn(&OPoint<T, D>, bool) -> bool,
    DefaultAllocator: Allocator<T, D>,
{
    fn inside(&self, x: &OPoint<T, D>, on_boundary: bool) -> bool {
        self(x, on_boundary)
    }
}

/// The whole exterior boundary.
#[derive(Debug, Copy, Clone, Default)]
pub struct EntireBoundary;

impl<T, D> SubDomain<T, D> for EntireBoundary
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn inside(&self, _x: &OPoint<T, D>, on_boundary: bool) -> bool {
        on_boundary
    }
}

/// Sets `markers[f] = value` for every facet `f` inside the sub-domain.
///
/// A facet is inside if its midpoint and all of its vertices are inside.
pub fn mark_facets<T, D>(
    mesh: &SimplexMesh<T, D>,
    sub_domain: &dyn SubDomain<T, D>,
    markers: &mut MeshFunction<usize>,
    value: usize,
) where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    assert_eq!(markers.dim() + 1, mesh.topological_dim(), "Facet markers must live on facets.");
    assert_eq!(markers.len(), mesh.num_facets(), "Facet marker length must match the mesh.");
    let topology = mesh.topology();
    for facet in 0..mesh.num_facets() {
        let on_boundary = topology.is_boundary_facet(facet);
        let inside = sub_domain.inside(&mesh.facet_midpoint(facet), on_boundary)
            && topology
                .facet_vertices(facet)
                .iter()
                .all(|&v| sub_domain.inside(mesh.vertex(v), on_boundary));
        if inside {
            markers[facet] = value;
        }
    }
}

/// Sets `markers[c] = value` for every cell `c` inside the sub-domain.
///
/// A cell is inside if its midpoint and all of its vertices are inside.
pub fn mark_cells<T, D>(
    mesh: &SimplexMesh<T, D>,
    sub_domain: &dyn SubDomain<T, D>,
    markers: &mut MeshFunction<usize>,
    value: usize,
) where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    assert_eq!(markers.dim(), mesh.topological_dim(), "Cell markers must live on cells.");
    assert_eq!(markers.len(), mesh.num_cells(), "Cell marker length must match the mesh.");
    for cell in 0..mesh.num_cells() {
        let inside = sub_domain.inside(&mesh.cell_midpoint(cell), false)
            && mesh
                .cell_vertices(cell)
                .iter()
                .all(|&v| sub_domain.inside(mesh.vertex(v), false));
        if inside {
            markers[cell] = value;
        }
    }
}
