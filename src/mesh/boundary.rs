use crate::mesh::SimplexMesh;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use serde::{Deserialize, Serialize};

/// An exterior facet together with its unique incident cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryFacet {
    /// Global facet index in the parent mesh.
    pub facet: usize,
    pub cell: usize,
    /// Local index of the facet within `cell`.
    pub local_facet: usize,
}

/// The exterior boundary of a mesh: facets with exactly one incident cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryMesh {
    facets: Vec<BoundaryFacet>,
    vertices: Vec<usize>,
}

impl BoundaryMesh {
    pub fn new<T, D>(mesh: &SimplexMesh<T, D>) -> Self
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let topology = mesh.topology();
        let facets = topology
            .boundary_facets()
            .map(|facet| {
                let cell = topology.facet_cells(facet)[0];
                let local_facet = topology
                    .local_facet_index(cell, facet)
                    .expect("Facet must be local to its incident cell.");
                BoundaryFacet {
                    facet,
                    cell,
                    local_facet,
                }
            })
            .collect();
        Self {
            facets,
            vertices: topology.boundary_vertices(),
        }
    }

    pub fn facets(&self) -> &[BoundaryFacet] {
        &self.facets
    }

    pub fn num_facets(&self) -> usize {
        self.facets.len()
    }

    /// Sorted parent-mesh indices of all boundary vertices.
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    /// Builds the boundary as a mesh of one lower topological dimension.
    ///
    /// Boundary vertex `i` of the result is vertex `self.vertices()[i]` of the parent mesh.
    /// Facet vertices keep the local order of their incident cell. Returns `None` when facets
    /// are points, i.e. for interval meshes.
    pub fn to_mesh<T, D>(&self, mesh: &SimplexMesh<T, D>) -> Option<SimplexMesh<T, D>>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let facet_type = mesh.cell_type().facet_type()?;
        let cell_type = mesh.cell_type();
        let vertices = self
            .vertices
            .iter()
            .map(|&v| mesh.vertex(v).clone())
            .collect();
        let mut cells = Vec::with_capacity(self.facets.len() * facet_type.num_vertices());
        for boundary_facet in &self.facets {
            let cell_vertices = mesh.cell_vertices(boundary_facet.cell);
            for local_vertex in cell_type.facet_vertices(boundary_facet.local_facet) {
                let v = cell_vertices[local_vertex];
                let index = self
                    .vertices
                    .binary_search(&v)
                    .expect("Boundary facet vertex must be a boundary vertex.");
                cells.push(index);
            }
        }
        Some(SimplexMesh::from_vertices_and_cells(facet_type, vertices, cells))
    }
}
