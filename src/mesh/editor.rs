use crate::mesh::{CellType, SimplexMesh};
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar};

const UNSET: usize = usize::MAX;

/// Two-phase builder for [`SimplexMesh`].
///
/// The vertex and cell counts are reserved first, after which vertices and cells are added by
/// explicit index in any order. Calling [`close`](Self::close) computes all derived connectivity
/// at once. Every violation of the construction protocol (out-of-range indices, cells referencing
/// vertices that were not reserved, slots left empty) is a programming error and panics.
#[derive(Debug, Clone)]
pub struct MeshEditor<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    cell_type: CellType,
    vertices: Vec<Option<OPoint<T, D>>>,
    cells: Vec<usize>,
}

impl<T, D> MeshEditor<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(cell_type: CellType) -> Self {
        assert!(
            cell_type.topological_dim() <= D::dim(),
            "Cannot embed cells of dimension {} in a space of dimension {}.",
            cell_type.topological_dim(),
            D::dim()
        );
        Self {
            cell_type,
            vertices: Vec::new(),
            cells: Vec::new(),
        }
    }

    pub fn init_vertices(&mut self, num_vertices: usize) {
        self.vertices = vec![None; num_vertices];
    }

    pub fn init_cells(&mut self, num_cells: usize) {
        self.cells = vec![UNSET; num_cells * self.cell_type.num_vertices()];
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len() / self.cell_type.num_vertices()
    }

    pub fn add_vertex(&mut self, index: usize, point: OPoint<T, D>) {
        let num_vertices = self.num_vertices();
        let slot = self
            .vertices
            .get_mut(index)
            .unwrap_or_else(|| panic!("Vertex index {} out of range (reserved {}).", index, num_vertices));
        *slot = Some(point);
    }

    pub fn add_cell(&mut self, index: usize, vertices: &[usize]) {
        let nv = self.cell_type.num_vertices();
        assert_eq!(
            vertices.len(),
            nv,
            "A {:?} cell must have exactly {} vertices.",
            self.cell_type,
            nv
        );
        assert!(
            index < self.num_cells(),
            "Cell index {} out of range (reserved {}).",
            index,
            self.num_cells()
        );
        for (i, &v) in vertices.iter().enumerate() {
            assert!(
                v < self.num_vertices(),
                "Cell {} references vertex {}, but only {} vertices are reserved.",
                index,
                v,
                self.num_vertices()
            );
            assert!(!vertices[..i].contains(&v), "Cell {} references vertex {} twice.", index, v);
        }
        self.cells[nv * index..nv * (index + 1)].copy_from_slice(vertices);
    }

    /// Finishes construction and computes the mesh topology.
    pub fn close(self) -> SimplexMesh<T, D> {
        if let Some(cell) = self.cells.iter().position(|&v| v == UNSET) {
            panic!("Cell {} was reserved but never added.", cell / self.cell_type.num_vertices());
        }
        let vertices = self
            .vertices
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.unwrap_or_else(|| panic!("Vertex {} was reserved but never added.", i)))
            .collect();
        SimplexMesh::from_parts(self.cell_type, vertices, self.cells)
    }
}
