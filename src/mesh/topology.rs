use crate::mesh::incidence::Incidence;
use crate::mesh::CellType;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Sorted vertex tuple identifying a facet. Unused slots hold `usize::MAX`.
type FacetKey = [usize; 3];

fn facet_key(vertices: impl Iterator<Item = usize>) -> FacetKey {
    let mut key = [usize::MAX; 3];
    for (slot, v) in key.iter_mut().zip(vertices) {
        *slot = v;
    }
    key.sort_unstable();
    key
}

/// Derived connectivity of a simplex mesh.
///
/// All relations are computed once, in full, when the mesh is closed. Edges and facets are
/// numbered in order of first appearance when iterating cells in storage order and their local
/// entities in local order. For triangle meshes, this makes facet and edge numbering coincide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshTopology {
    cell_type: CellType,
    num_vertices: usize,
    cell_edges: Vec<usize>,
    edge_vertices: Vec<[usize; 2]>,
    cell_facets: Vec<usize>,
    facet_vertices: Incidence,
    facet_cells: Incidence,
    edge_cells: Incidence,
    vertex_cells: Incidence,
}

impl MeshTopology {
    /// Computes the full topology from flat cell connectivity.
    pub fn compute(cell_type: CellType, num_vertices: usize, cells: &[usize]) -> Self {
        let nv = cell_type.num_vertices();
        assert_eq!(cells.len() % nv, 0, "Cell connectivity length must be a multiple of cell size.");
        let num_cells = cells.len() / nv;

        let mut edge_lookup = FxHashMap::default();
        let mut edge_vertices = Vec::new();
        let mut cell_edges = Vec::with_capacity(num_cells * cell_type.num_edges());

        let mut facet_lookup: FxHashMap<FacetKey, usize> = FxHashMap::default();
        let mut facet_vertex_pairs = Vec::new();
        let mut cell_facets = Vec::with_capacity(num_cells * cell_type.num_facets());

        if cell_type == CellType::Interval {
            // Point facets are numbered like the vertices they consist of
            for v in 0..num_vertices {
                facet_lookup.insert(facet_key(std::iter::once(v)), v);
                facet_vertex_pairs.push((v, v));
            }
        }

        for cell_vertices in cells.chunks_exact(nv) {
            for &[a, b] in cell_type.local_edges() {
                let (a, b) = (cell_vertices[a], cell_vertices[b]);
                let key = (a.min(b), a.max(b));
                let next_index = edge_vertices.len();
                let edge = *edge_lookup.entry(key).or_insert_with(|| {
                    edge_vertices.push([key.0, key.1]);
                    next_index
                });
                cell_edges.push(edge);
            }

            for local_facet in 0..cell_type.num_facets() {
                let key = facet_key(
                    cell_type
                        .facet_vertices(local_facet)
                        .map(|v| cell_vertices[v]),
                );
                let next_index = facet_lookup.len();
                let facet = *facet_lookup.entry(key).or_insert_with(|| {
                    facet_vertex_pairs.extend(
                        key.iter()
                            .filter(|&&v| v != usize::MAX)
                            .map(|&v| (next_index, v)),
                    );
                    next_index
                });
                cell_facets.push(facet);
            }
        }

        let num_edges = edge_vertices.len();
        let num_facets = facet_lookup.len();
        let ne = cell_type.num_edges();
        let nf = cell_type.num_facets();

        let edge_cells = Incidence::from_pairs(
            num_edges,
            cell_edges
                .iter()
                .enumerate()
                .map(|(i, &e)| (e, i / ne)),
        );
        let facet_cells = Incidence::from_pairs(
            num_facets,
            cell_facets
                .iter()
                .enumerate()
                .map(|(i, &f)| (f, i / nf)),
        );
        let vertex_cells = Incidence::from_pairs(
            num_vertices,
            cells
                .iter()
                .enumerate()
                .map(|(i, &v)| (v, i / nv)),
        );
        let facet_vertices = Incidence::from_pairs(num_facets, facet_vertex_pairs);

        Self {
            cell_type,
            num_vertices,
            cell_edges,
            edge_vertices,
            cell_facets,
            facet_vertices,
            facet_cells,
            edge_cells,
            vertex_cells,
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn num_cells(&self) -> usize {
        self.cell_facets.len() / self.cell_type.num_facets()
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_edges(&self) -> usize {
        self.edge_vertices.len()
    }

    pub fn num_facets(&self) -> usize {
        self.facet_cells.len()
    }

    /// Global edge indices of a cell, in local edge order.
    pub fn cell_edges(&self, cell: usize) -> &[usize] {
        let ne = self.cell_type.num_edges();
        &self.cell_edges[ne * cell..ne * (cell + 1)]
    }

    /// Global facet indices of a cell. Local facet `i` is opposite local vertex `i`.
    pub fn cell_facets(&self, cell: usize) -> &[usize] {
        let nf = self.cell_type.num_facets();
        &self.cell_facets[nf * cell..nf * (cell + 1)]
    }

    /// Sorted endpoint vertices of an edge.
    pub fn edge_vertices(&self, edge: usize) -> [usize; 2] {
        self.edge_vertices[edge]
    }

    /// Sorted vertices of a facet.
    pub fn facet_vertices(&self, facet: usize) -> &[usize] {
        &self.facet_vertices[facet]
    }

    /// Cells incident to a facet: one for boundary facets, two for interior facets.
    pub fn facet_cells(&self, facet: usize) -> &[usize] {
        &self.facet_cells[facet]
    }

    pub fn edge_cells(&self, edge: usize) -> &[usize] {
        &self.edge_cells[edge]
    }

    pub fn vertex_cells(&self, vertex: usize) -> &[usize] {
        &self.vertex_cells[vertex]
    }

    pub fn is_boundary_facet(&self, facet: usize) -> bool {
        self.facet_cells(facet).len() == 1
    }

    pub fn boundary_facets<'a>(&'a self) -> impl 'a + Iterator<Item = usize> {
        (0..self.num_facets()).filter(move |&f| self.is_boundary_facet(f))
    }

    pub fn interior_facets<'a>(&'a self) -> impl 'a + Iterator<Item = usize> {
        (0..self.num_facets()).filter(move |&f| self.facet_cells(f).len() == 2)
    }

    /// Returns a sorted list of vertices that belong to at least one boundary facet.
    pub fn boundary_vertices(&self) -> Vec<usize> {
        let mut indices: Vec<_> = self
            .boundary_facets()
            .flat_map(|f| self.facet_vertices(f).iter().copied())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Cells sharing a facet with the given cell.
    pub fn cell_neighbors<'a>(&'a self, cell: usize) -> impl 'a + Iterator<Item = usize> {
        self.cell_facets(cell)
            .iter()
            .flat_map(move |&f| self.facet_cells(f).iter().copied())
            .filter(move |&c| c != cell)
    }

    /// The neighbor across the given local facet, if the facet is interior.
    pub fn neighbor_across(&self, cell: usize, local_facet: usize) -> Option<usize> {
        let facet = self.cell_facets(cell)[local_facet];
        self.facet_cells(facet)
            .iter()
            .copied()
            .find(|&c| c != cell)
    }

    pub fn local_facet_index(&self, cell: usize, facet: usize) -> Option<usize> {
        self.cell_facets(cell).iter().position(|&f| f == facet)
    }

    pub fn local_edge_index(&self, cell: usize, edge: usize) -> Option<usize> {
        self.cell_edges(cell).iter().position(|&e| e == edge)
    }

    /// Looks up the edge connecting two vertices, if any.
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        let key = [a.min(b), a.max(b)];
        self.vertex_cells(a)
            .iter()
            .flat_map(|&c| self.cell_edges(c).iter().copied())
            .find(|&e| self.edge_vertices[e] == key)
    }
}
