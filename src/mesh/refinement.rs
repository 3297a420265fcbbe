//! Functionality and abstractions for mesh refinement.
//!
//! Three strategies are provided:
//!
//! - uniform refinement of every cell through [`refine_uniformly`],
//! - recursive longest-edge bisection of marked cells in [`bisection`],
//! - regular/irregular (red/green) refinement of a mesh hierarchy with closure in [`hierarchy`].
//!
//! The local subdivision tables shared by uniform and hierarchical refinement live in [`rules`].
use crate::mesh::refinement::rules::{regular_children, LocalVertex};
use crate::mesh::{CellType, SimplexMesh};
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bisection;
pub mod hierarchy;
pub mod rules;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefinementError {
    #[error("expected one cell marker per cell ({expected}), got {actual}")]
    MarkerCountMismatch { expected: usize, actual: usize },
    #[error("cell markers must be defined on cells (dimension {expected}), got dimension {actual}")]
    MarkerDimensionMismatch { expected: usize, actual: usize },
    #[error("level {level} does not satisfy the pre-condition for refinement: {reason}")]
    PreConditionViolated { level: usize, reason: String },
    #[error("level {level} does not satisfy the post-condition for refinement: {reason}")]
    PostConditionViolated { level: usize, reason: String },
    #[error("closure of level {level} did not converge within {max_iterations} promotions")]
    ClosureDidNotConverge { level: usize, max_iterations: usize },
    #[error("level {level} does not exist in a hierarchy with {num_levels} levels")]
    LevelOutOfBounds { level: usize, num_levels: usize },
}

/// Describes a vertex of a refined mesh in terms of the vertices of the mesh it was refined from.
///
/// Two refined cells that produce the same label share the vertex, which is how refined meshes
/// stay conforming without any geometric search.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexLabel {
    /// A copy of a parent vertex.
    Copy(usize),
    /// The midpoint of the edge between two parent vertices, stored with sorted indices.
    Midpoint(usize, usize),
}

impl VertexLabel {
    pub fn midpoint(a: usize, b: usize) -> Self {
        assert_ne!(a, b, "Midpoint of degenerate edge.");
        Self::Midpoint(a.min(b), a.max(b))
    }

    /// Label of a local refinement vertex of a cell with the given global vertices.
    pub fn from_local(local: LocalVertex, cell_type: CellType, cell_vertices: &[usize]) -> Self {
        match local {
            LocalVertex::Corner(i) => Self::Copy(cell_vertices[i]),
            LocalVertex::Midpoint(edge) => {
                let [a, b] = cell_type.local_edges()[edge];
                Self::midpoint(cell_vertices[a], cell_vertices[b])
            }
        }
    }

    /// The parent vertex this vertex is a copy of, if any.
    pub fn parent_vertex(&self) -> Option<usize> {
        match self {
            Self::Copy(v) => Some(*v),
            Self::Midpoint(_, _) => None,
        }
    }

    pub fn map_vertices(&self, mut f: impl FnMut(usize) -> Option<usize>) -> Option<Self> {
        match *self {
            Self::Copy(v) => Some(Self::Copy(f(v)?)),
            Self::Midpoint(a, b) => Some(Self::midpoint(f(a)?, f(b)?)),
        }
    }

    pub fn construct_vertex<T, D>(&self, parent_vertices: &[OPoint<T, D>]) -> OPoint<T, D>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        match *self {
            Self::Copy(v) => parent_vertices[v].clone(),
            Self::Midpoint(a, b) => parent_vertices[a]
                .coords
                .lerp(&parent_vertices[b].coords, convert(0.5))
                .into(),
        }
    }
}

/// Assigns consecutive indices to vertex labels in order of first appearance.
#[derive(Debug, Clone, Default)]
pub(crate) struct VertexLabelling {
    indices: FxHashMap<VertexLabel, usize>,
    labels: Vec<VertexLabel>,
}

impl VertexLabelling {
    pub fn index_of(&mut self, label: VertexLabel) -> usize {
        let labels = &mut self.labels;
        *self.indices.entry(label).or_insert_with(|| {
            labels.push(label);
            labels.len() - 1
        })
    }

    pub fn into_labels(self) -> Vec<VertexLabel> {
        self.labels
    }

    pub fn construct_vertices<T, D>(&self, parent_vertices: &[OPoint<T, D>]) -> Vec<OPoint<T, D>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        self.labels
            .iter()
            .map(|label| label.construct_vertex(parent_vertices))
            .collect()
    }
}

/// Apply one round of uniform mesh refinement.
///
/// Every cell is split into `2^d` children by the regular rule. The vertices of the result are
/// the vertices of `mesh` followed by one midpoint per edge, in edge order. Children of cell `i`
/// are stored contiguously, starting at cell index `2^d * i`.
pub fn refine_uniformly<T, D>(mesh: &SimplexMesh<T, D>) -> SimplexMesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let cell_type = mesh.cell_type();
    let topology = mesh.topology();
    let mut labelling = VertexLabelling::default();
    for v in 0..mesh.num_vertices() {
        labelling.index_of(VertexLabel::Copy(v));
    }
    for edge in 0..mesh.num_edges() {
        let [a, b] = topology.edge_vertices(edge);
        labelling.index_of(VertexLabel::midpoint(a, b));
    }

    let children = regular_children(cell_type);
    let mut cells = Vec::with_capacity(mesh.num_cells() * children.len() * cell_type.num_vertices());
    for cell_vertices in mesh.cell_iter() {
        for child in children {
            cells.extend(
                child
                    .iter()
                    .map(|&local| labelling.index_of(VertexLabel::from_local(local, cell_type, cell_vertices))),
            );
        }
    }

    let vertices = labelling.construct_vertices(mesh.vertices());
    SimplexMesh::from_parts(cell_type, vertices, cells)
}

/// Repeatedly applies uniform mesh refinement to the given mesh.
pub fn refine_uniformly_repeat<T, D>(mesh: &SimplexMesh<T, D>, repeat_times: usize) -> SimplexMesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let mut mesh = mesh.clone();
    for _ in 0..repeat_times {
        mesh = refine_uniformly(&mesh);
    }
    mesh
}
