use crate::mesh::SimplexMesh;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A value attached to every mesh entity of one topological dimension.
///
/// Typical uses are cell markers for refinement (`MeshFunction<bool>`) and sub-domain markers
/// for assembly and boundary conditions (`MeshFunction<usize>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshFunction<V> {
    dim: usize,
    values: Vec<V>,
}

impl<V: Clone> MeshFunction<V> {
    /// Creates a mesh function over all entities of dimension `dim`, set to `value`.
    pub fn new<T, D>(mesh: &SimplexMesh<T, D>, dim: usize, value: V) -> Self
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        Self {
            dim,
            values: vec![value; mesh.num_entities(dim)],
        }
    }

    pub fn fill(&mut self, value: V) {
        self.values.iter_mut().for_each(|v| *v = value.clone());
    }
}

impl<V> MeshFunction<V> {
    pub fn from_values(dim: usize, values: Vec<V>) -> Self {
        Self { dim, values }
    }

    /// Topological dimension of the entities this function is defined on.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.values.get(index)
    }

    pub fn set(&mut self, index: usize, value: V) {
        self.values[index] = value;
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Returns `true` if the function has one value per entity of its dimension in `mesh`.
    pub fn matches<T, D>(&self, mesh: &SimplexMesh<T, D>) -> bool
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        self.dim <= mesh.topological_dim() && self.len() == mesh.num_entities(self.dim)
    }
}

impl<V: PartialEq> MeshFunction<V> {
    /// Indices of all entities whose value equals `value`.
    pub fn indices_where<'a>(&'a self, value: &'a V) -> impl 'a + Iterator<Item = usize> {
        self.values
            .iter()
            .enumerate()
            .filter(move |(_, v)| *v == value)
            .map(|(i, _)| i)
    }
}

impl<V> Index<usize> for MeshFunction<V> {
    type Output = V;

    fn index(&self, index: usize) -> &V {
        &self.values[index]
    }
}

impl<V> IndexMut<usize> for MeshFunction<V> {
    fn index_mut(&mut self, index: usize) -> &mut V {
        &mut self.values[index]
    }
}
