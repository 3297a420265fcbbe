use crate::mesh::editor::MeshEditor;
use crate::mesh::geometry::{simplex_midpoint, simplex_volume};
use crate::mesh::topology::MeshTopology;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint, Scalar, U1, U2, U3};
use serde::{Deserialize, Serialize};

pub mod boundary;
pub mod editor;
pub mod function;
pub mod geometry;
pub mod incidence;
pub mod procedural;
pub mod refinement;
pub mod subdomain;
pub mod topology;

/// The simplex kinds a mesh can be made of.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellType {
    Interval,
    Triangle,
    Tetrahedron,
}

const INTERVAL_EDGES: [[usize; 2]; 1] = [[0, 1]];
const TRIANGLE_EDGES: [[usize; 2]; 3] = [[1, 2], [0, 2], [0, 1]];
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[2, 3], [1, 3], [1, 2], [0, 3], [0, 2], [0, 1]];

impl CellType {
    pub fn from_topological_dim(dim: usize) -> Option<Self> {
        match dim {
            1 => Some(CellType::Interval),
            2 => Some(CellType::Triangle),
            3 => Some(CellType::Tetrahedron),
            _ => None,
        }
    }

    pub fn topological_dim(&self) -> usize {
        match self {
            CellType::Interval => 1,
            CellType::Triangle => 2,
            CellType::Tetrahedron => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.topological_dim() + 1
    }

    pub fn num_edges(&self) -> usize {
        self.local_edges().len()
    }

    pub fn num_facets(&self) -> usize {
        self.topological_dim() + 1
    }

    /// Number of children produced by regular (red) refinement.
    pub fn num_regular_children(&self) -> usize {
        1 << self.topological_dim()
    }

    /// Local vertex pairs of the cell's edges.
    ///
    /// For triangles, edge `i` is opposite vertex `i`. For tetrahedra, edges follow the UFC
    /// convention where edge `i` and edge `5 - i` are opposite to each other.
    pub fn local_edges(&self) -> &'static [[usize; 2]] {
        match self {
            CellType::Interval => &INTERVAL_EDGES,
            CellType::Triangle => &TRIANGLE_EDGES,
            CellType::Tetrahedron => &TETRAHEDRON_EDGES,
        }
    }

    /// Local vertices of the given local facet, which consists of all vertices but one.
    pub fn facet_vertices(&self, local_facet: usize) -> impl Iterator<Item = usize> {
        assert!(local_facet < self.num_facets(), "Local facet index out of bounds.");
        (0..self.num_vertices()).filter(move |&v| v != local_facet)
    }

    /// Local edges lying on the given local facet.
    pub fn facet_edges(&self, local_facet: usize) -> impl Iterator<Item = usize> {
        self.local_edges()
            .iter()
            .enumerate()
            .filter(move |(_, [a, b])| *a != local_facet && *b != local_facet)
            .map(|(i, _)| i)
    }

    pub fn local_edge_index(&self, a: usize, b: usize) -> Option<usize> {
        self.local_edges()
            .iter()
            .position(|&[i, j]| (i == a && j == b) || (i == b && j == a))
    }

    /// Cell type of the facets, if facets are not points.
    pub fn facet_type(&self) -> Option<CellType> {
        CellType::from_topological_dim(self.topological_dim() - 1)
    }
}

/// Index-based storage for conforming simplex meshes.
///
/// Vertices and cells are stored in arrays addressed by dense indices. Cell connectivity is
/// stored as a flat array with `cell_type.num_vertices()` entries per cell. Derived connectivity
/// is computed once on construction and never updated, so a mesh is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct SimplexMesh<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    cell_type: CellType,
    // serde's not able correctly determine the necessary trait bounds in this case,
    // so write our own
    #[serde(bound(
        serialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Serialize",
        deserialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Deserialize<'de>"
    ))]
    vertices: Vec<OPoint<T, D>>,
    cells: Vec<usize>,
    topology: MeshTopology,
}

pub type IntervalMesh1d<T> = SimplexMesh<T, U1>;
pub type TriangleMesh2d<T> = SimplexMesh<T, U2>;
pub type TetrahedronMesh3d<T> = SimplexMesh<T, U3>;

impl<T, D> SimplexMesh<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Assembles a mesh from already validated parts and computes its topology.
    pub(crate) fn from_parts(cell_type: CellType, vertices: Vec<OPoint<T, D>>, cells: Vec<usize>) -> Self {
        let topology = MeshTopology::compute(cell_type, vertices.len(), &cells);
        Self {
            cell_type,
            vertices,
            cells,
            topology,
        }
    }

    /// Constructs a mesh from vertices and flat cell connectivity.
    ///
    /// Goes through [`MeshEditor`], so invalid input such as out-of-range vertex indices
    /// causes a panic.
    pub fn from_vertices_and_cells(cell_type: CellType, vertices: Vec<OPoint<T, D>>, cells: Vec<usize>) -> Self {
        let nv = cell_type.num_vertices();
        assert_eq!(cells.len() % nv, 0, "Cell connectivity length must be a multiple of cell size.");
        let mut editor = MeshEditor::new(cell_type);
        editor.init_vertices(vertices.len());
        editor.init_cells(cells.len() / nv);
        for (i, v) in vertices.into_iter().enumerate() {
            editor.add_vertex(i, v);
        }
        for (i, cell) in cells.chunks_exact(nv).enumerate() {
            editor.add_cell(i, cell);
        }
        editor.close()
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn topological_dim(&self) -> usize {
        self.cell_type.topological_dim()
    }

    pub fn geometric_dim(&self) -> usize {
        D::dim()
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> &OPoint<T, D> {
        &self.vertices[index]
    }

    /// Flat cell connectivity.
    pub fn connectivity(&self) -> &[usize] {
        &self.cells
    }

    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len() / self.cell_type.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.topology.num_edges()
    }

    pub fn num_facets(&self) -> usize {
        self.topology.num_facets()
    }

    /// Number of mesh entities of the given topological dimension.
    pub fn num_entities(&self, dim: usize) -> usize {
        let tdim = self.topological_dim();
        if dim == 0 {
            self.num_vertices()
        } else if dim == tdim {
            self.num_cells()
        } else if dim + 1 == tdim {
            self.num_facets()
        } else if dim == 1 {
            self.num_edges()
        } else {
            panic!("No entities of dimension {} in a mesh of dimension {}.", dim, tdim)
        }
    }

    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        let nv = self.cell_type.num_vertices();
        &self.cells[nv * cell..nv * (cell + 1)]
    }

    pub fn cell_iter<'a>(&'a self) -> impl 'a + ExactSizeIterator<Item = &'a [usize]> {
        self.cells.chunks_exact(self.cell_type.num_vertices())
    }

    pub fn cell_points(&self, cell: usize) -> Vec<OPoint<T, D>> {
        self.cell_vertices(cell)
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect()
    }

    /// Vertex coordinates of a local facet, in local facet vertex order.
    pub fn local_facet_points(&self, cell: usize, local_facet: usize) -> Vec<OPoint<T, D>> {
        let vertices = self.cell_vertices(cell);
        self.cell_type
            .facet_vertices(local_facet)
            .map(|v| self.vertices[vertices[v]].clone())
            .collect()
    }

    pub fn facet_points(&self, facet: usize) -> Vec<OPoint<T, D>> {
        self.topology
            .facet_vertices(facet)
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect()
    }

    /// Creates a new mesh with only the cells with the given indices, discarding unreferenced
    /// vertices. Returns the mesh and the old index of each new vertex.
    pub fn keep_cells(&self, cell_indices: &[usize]) -> (Self, Vec<usize>) {
        let mut old_to_new = vec![usize::MAX; self.num_vertices()];
        let mut new_to_old = Vec::new();
        let mut cells = Vec::with_capacity(cell_indices.len() * self.cell_type.num_vertices());
        for &cell in cell_indices {
            for &v in self.cell_vertices(cell) {
                if old_to_new[v] == usize::MAX {
                    old_to_new[v] = new_to_old.len();
                    new_to_old.push(v);
                }
                cells.push(old_to_new[v]);
            }
        }
        let vertices = new_to_old
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect();
        (Self::from_parts(self.cell_type, vertices, cells), new_to_old)
    }
}

impl<T, D> SimplexMesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn cell_volume(&self, cell: usize) -> T {
        simplex_volume(&self.cell_points(cell))
    }

    pub fn total_volume(&self) -> T {
        (0..self.num_cells()).fold(T::zero(), |acc, c| acc + self.cell_volume(c))
    }

    pub fn cell_midpoint(&self, cell: usize) -> OPoint<T, D> {
        simplex_midpoint(&self.cell_points(cell))
    }

    pub fn edge_length(&self, edge: usize) -> T {
        let [a, b] = self.topology.edge_vertices(edge);
        (&self.vertices[a] - &self.vertices[b]).norm()
    }

    pub fn edge_midpoint(&self, edge: usize) -> OPoint<T, D> {
        let [a, b] = self.topology.edge_vertices(edge);
        self.vertices[a].coords.lerp(&self.vertices[b].coords, convert(0.5)).into()
    }

    pub fn facet_volume(&self, facet: usize) -> T {
        simplex_volume(&self.facet_points(facet))
    }

    pub fn facet_midpoint(&self, facet: usize) -> OPoint<T, D> {
        simplex_midpoint(&self.facet_points(facet))
    }

    /// Length of the longest edge of a cell.
    pub fn cell_diameter(&self, cell: usize) -> T {
        self.topology
            .cell_edges(cell)
            .iter()
            .map(|&e| self.edge_length(e))
            .fold(T::zero(), T::max)
    }

    /// Axis-aligned bounds `(min, max)` of all vertices, or `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<(OPoint<T, D>, OPoint<T, D>)> {
        let first = self.vertices.first()?;
        let init = (first.clone(), first.clone());
        Some(self.vertices.iter().fold(init, |(min, max), v| {
            (min.coords.inf(&v.coords).into(), max.coords.sup(&v.coords).into())
        }))
    }
}
