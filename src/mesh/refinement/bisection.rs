//! Recursive longest-edge (Rivara) bisection.
//!
//! Every marked cell is split in two at the midpoint of its longest edge. A neighbor that shares
//! the cut edge is then bisected as well, passing the new midpoint down as a hanging vertex, until
//! no cell contains the cut edge anymore. This keeps the mesh conforming.
use crate::mesh::function::MeshFunction;
use crate::mesh::refinement::RefinementError;
use crate::mesh::{CellType, SimplexMesh};
use crate::timing::Timings;
use crate::Real;
use log::{info, trace};
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint};
use std::time::Instant;

/// The refined mesh together with its provenance in the original mesh.
#[derive(Debug, Clone)]
pub struct BisectionOutput<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub mesh: SimplexMesh<T, D>,
    /// For each cell of the new mesh, the cell of the original mesh it is contained in.
    pub parent_cell: Vec<usize>,
    /// For each facet of the new mesh, the original facet it is part of, or `None` if the facet
    /// was created by a cut.
    pub parent_facet: Vec<Option<usize>>,
    /// For each cell and local facet of the new mesh, the local facet of the parent cell the
    /// facet is part of, or `None` if the facet was created by a cut.
    pub cell_facet_provenance: Vec<Option<usize>>,
}

impl<T, D> BisectionOutput<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn local_facet_provenance(&self, cell: usize) -> &[Option<usize>] {
        let nf = self.mesh.cell_type().num_facets();
        &self.cell_facet_provenance[nf * cell..nf * (cell + 1)]
    }
}

#[derive(Debug)]
struct DynamicVertex<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    point: OPoint<T, D>,
    cells: Vec<usize>,
}

#[derive(Debug)]
struct DynamicCell {
    vertices: Vec<usize>,
    /// Local facet of the original cell each local facet lies in.
    facets: Vec<Option<usize>>,
    parent: usize,
    deleted: bool,
}

/// A midpoint created by a bisection, not yet matched by the cells sharing its edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct HangingVertex {
    vertex: usize,
    edge: [usize; 2],
}

impl HangingVertex {
    fn splits(&self, a: usize, b: usize) -> bool {
        self.edge == [a, b] || self.edge == [b, a]
    }
}

enum Task {
    Bisect {
        cell: usize,
        hanging: Option<HangingVertex>,
    },
    /// Bisect cells containing the edge of the hanging vertex until there are none left.
    Close(HangingVertex),
}

/// Mesh with incidence that can be updated one cell at a time.
///
/// Removed cells stay in the arena, flagged as deleted, until the mesh is exported.
#[derive(Debug)]
struct DynamicMesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    cell_type: CellType,
    vertices: Vec<DynamicVertex<T, D>>,
    cells: Vec<DynamicCell>,
}

impl<T, D> DynamicMesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn import(mesh: &SimplexMesh<T, D>) -> Self {
        let cell_type = mesh.cell_type();
        let mut dynamic = Self {
            cell_type,
            vertices: mesh
                .vertices()
                .iter()
                .map(|point| DynamicVertex {
                    point: point.clone(),
                    cells: Vec::new(),
                })
                .collect(),
            cells: Vec::with_capacity(2 * mesh.num_cells()),
        };
        for (cell, cell_vertices) in mesh.cell_iter().enumerate() {
            let facets = (0..cell_type.num_facets()).map(Some).collect();
            dynamic.add_cell(cell_vertices.to_vec(), facets, cell);
        }
        dynamic
    }

    fn add_vertex(&mut self, point: OPoint<T, D>) -> usize {
        self.vertices.push(DynamicVertex {
            point,
            cells: Vec::new(),
        });
        self.vertices.len() - 1
    }

    fn add_cell(&mut self, vertices: Vec<usize>, facets: Vec<Option<usize>>, parent: usize) -> usize {
        let index = self.cells.len();
        for &v in &vertices {
            self.vertices[v].cells.push(index);
        }
        self.cells.push(DynamicCell {
            vertices,
            facets,
            parent,
            deleted: false,
        });
        index
    }

    fn remove_cell(&mut self, cell: usize) {
        let DynamicCell { vertices, deleted, .. } = &mut self.cells[cell];
        *deleted = true;
        for &v in vertices.iter() {
            self.vertices[v].cells.retain(|&c| c != cell);
        }
    }

    /// Local vertex indices of the first edge of maximal length, in local edge order.
    fn longest_edge(&self, cell: usize) -> [usize; 2] {
        let vertices = &self.cells[cell].vertices;
        let mut longest: Option<(T, [usize; 2])> = None;
        for &[i, j] in self.cell_type.local_edges() {
            let length = (&self.vertices[vertices[i]].point - &self.vertices[vertices[j]].point).norm_squared();
            if longest.map_or(true, |(max_length, _)| length > max_length) {
                longest = Some((length, [i, j]));
            }
        }
        longest.expect("Cells always have at least one edge.").1
    }

    /// A live cell containing both vertices.
    fn opposite(&self, a: usize, b: usize) -> Option<usize> {
        self.vertices[a]
            .cells
            .iter()
            .copied()
            .find(|&c| self.cells[c].vertices.contains(&b))
    }

    /// Builds the child of `cell` that keeps local vertex `kept` and drops local vertex `removed`.
    ///
    /// The midpoint is inserted before the first remaining vertex with a larger index. Facet
    /// provenance follows from which parent vertices the child facet consists of: the facet
    /// opposite the midpoint is the whole parent facet opposite `removed`, the facet opposite
    /// `kept` is the cut, and every other facet is half of the parent facet opposite the same
    /// vertex.
    fn child(&self, cell: usize, kept: usize, removed: usize, midpoint: usize) -> (Vec<usize>, Vec<Option<usize>>) {
        let parent = &self.cells[cell];
        let mut vertices: Vec<usize> = parent
            .vertices
            .iter()
            .enumerate()
            .filter(|&(local, _)| local != removed)
            .map(|(_, &v)| v)
            .collect();
        let position = vertices
            .iter()
            .position(|&v| v > midpoint)
            .unwrap_or(vertices.len());
        vertices.insert(position, midpoint);

        let kept_vertex = parent.vertices[kept];
        let facets = vertices
            .iter()
            .map(|&w| {
                if w == midpoint {
                    parent.facets[removed]
                } else if w == kept_vertex {
                    None
                } else {
                    let local = parent
                        .vertices
                        .iter()
                        .position(|&v| v == w)
                        .expect("Child vertex must be a parent vertex or the midpoint.");
                    parent.facets[local]
                }
            })
            .collect();
        (vertices, facets)
    }

    /// Splits a cell along its longest edge.
    ///
    /// If the longest edge is the edge of the given hanging vertex, the hanging vertex is reused
    /// and nothing is left to close. Otherwise, the newly created midpoint is returned.
    fn bisect(&mut self, cell: usize, hanging: Option<HangingVertex>) -> Option<HangingVertex> {
        let [i, j] = self.longest_edge(cell);
        let (v0, v1) = (self.cells[cell].vertices[i], self.cells[cell].vertices[j]);
        let closing = hanging.filter(|h| h.splits(v0, v1));
        let midpoint = match closing {
            Some(h) => h.vertex,
            None => {
                let p0 = &self.vertices[v0].point;
                let p1 = &self.vertices[v1].point;
                let point = p0.coords.lerp(&p1.coords, convert(0.5)).into();
                self.add_vertex(point)
            }
        };

        let parent = self.cells[cell].parent;
        let (vertices0, facets0) = self.child(cell, i, j, midpoint);
        let (vertices1, facets1) = self.child(cell, j, i, midpoint);
        self.add_cell(vertices0, facets0, parent);
        self.add_cell(vertices1, facets1, parent);
        self.remove_cell(cell);
        trace!("Bisected cell {} along edge ({}, {}) at vertex {}", cell, v0, v1, midpoint);

        match closing {
            Some(_) => None,
            None => Some(HangingVertex {
                vertex: midpoint,
                edge: [v0, v1],
            }),
        }
    }

    /// Bisects a cell and every cell needed to close the resulting hanging vertices.
    fn refine_cell(&mut self, cell: usize) {
        let mut stack = vec![Task::Bisect { cell, hanging: None }];
        while let Some(task) = stack.pop() {
            match task {
                Task::Bisect { cell, hanging } => {
                    if let Some(created) = self.bisect(cell, hanging) {
                        stack.push(Task::Close(created));
                    }
                }
                Task::Close(hanging) => {
                    let [a, b] = hanging.edge;
                    if let Some(neighbor) = self.opposite(a, b) {
                        stack.push(Task::Close(hanging));
                        stack.push(Task::Bisect {
                            cell: neighbor,
                            hanging: Some(hanging),
                        });
                    }
                }
            }
        }
    }

    fn export(self, original: &SimplexMesh<T, D>) -> BisectionOutput<T, D> {
        let nf = self.cell_type.num_facets();
        let alive: Vec<&DynamicCell> = self.cells.iter().filter(|c| !c.deleted).collect();
        let cells = alive
            .iter()
            .flat_map(|c| c.vertices.iter().copied())
            .collect();
        let parent_cell: Vec<usize> = alive.iter().map(|c| c.parent).collect();
        let cell_facet_provenance: Vec<Option<usize>> = alive
            .iter()
            .flat_map(|c| c.facets.iter().copied())
            .collect();
        let vertices = self
            .vertices
            .into_iter()
            .map(|v| v.point)
            .collect();

        let mesh = SimplexMesh::from_parts(self.cell_type, vertices, cells);
        let mut parent_facet = vec![None; mesh.num_facets()];
        for (cell, &parent) in parent_cell.iter().enumerate() {
            let new_facets = mesh.topology().cell_facets(cell);
            let old_facets = original.topology().cell_facets(parent);
            for (local, provenance) in cell_facet_provenance[nf * cell..nf * (cell + 1)]
                .iter()
                .enumerate()
            {
                if let Some(old_local) = provenance {
                    parent_facet[new_facets[local]] = Some(old_facets[*old_local]);
                }
            }
        }

        BisectionOutput {
            mesh,
            parent_cell,
            parent_facet,
            cell_facet_provenance,
        }
    }
}

/// Refines the marked cells of a mesh by recursive longest-edge bisection.
///
/// Every marked cell is split in two, and cells sharing a cut edge are split as well so the
/// result is conforming. The longest edge of a cell is the first edge of maximal length in local
/// edge order. Cells of the output are the untouched input cells in their original order,
/// followed by the newly created cells in creation order. Vertices of the input keep their
/// indices, new midpoints are appended.
pub fn refine<T, D>(
    mesh: &SimplexMesh<T, D>,
    markers: &MeshFunction<bool>,
    timings: &mut Timings,
) -> Result<BisectionOutput<T, D>, RefinementError>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    if markers.dim() != mesh.topological_dim() {
        return Err(RefinementError::MarkerDimensionMismatch {
            expected: mesh.topological_dim(),
            actual: markers.dim(),
        });
    }
    if markers.len() != mesh.num_cells() {
        return Err(RefinementError::MarkerCountMismatch {
            expected: mesh.num_cells(),
            actual: markers.len(),
        });
    }

    let start = Instant::now();
    let mut dynamic = DynamicMesh::import(mesh);
    let marked: Vec<usize> = markers.indices_where(&true).collect();
    for &cell in &marked {
        // Marked cells may already have been split while closing a neighbor
        if !dynamic.cells[cell].deleted {
            dynamic.refine_cell(cell);
        }
    }
    let output = dynamic.export(mesh);
    timings.record("bisection", start.elapsed());

    info!(
        "Bisected {} marked cells: {} -> {} cells, {} -> {} vertices",
        marked.len(),
        mesh.num_cells(),
        output.mesh.num_cells(),
        mesh.num_vertices(),
        output.mesh.num_vertices()
    );
    Ok(output)
}
