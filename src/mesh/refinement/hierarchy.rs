//! Adaptive refinement and coarsening of a mesh hierarchy with regular (red) and irregular
//! (green) refinement.
//!
//! The hierarchy is an ordered list of mesh levels, coarse to fine. Every level is a complete,
//! independent mesh. Cells and vertices of adjacent levels are linked by parent/child indices.
//! A cell that is not refined further on some level is copied to the next level as its single
//! child, so the finest level always covers the whole domain.
//!
//! Refinement follows the two-phase algorithm of Bey:
//!
//! 1. Levels are visited from finest to coarsest. Markers of refined cells are re-evaluated from
//!    the markers of their children, and every level is closed: a cell with an edge marked by
//!    another cell receives a matching irregular rule, or is promoted to regular refinement if
//!    no rule matches.
//! 2. Levels are visited from coarsest to finest. Each level is closed again and its child level
//!    is rebuilt: children of cells whose refinement did not change are reused, all other cells
//!    are refined according to their markers. If closing a rebuilt level marks an edge of a
//!    child of an irregularly refined cell, that parent is marked for regular refinement and
//!    the level below is closed and rebuilt again.
//!
//! Children of irregularly refined cells are never refined themselves. If such a cell needs
//! refinement, its parent is refined regularly instead.
use crate::mesh::function::MeshFunction;
use crate::mesh::refinement::rules::{select_rule, subdivide, IrregularRule, LocalVertex, RefinementRule};
use crate::mesh::refinement::{RefinementError, VertexLabel, VertexLabelling};
use crate::mesh::SimplexMesh;
use crate::timing::Timings;
use crate::Real;
use log::{debug, info};
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellStatus {
    Unrefined,
    RegularlyRefined,
    IrregularlyRefined,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellMarker {
    RegularRefinement,
    IrregularRefinement(IrregularRule),
    NoRefinement,
    Coarsening,
    /// The cell's current refinement is consistent and is kept.
    AccordingToRefinement,
}

impl From<RefinementRule> for CellMarker {
    fn from(rule: RefinementRule) -> Self {
        match rule {
            RefinementRule::Regular => CellMarker::RegularRefinement,
            RefinementRule::Irregular(irregular) => CellMarker::IrregularRefinement(irregular),
        }
    }
}

/// Parameters of the closure algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClosureParameters {
    /// Maximum number of promotions to regular refinement while closing one level.
    ///
    /// Every promotion marks at least one new edge, so the number of edges of the level is a
    /// natural bound and is used when this is `None`.
    pub max_iterations: Option<usize>,
}

/// Statistics of closing a single level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ClosureReport {
    /// Cells promoted to regular refinement because no rule matched their marked edges.
    pub promotions: usize,
    /// Cells taken from the work list.
    pub visited: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub status: CellStatus,
    pub marker: CellMarker,
    /// Parent cell on the next coarser level.
    pub parent: Option<usize>,
    /// Children on the next finer level.
    pub children: Vec<usize>,
}

impl CellRecord {
    fn new(parent: Option<usize>) -> Self {
        Self {
            status: CellStatus::Unrefined,
            marker: CellMarker::NoRefinement,
            parent,
            children: Vec::new(),
        }
    }
}

/// A single level of a [`MeshHierarchy`].
#[derive(Debug, Clone)]
pub struct MeshLevel<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh: SimplexMesh<T, D>,
    cells: Vec<CellRecord>,
    /// How each vertex derives from the vertices of the parent level.
    vertex_origin: Vec<Option<VertexLabel>>,
    vertex_child: Vec<Option<usize>>,
    /// For each edge, the cells that marked it.
    edge_marks: Vec<Vec<usize>>,
}

impl<T, D> MeshLevel<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn new(mesh: SimplexMesh<T, D>, cells: Vec<CellRecord>, vertex_origin: Vec<Option<VertexLabel>>) -> Self {
        assert_eq!(cells.len(), mesh.num_cells());
        assert_eq!(vertex_origin.len(), mesh.num_vertices());
        Self {
            vertex_child: vec![None; mesh.num_vertices()],
            edge_marks: vec![Vec::new(); mesh.num_edges()],
            mesh,
            cells,
            vertex_origin,
        }
    }

    pub fn mesh(&self) -> &SimplexMesh<T, D> {
        &self.mesh
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[CellRecord] {
        &self.cells
    }

    pub fn cell(&self, cell: usize) -> &CellRecord {
        &self.cells[cell]
    }

    pub fn marker(&self, cell: usize) -> CellMarker {
        self.cells[cell].marker
    }

    pub fn status(&self, cell: usize) -> CellStatus {
        self.cells[cell].status
    }

    pub fn parent(&self, cell: usize) -> Option<usize> {
        self.cells[cell].parent
    }

    pub fn children(&self, cell: usize) -> &[usize] {
        &self.cells[cell].children
    }

    pub fn vertex_origin(&self, vertex: usize) -> Option<VertexLabel> {
        self.vertex_origin[vertex]
    }

    /// The vertex of the parent level this vertex is a copy of.
    pub fn vertex_parent(&self, vertex: usize) -> Option<usize> {
        self.vertex_origin[vertex].and_then(|label| label.parent_vertex())
    }

    /// The copy of this vertex on the child level.
    pub fn vertex_child(&self, vertex: usize) -> Option<usize> {
        self.vertex_child[vertex]
    }

    /// Cells that marked the given edge.
    pub fn edge_marks(&self, edge: usize) -> &[usize] {
        &self.edge_marks[edge]
    }

    pub fn is_edge_marked(&self, edge: usize) -> bool {
        !self.edge_marks[edge].is_empty()
    }

    pub fn num_marked_edges(&self) -> usize {
        self.edge_marks
            .iter()
            .filter(|marks| !marks.is_empty())
            .count()
    }

    /// Marks of the cell's edges, in local edge order.
    pub fn marked_local_edges(&self, cell: usize) -> Vec<bool> {
        marked_local_edges(&self.mesh, &self.edge_marks, cell)
    }

    fn update_edge_marks(&mut self) {
        self.edge_marks.iter_mut().for_each(Vec::clear);
        for cell in 0..self.cells.len() {
            let record = &self.cells[cell];
            let marks_edges = record.marker == CellMarker::RegularRefinement
                || (record.marker == CellMarker::AccordingToRefinement
                    && record.status == CellStatus::RegularlyRefined);
            if marks_edges {
                for &edge in self.mesh.topology().cell_edges(cell) {
                    mark_edge(&mut self.edge_marks[edge], cell);
                }
            }
        }
    }
}

fn mark_edge(marks: &mut Vec<usize>, cell: usize) {
    if !marks.contains(&cell) {
        marks.push(cell);
    }
}

fn marked_local_edges<T, D>(mesh: &SimplexMesh<T, D>, edge_marks: &[Vec<usize>], cell: usize) -> Vec<bool>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh.topology()
        .cell_edges(cell)
        .iter()
        .map(|&edge| !edge_marks[edge].is_empty())
        .collect()
}

fn edge_marked_by_other<T, D>(mesh: &SimplexMesh<T, D>, edge_marks: &[Vec<usize>], cell: usize) -> bool
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh.topology()
        .cell_edges(cell)
        .iter()
        .any(|&edge| edge_marks[edge].iter().any(|&marker| marker != cell))
}

/// A hierarchy of nested meshes with red/green refinement and coarsening.
#[derive(Debug, Clone)]
pub struct MeshHierarchy<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    levels: Vec<MeshLevel<T, D>>,
    parameters: ClosureParameters,
}

impl<T, D> MeshHierarchy<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates a hierarchy consisting only of the given mesh, with all cells unmarked.
    pub fn new(mesh: SimplexMesh<T, D>) -> Self {
        let cells = vec![CellRecord::new(None); mesh.num_cells()];
        let vertex_origin = vec![None; mesh.num_vertices()];
        Self {
            levels: vec![MeshLevel::new(mesh, cells, vertex_origin)],
            parameters: ClosureParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ClosureParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn parameters(&self) -> &ClosureParameters {
        &self.parameters
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[MeshLevel<T, D>] {
        &self.levels
    }

    pub fn level(&self, k: usize) -> &MeshLevel<T, D> {
        &self.levels[k]
    }

    pub fn coarse(&self) -> &MeshLevel<T, D> {
        &self.levels[0]
    }

    pub fn fine(&self) -> &MeshLevel<T, D> {
        self.levels.last().expect("A hierarchy always has at least one level.")
    }

    fn finest_index(&self) -> usize {
        self.levels.len() - 1
    }

    fn check_level(&self, k: usize) -> Result<(), RefinementError> {
        if k < self.levels.len() {
            Ok(())
        } else {
            Err(RefinementError::LevelOutOfBounds {
                level: k,
                num_levels: self.levels.len(),
            })
        }
    }

    /// Sets the marker of a cell on the finest level.
    ///
    /// Only [`CellMarker::RegularRefinement`], [`CellMarker::NoRefinement`] and
    /// [`CellMarker::Coarsening`] are valid for [`refine`](Self::refine).
    pub fn mark_cell(&mut self, cell: usize, marker: CellMarker) {
        let finest = self.finest_index();
        self.levels[finest].cells[cell].marker = marker;
    }

    /// Marks every cell of the finest level set in `markers` for regular refinement.
    pub fn mark_cells(&mut self, markers: &MeshFunction<bool>) -> Result<(), RefinementError> {
        let fine = self.fine();
        if markers.dim() != fine.mesh.topological_dim() {
            return Err(RefinementError::MarkerDimensionMismatch {
                expected: fine.mesh.topological_dim(),
                actual: markers.dim(),
            });
        }
        if markers.len() != fine.num_cells() {
            return Err(RefinementError::MarkerCountMismatch {
                expected: fine.num_cells(),
                actual: markers.len(),
            });
        }
        for cell in markers.indices_where(&true).collect::<Vec<_>>() {
            self.mark_cell(cell, CellMarker::RegularRefinement);
        }
        Ok(())
    }

    /// Recomputes the edge marks of a level from its cell markers.
    ///
    /// A cell marks all its edges if it is marked for regular refinement, or if it is regularly
    /// refined and its refinement is kept.
    pub fn update_edge_marks(&mut self, k: usize) -> Result<(), RefinementError> {
        self.check_level(k)?;
        self.levels[k].update_edge_marks();
        Ok(())
    }

    /// Children of irregularly refined cells must not be refined.
    fn ok_to_refine(&self, k: usize, cell: usize) -> bool {
        match self.levels[k].cells[cell].parent {
            None => true,
            Some(parent) => self.levels[k - 1].cells[parent].status != CellStatus::IrregularlyRefined,
        }
    }

    /// Performs the green closure of a level.
    ///
    /// Irregular markers are reset first. Every cell with an edge marked by another cell is then
    /// put on a work list. A cell taken from the list receives the rule matching its marked
    /// edges. If no rule matches, it is promoted to regular refinement, marks its remaining
    /// edges and puts the cells sharing those edges back on the list.
    pub fn close_level(&mut self, k: usize) -> Result<ClosureReport, RefinementError> {
        self.check_level(k)?;
        let refinable: Vec<bool> = (0..self.levels[k].num_cells())
            .map(|cell| self.ok_to_refine(k, cell))
            .collect();
        let MeshLevel {
            mesh, cells, edge_marks, ..
        } = &mut self.levels[k];
        let mesh = &*mesh;
        let topology = mesh.topology();
        let cell_type = mesh.cell_type();
        let max_iterations = self.parameters.max_iterations.unwrap_or(mesh.num_edges());

        let mut closed = vec![true; cells.len()];
        let mut work_list = VecDeque::new();
        for (cell, record) in cells.iter_mut().enumerate() {
            if let CellMarker::IrregularRefinement(_) = record.marker {
                record.marker = CellMarker::NoRefinement;
            }
            if refinable[cell] && edge_marked_by_other(mesh, edge_marks, cell) {
                work_list.push_back(cell);
                closed[cell] = false;
            }
        }

        let mut report = ClosureReport::default();
        while let Some(cell) = work_list.pop_front() {
            report.visited += 1;
            let marked = marked_local_edges(mesh, edge_marks, cell);
            if let Some(rule) = select_rule(cell_type, &marked) {
                cells[cell].marker = rule.into();
                closed[cell] = true;
                continue;
            }

            report.promotions += 1;
            if report.promotions > max_iterations {
                return Err(RefinementError::ClosureDidNotConverge {
                    level: k,
                    max_iterations,
                });
            }
            cells[cell].marker = CellMarker::RegularRefinement;
            for (&edge, _) in topology
                .cell_edges(cell)
                .iter()
                .zip(&marked)
                .filter(|(_, is_marked)| !**is_marked)
            {
                mark_edge(&mut edge_marks[edge], cell);
                for &neighbor in topology.edge_cells(edge) {
                    if neighbor != cell && closed[neighbor] && refinable[neighbor] {
                        work_list.push_back(neighbor);
                        closed[neighbor] = false;
                    }
                }
            }
            closed[cell] = true;
        }

        debug!(
            "Closed level {}: visited {} cells, {} promotions",
            k, report.visited, report.promotions
        );
        Ok(report)
    }

    fn check_pre_condition(&self) -> Result<(), RefinementError> {
        let finest = self.finest_index();
        for (k, level) in self.levels.iter().enumerate() {
            for (cell, record) in level.cells.iter().enumerate() {
                let valid = if k == finest {
                    matches!(
                        record.marker,
                        CellMarker::RegularRefinement | CellMarker::NoRefinement | CellMarker::Coarsening
                    )
                } else {
                    record.marker == CellMarker::AccordingToRefinement
                };
                if !valid {
                    return Err(RefinementError::PreConditionViolated {
                        level: k,
                        reason: format!("cell {} has marker {:?}", cell, record.marker),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_post_condition(&self) -> Result<(), RefinementError> {
        let finest = self.finest_index();
        for (k, level) in self.levels.iter().enumerate() {
            let expected = if k == finest {
                CellMarker::NoRefinement
            } else {
                CellMarker::AccordingToRefinement
            };
            if let Some(cell) = level.cells.iter().position(|record| record.marker != expected) {
                return Err(RefinementError::PostConditionViolated {
                    level: k,
                    reason: format!("cell {} has marker {:?}", cell, level.cells[cell].marker),
                });
            }
        }
        Ok(())
    }

    /// Copies the markers of leaf cells on the finest level to their ancestors that are leaves too.
    ///
    /// A cell that is not refined further is copied to every finer level, and all copies must
    /// agree on the marker.
    fn propagate_leaf_marks(&mut self) {
        let finest = self.finest_index();
        for cell in 0..self.levels[finest].num_cells() {
            let marker = self.levels[finest].cells[cell].marker;
            let mut parent = self.levels[finest].cells[cell].parent;
            let mut k = finest;
            while let Some(p) = parent {
                k -= 1;
                let record = &mut self.levels[k].cells[p];
                if record.status != CellStatus::Unrefined {
                    break;
                }
                debug_assert_eq!(record.children.len(), 1);
                record.marker = marker;
                parent = record.parent;
            }
        }
    }

    /// Derives the markers of refined cells on a level from the state of their children.
    ///
    /// A regularly refined cell whose children are all marked for coarsening is no longer
    /// refined. An irregularly refined cell is refined regularly if an edge of one of its
    /// children is marked. Otherwise its irregular refinement is discarded and recomputed by
    /// the closure of the level.
    fn evaluate_marks(&mut self, k: usize) {
        let (coarse, fine) = self.levels.split_at_mut(k + 1);
        let level = &mut coarse[k];
        let child_level = &fine[0];
        for record in &mut level.cells {
            match record.status {
                CellStatus::RegularlyRefined => {
                    let coarsen = !record.children.is_empty()
                        && record
                            .children
                            .iter()
                            .all(|&child| child_level.cells[child].marker == CellMarker::Coarsening);
                    if coarsen {
                        record.marker = CellMarker::NoRefinement;
                    }
                }
                CellStatus::IrregularlyRefined => {
                    let child_edge_marked = record.children.iter().any(|&child| {
                        child_level
                            .mesh
                            .topology()
                            .cell_edges(child)
                            .iter()
                            .any(|&edge| child_level.is_edge_marked(edge))
                    });
                    record.marker = if child_edge_marked {
                        CellMarker::RegularRefinement
                    } else {
                        CellMarker::NoRefinement
                    };
                }
                CellStatus::Unrefined => {}
            }
        }
        level.update_edge_marks();
    }

    /// Rebuilds level `k + 1` from the markers of level `k`, creating it if `k` is the finest.
    ///
    /// Children of cells whose refinement is kept are reused together with their vertices, all
    /// other cells of level `k` are refined according to their markers. Reused cells and
    /// vertices come first in their previous order, new ones follow in order of creation.
    fn rebuild_child_level(&mut self, k: usize) {
        let full = self.levels[k].mesh.cell_type().num_regular_children();
        for record in &mut self.levels[k].cells {
            let keep_copy = record.marker == CellMarker::NoRefinement
                && record.status == CellStatus::Unrefined
                && record.children.len() == 1;
            let keep_regular = record.marker == CellMarker::RegularRefinement
                && record.status == CellStatus::RegularlyRefined
                && record.children.len() == full;
            if keep_copy || keep_regular {
                record.marker = CellMarker::AccordingToRefinement;
            }
            if record.marker == CellMarker::Coarsening {
                record.marker = CellMarker::NoRefinement;
            }
        }

        let mut labelling = VertexLabelling::default();
        let mut connectivity = Vec::new();
        let mut records = Vec::new();
        let mut reused_vertex_children = Vec::new();
        let mut cell_map: Vec<Option<usize>> = Vec::new();
        let mut vertex_map: Vec<Option<usize>> = Vec::new();

        if let Some(old) = self.levels.get(k + 1) {
            let mut reuse_cell = vec![false; old.num_cells()];
            for record in &self.levels[k].cells {
                if record.marker == CellMarker::AccordingToRefinement {
                    record.children.iter().for_each(|&child| reuse_cell[child] = true);
                }
            }
            let mut reuse_vertex = vec![false; old.mesh.num_vertices()];
            for cell in (0..old.num_cells()).filter(|&c| reuse_cell[c]) {
                for &v in old.mesh.cell_vertices(cell) {
                    reuse_vertex[v] = true;
                }
            }

            vertex_map = vec![None; old.mesh.num_vertices()];
            for v in (0..old.mesh.num_vertices()).filter(|&v| reuse_vertex[v]) {
                let label = old.vertex_origin[v].expect("Reused vertex must derive from the parent level.");
                vertex_map[v] = Some(labelling.index_of(label));
                reused_vertex_children.push(old.vertex_child[v]);
            }
            cell_map = vec![None; old.num_cells()];
            for cell in (0..old.num_cells()).filter(|&c| reuse_cell[c]) {
                cell_map[cell] = Some(records.len());
                connectivity.extend(
                    old.mesh
                        .cell_vertices(cell)
                        .iter()
                        .map(|&v| vertex_map[v].expect("Vertices of reused cells are reused.")),
                );
                records.push(old.cells[cell].clone());
            }
        }

        let level = &mut self.levels[k];
        let cell_type = level.mesh.cell_type();
        let mut num_refined = 0;
        for cell in 0..level.cells.len() {
            if level.cells[cell].marker == CellMarker::AccordingToRefinement {
                for child in &mut level.cells[cell].children {
                    *child = cell_map[*child].expect("Children of kept cells are reused.");
                    records[*child].parent = Some(cell);
                }
                continue;
            }

            let rule = match level.cells[cell].marker {
                CellMarker::NoRefinement => None,
                CellMarker::RegularRefinement => Some(RefinementRule::Regular),
                CellMarker::IrregularRefinement(irregular) => Some(RefinementRule::Irregular(irregular)),
                marker => panic!("Inconsistent marker {:?} on cell {} of level {}.", marker, cell, k),
            };
            let cell_vertices = level.mesh.cell_vertices(cell);
            let children = match rule {
                None => vec![(0..cell_type.num_vertices()).map(LocalVertex::Corner).collect()],
                Some(rule) => subdivide(
                    cell_type,
                    rule,
                    &marked_local_edges(&level.mesh, &level.edge_marks, cell),
                    &level.mesh.cell_points(cell),
                ),
            };

            let mut child_indices = Vec::with_capacity(children.len());
            for child in children {
                child_indices.push(records.len());
                connectivity.extend(
                    child
                        .iter()
                        .map(|&local| labelling.index_of(VertexLabel::from_local(local, cell_type, cell_vertices))),
                );
                records.push(CellRecord::new(Some(cell)));
            }
            if rule.is_some() {
                num_refined += 1;
            }

            let record = &mut level.cells[cell];
            record.children = child_indices;
            record.status = match rule {
                None => CellStatus::Unrefined,
                Some(RefinementRule::Regular) => CellStatus::RegularlyRefined,
                Some(RefinementRule::Irregular(_)) => CellStatus::IrregularlyRefined,
            };
            record.marker = CellMarker::AccordingToRefinement;
        }

        let vertices = labelling.construct_vertices(level.mesh.vertices());
        let labels = labelling.into_labels();
        level.vertex_child = vec![None; level.mesh.num_vertices()];
        for (index, label) in labels.iter().enumerate() {
            if let VertexLabel::Copy(v) = label {
                level.vertex_child[*v] = Some(index);
            }
        }

        let mesh = SimplexMesh::from_parts(cell_type, vertices, connectivity);
        let mut child_level = MeshLevel::new(mesh, records, labels.into_iter().map(Some).collect());
        for (v, child) in reused_vertex_children.into_iter().enumerate() {
            child_level.vertex_child[v] = child;
        }
        child_level.update_edge_marks();
        debug!(
            "Rebuilt level {}: {} cells refined, {} cells",
            k + 1,
            num_refined,
            child_level.num_cells()
        );

        if k + 1 < self.levels.len() {
            if let Some(grandchild) = self.levels.get_mut(k + 2) {
                for record in &mut grandchild.cells {
                    record.parent = record.parent.and_then(|p| cell_map[p]);
                }
                for origin in &mut grandchild.vertex_origin {
                    *origin = origin.and_then(|label| label.map_vertices(|v| vertex_map[v]));
                }
            }
            self.levels[k + 1] = child_level;
        } else {
            self.levels.push(child_level);
        }
    }

    /// Parents of cells on level `k` that must not be refined but have a marked edge.
    ///
    /// Such a cell is a child of an irregularly refined cell, and its parent has to be refined
    /// regularly for level `k + 1` to be conforming.
    fn green_parents_to_promote(&self, k: usize) -> Vec<usize> {
        let level = &self.levels[k];
        let topology = level.mesh.topology();
        let mut parents: Vec<usize> = (0..level.num_cells())
            .filter(|&cell| !self.ok_to_refine(k, cell))
            .filter(|&cell| {
                topology
                    .cell_edges(cell)
                    .iter()
                    .any(|&edge| level.is_edge_marked(edge))
            })
            .filter_map(|cell| level.cells[cell].parent)
            .collect();
        parents.sort_unstable();
        parents.dedup();
        parents
    }

    /// Removes trailing levels that are plain copies of the level before them.
    fn drop_redundant_levels(&mut self) -> usize {
        let mut removed = 0;
        while self.levels.len() > 1 {
            let k = self.levels.len() - 2;
            let is_copy = self.levels[k]
                .cells
                .iter()
                .all(|record| record.status == CellStatus::Unrefined);
            if !is_copy {
                break;
            }
            self.levels.pop();
            removed += 1;
            let level = &mut self.levels[k];
            for record in &mut level.cells {
                record.children.clear();
                record.marker = CellMarker::NoRefinement;
            }
            level.vertex_child.iter_mut().for_each(|child| *child = None);
            level.update_edge_marks();
        }
        removed
    }

    /// Refines and coarsens the hierarchy according to the markers on the finest level.
    ///
    /// Before refinement, all cells of coarser levels must be marked
    /// [`CellMarker::AccordingToRefinement`] and all cells of the finest level one of
    /// [`CellMarker::RegularRefinement`], [`CellMarker::NoRefinement`] or
    /// [`CellMarker::Coarsening`]. Afterwards, coarser levels are again marked
    /// [`CellMarker::AccordingToRefinement`] and the new finest level
    /// [`CellMarker::NoRefinement`].
    ///
    /// The hierarchy gains a level if any cell was refined. Trailing levels that are plain copies
    /// of the level before them are removed, which is how coarsening reduces the number of levels.
    pub fn refine(&mut self, timings: &mut Timings) -> Result<(), RefinementError> {
        self.check_pre_condition()?;
        self.propagate_leaf_marks();
        self.levels.iter_mut().for_each(MeshLevel::update_edge_marks);

        let finest = self.finest_index();
        let start = Instant::now();
        for k in (0..=finest).rev() {
            if k != finest {
                self.evaluate_marks(k);
            }
            self.close_level(k)?;
        }
        timings.record("hierarchy refinement: top-down closure", start.elapsed());

        info!("Level 0: initial mesh has {} cells", self.levels[0].num_cells());
        let start = Instant::now();
        let mut k = 0;
        while k <= finest {
            self.levels[k].update_edge_marks();
            self.close_level(k)?;
            let parents = self.green_parents_to_promote(k);
            if !parents.is_empty() {
                debug!(
                    "Level {}: promoting {} irregularly refined cells to regular refinement",
                    k - 1,
                    parents.len()
                );
                for parent in parents {
                    self.levels[k - 1].cells[parent].marker = CellMarker::RegularRefinement;
                }
                k -= 1;
                continue;
            }
            self.rebuild_child_level(k);
            info!(
                "Level {}: refined mesh has {} cells",
                k + 1,
                self.levels[k + 1].num_cells()
            );
            k += 1;
        }
        timings.record("hierarchy refinement: bottom-up refinement", start.elapsed());

        let removed = self.drop_redundant_levels();
        if removed > 0 {
            debug!("Removed {} redundant levels", removed);
        }
        info!(
            "Hierarchy has {} levels, finest level has {} cells",
            self.num_levels(),
            self.fine().num_cells()
        );
        self.check_post_condition()
    }
}
