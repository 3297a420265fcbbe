//! Degree-of-freedom maps and sparsity patterns.
use crate::element::FiniteElement;
use crate::mesh::topology::MeshTopology;
use crate::mesh::SimplexMesh;
use crate::Real;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint};
use nalgebra_sparse::pattern::SparsityPattern;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DofMapError {
    #[error("sub-system {path:?} is invalid: level {depth} has {num_sub_elements} sub-elements")]
    InvalidSubSystem {
        path: Vec<usize>,
        depth: usize,
        num_sub_elements: usize,
    },
}

/// Maps the local dofs of every cell to global dof indices.
///
/// A dof map is built from an element and a mesh. Dofs shared between cells, such as vertex dofs
/// of continuous elements, receive a single global index. Global indices of a complete map form
/// the range `0..global_dimension`.
///
/// A sub-map extracted with [`extract_sub_dofmap`](Self::extract_sub_dofmap) restricts each cell
/// to the local dofs of one sub-element but keeps the global indices of the complete map. Its
/// indices form the range `offset..offset + global_dimension`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofMap {
    local_dimension: usize,
    global_dimension: usize,
    offset: usize,
    cell_dofs: Vec<usize>,
    facet_dofs: Vec<Vec<usize>>,
}

impl DofMap {
    /// Builds the dof map of `element` on `mesh`.
    ///
    /// # Panics
    ///
    /// Panics if the element's global numbering is not dense, i.e. if some index below the
    /// largest tabulated index is never used, or if the element reports a different global
    /// dimension than it tabulates.
    pub fn build<T, D>(element: &dyn FiniteElement<T, D>, mesh: &SimplexMesh<T, D>) -> Self
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        assert_eq!(
            element.cell_type(),
            mesh.cell_type(),
            "Element and mesh cell types must agree."
        );
        let local_dimension = element.space_dimension();
        let mut cell_dofs = vec![0; local_dimension * mesh.num_cells()];
        let mut max_dof = None;
        for (cell, dofs) in cell_dofs.chunks_exact_mut(local_dimension.max(1)).enumerate() {
            element.tabulate_dofs(&mut dofs[..local_dimension], mesh, cell);
            max_dof = dofs[..local_dimension].iter().copied().chain(max_dof).max();
        }

        let global_dimension = max_dof.map(|max| max + 1).unwrap_or(0);
        let mut used = vec![false; global_dimension];
        cell_dofs.iter().for_each(|&dof| used[dof] = true);
        assert!(
            used.iter().all(|&used| used),
            "Dof numbering of {} has gaps.",
            element.signature()
        );
        assert_eq!(
            global_dimension,
            element.global_dimension(mesh),
            "Tabulated dofs of {} do not match its global dimension.",
            element.signature()
        );

        debug!(
            "Built dof map for {}: {} cells, {} dofs",
            element.signature(),
            mesh.num_cells(),
            global_dimension
        );
        Self {
            local_dimension,
            global_dimension,
            offset: 0,
            cell_dofs,
            facet_dofs: Self::facet_dofs_of(element),
        }
    }

    fn facet_dofs_of<T, D>(element: &dyn FiniteElement<T, D>) -> Vec<Vec<usize>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        (0..element.cell_type().num_facets())
            .map(|local_facet| {
                let mut dofs = vec![0; element.num_facet_dofs()];
                element.tabulate_facet_dofs(&mut dofs, local_facet);
                dofs
            })
            .collect()
    }

    pub fn num_cells(&self) -> usize {
        if self.local_dimension == 0 {
            0
        } else {
            self.cell_dofs.len() / self.local_dimension
        }
    }

    /// Number of local dofs per cell.
    pub fn local_dimension(&self) -> usize {
        self.local_dimension
    }

    pub fn global_dimension(&self) -> usize {
        self.global_dimension
    }

    /// The smallest global index of this (sub-)map.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Global dof indices of the cell's local dofs.
    pub fn tabulate_dofs(&self, cell: usize) -> &[usize] {
        let n = self.local_dimension;
        &self.cell_dofs[n * cell..n * (cell + 1)]
    }

    /// Local dof indices on the given local facet.
    pub fn tabulate_facet_dofs(&self, local_facet: usize) -> &[usize] {
        &self.facet_dofs[local_facet]
    }

    pub fn tabulate_coordinates<T, D>(
        &self,
        element: &dyn FiniteElement<T, D>,
        mesh: &SimplexMesh<T, D>,
        cell: usize,
    ) -> Vec<OPoint<T, D>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        assert_eq!(element.space_dimension(), self.local_dimension);
        let mut coordinates = vec![OPoint::origin(); self.local_dimension];
        element.tabulate_dof_coordinates(&mut coordinates, mesh, cell);
        coordinates
    }

    /// Extracts the map of a sub-element of the element this map was built from.
    ///
    /// `path` selects a sub-element recursively: `[1]` is the second sub-element, `[1, 0]` the
    /// first sub-element of that one. Returns the sub-element together with its map.
    pub fn extract_sub_dofmap<T, D>(
        &self,
        element: &Arc<dyn FiniteElement<T, D>>,
        mesh: &SimplexMesh<T, D>,
        path: &[usize],
    ) -> Result<(Arc<dyn FiniteElement<T, D>>, DofMap), DofMapError>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let mut element = Arc::clone(element);
        let mut local_offset = 0;
        let mut global_offset = self.offset;
        for (depth, &component) in path.iter().enumerate() {
            let num_sub_elements = element.num_sub_elements();
            let invalid = || DofMapError::InvalidSubSystem {
                path: path.to_vec(),
                depth,
                num_sub_elements,
            };
            if component >= num_sub_elements {
                return Err(invalid());
            }
            for i in 0..component {
                let preceding = element.sub_element(i).ok_or_else(invalid)?;
                local_offset += preceding.space_dimension();
                global_offset += preceding.global_dimension(mesh);
            }
            element = element.sub_element(component).ok_or_else(invalid)?;
        }

        let local_dimension = element.space_dimension();
        let cell_dofs = self
            .cell_dofs
            .chunks_exact(self.local_dimension.max(1))
            .flat_map(|dofs| dofs[local_offset..local_offset + local_dimension].iter().copied())
            .collect();
        let dofmap = DofMap {
            local_dimension,
            global_dimension: element.global_dimension(mesh),
            offset: global_offset,
            cell_dofs,
            facet_dofs: Self::facet_dofs_of(element.as_ref()),
        };
        Ok((element, dofmap))
    }

    /// Sparsity pattern of a square operator on this map, without interior facet couplings.
    pub fn sparsity_pattern(&self) -> SparsityPattern {
        build_sparsity_pattern(self, self, None)
    }
}

/// Builds the sparsity pattern of an operator with the given test (row) and trial (column) maps.
///
/// Every pair of dofs sharing a cell is coupled. If `interior_facets` is given, the dofs of the
/// two cells on each side of an interior facet are coupled too, as needed by interior facet
/// integrals.
pub fn build_sparsity_pattern(
    test: &DofMap,
    trial: &DofMap,
    interior_facets: Option<&MeshTopology>,
) -> SparsityPattern {
    assert_eq!(test.num_cells(), trial.num_cells(), "Dof maps must cover the same mesh.");
    let mut entries = BTreeSet::new();
    let mut couple = |rows: &[usize], cols: &[usize]| {
        for &i in rows {
            for &j in cols {
                entries.insert((i, j));
            }
        }
    };

    for cell in 0..test.num_cells() {
        couple(test.tabulate_dofs(cell), trial.tabulate_dofs(cell));
    }
    if let Some(topology) = interior_facets {
        for facet in topology.interior_facets() {
            let cells = topology.facet_cells(facet);
            let rows: Vec<_> = cells.iter().flat_map(|&c| test.tabulate_dofs(c)).copied().collect();
            let cols: Vec<_> = cells.iter().flat_map(|&c| trial.tabulate_dofs(c)).copied().collect();
            couple(&rows, &cols);
        }
    }

    let num_rows = test.offset() + test.global_dimension();
    let num_cols = trial.offset() + trial.global_dimension();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(entries.len());
    offsets.push(0);
    for (i, j) in entries {
        // Loop to handle consecutive empty rows
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, offsets, column_indices)
        .expect("Entries are sorted and unique, so the pattern is valid.")
}
