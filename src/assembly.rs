//! Assembly of global tensors from local cell and facet tensors.
//!
//! A [`Form`] describes a variational form through its elements and the local tensors it
//! produces on cells, exterior facets and interior facets. The [`Assembler`] maps those local
//! tensors into a global [`GenericTensor`] through the dof maps of the form's elements.
use crate::bc::{collect_boundary_values, DirichletBC};
use crate::dofmap::{build_sparsity_pattern, DofMap};
use crate::element::FiniteElement;
use crate::function::Coefficient;
use crate::la::{GenericMatrix, GenericTensor, GenericVector};
use crate::mesh::boundary::BoundaryMesh;
use crate::mesh::function::MeshFunction;
use crate::mesh::{CellType, SimplexMesh};
use crate::timing::Timings;
use crate::Real;
use eyre::{bail, WrapErr};
use log::{debug, info};
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub mod forms;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("form expects {expected} coefficients, got {actual}")]
    CoefficientCountMismatch { expected: usize, actual: usize },
    #[error("element {element} is defined on {element_cell_type:?} cells, but the mesh consists of {mesh_cell_type:?} cells")]
    CellTypeMismatch {
        element: String,
        element_cell_type: CellType,
        mesh_cell_type: CellType,
    },
    #[error("form of rank {form_rank} cannot be assembled into a tensor of rank {tensor_rank}")]
    RankMismatch { form_rank: usize, tensor_rank: usize },
    #[error("tensor has shape {actual:?}, but the form requires shape {expected:?}")]
    TensorDimensionMismatch { expected: Vec<usize>, actual: Vec<usize> },
    #[error("{kind} markers must have dimension {expected_dim} and length {expected_len}, got dimension {actual_dim} and length {actual_len}")]
    DomainMismatch {
        kind: &'static str,
        expected_dim: usize,
        actual_dim: usize,
        expected_len: usize,
        actual_len: usize,
    },
}

/// A variational form of rank 0 (functional), 1 (linear form) or 2 (bilinear form).
///
/// Local tensors are flat row-major arrays whose dimensions are the local dimensions of the
/// form's elements, test element first. Interior facet tensors cover the concatenated dofs of
/// both cells sharing the facet. Coefficients are passed as their local dof values with respect
/// to the coefficient elements, concatenated over both cells for interior facets.
pub trait Form<T, D>: Debug
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize;

    /// The element of argument `i`. Argument 0 is the test function, argument 1 the trial function.
    fn element(&self, i: usize) -> Arc<dyn FiniteElement<T, D>>;

    fn num_coefficients(&self) -> usize {
        0
    }

    fn coefficient_element(&self, i: usize) -> Arc<dyn FiniteElement<T, D>> {
        panic!("Form has no coefficient {}.", i)
    }

    fn num_cell_integrals(&self) -> usize {
        0
    }

    fn num_exterior_facet_integrals(&self) -> usize {
        0
    }

    fn num_interior_facet_integrals(&self) -> usize {
        0
    }

    fn tabulate_cell_tensor(
        &self,
        integral: usize,
        _tensor: &mut [T],
        _coefficients: &[&[T]],
        _mesh: &SimplexMesh<T, D>,
        _cell: usize,
    ) -> eyre::Result<()> {
        bail!("form has no cell integral {}", integral)
    }

    fn tabulate_exterior_facet_tensor(
        &self,
        integral: usize,
        _tensor: &mut [T],
        _coefficients: &[&[T]],
        _mesh: &SimplexMesh<T, D>,
        _cell: usize,
        _local_facet: usize,
    ) -> eyre::Result<()> {
        bail!("form has no exterior facet integral {}", integral)
    }

    fn tabulate_interior_facet_tensor(
        &self,
        integral: usize,
        _tensor: &mut [T],
        _coefficients: &[&[T]],
        _mesh: &SimplexMesh<T, D>,
        _cells: [usize; 2],
        _local_facets: [usize; 2],
    ) -> eyre::Result<()> {
        bail!("form has no interior facet integral {}", integral)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// Reinitialize the tensor from the form's dof maps before assembly. If disabled, the
    /// tensor must already have the right shape and contributions are added to its entries.
    pub reset_tensor: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self { reset_tensor: true }
    }
}

/// Optional sub-domain markers selecting the integral used on each entity.
///
/// An entity with marker `i` uses integral `i` of the corresponding kind, and is skipped if the
/// form has no such integral. Without markers, integral 0 is used everywhere.
#[derive(Debug, Copy, Clone, Default)]
pub struct AssemblyDomains<'a> {
    pub cells: Option<&'a MeshFunction<usize>>,
    pub exterior_facets: Option<&'a MeshFunction<usize>>,
    pub interior_facets: Option<&'a MeshFunction<usize>>,
}

impl<'a> AssemblyDomains<'a> {
    fn check<T, D>(&self, mesh: &SimplexMesh<T, D>) -> Result<(), AssemblyError>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let tdim = mesh.topological_dim();
        let markers = [
            ("cell", self.cells, tdim, mesh.num_cells()),
            ("exterior facet", self.exterior_facets, tdim - 1, mesh.num_facets()),
            ("interior facet", self.interior_facets, tdim - 1, mesh.num_facets()),
        ];
        for (kind, markers, expected_dim, expected_len) in markers {
            if let Some(markers) = markers {
                if markers.dim() != expected_dim || markers.len() != expected_len {
                    return Err(AssemblyError::DomainMismatch {
                        kind,
                        expected_dim,
                        actual_dim: markers.dim(),
                        expected_len,
                        actual_len: markers.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn integral_index(markers: Option<&MeshFunction<usize>>, entity: usize) -> usize {
    markers.map(|markers| markers[entity]).unwrap_or(0)
}

#[derive(Debug, Clone)]
struct AssemblerWorkspace<T> {
    local_tensor: Vec<T>,
    coefficient_values: Vec<Vec<T>>,
    macro_dofs: Vec<Vec<usize>>,
}

impl<T> Default for AssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            local_tensor: Vec::new(),
            coefficient_values: Vec::new(),
            macro_dofs: Vec::new(),
        }
    }
}

/// Assembles forms into global tensors.
///
/// The assembler keeps its buffers between calls, which avoids repeated allocations when the
/// same assembler is used for many forms.
#[derive(Debug)]
pub struct Assembler<T> {
    options: AssemblyOptions,
    workspace: RefCell<AssemblerWorkspace<T>>,
}

impl<T: Real> Default for Assembler<T> {
    fn default() -> Self {
        Self::new(AssemblyOptions::default())
    }
}

impl<T: Real> Assembler<T> {
    pub fn new(options: AssemblyOptions) -> Self {
        Self {
            options,
            workspace: RefCell::new(AssemblerWorkspace::default()),
        }
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    /// Assembles `form` on `mesh` into `tensor`.
    ///
    /// All arguments are validated before the tensor is touched. Errors raised while
    /// tabulating local tensors leave the tensor partially assembled.
    ///
    /// # Errors
    ///
    /// Validation failures are reported as [`AssemblyError`] inside the returned report.
    pub fn assemble<D>(
        &self,
        tensor: &mut dyn GenericTensor<T>,
        form: &dyn Form<T, D>,
        mesh: &SimplexMesh<T, D>,
        coefficients: &[&dyn Coefficient<T, D>],
        domains: &AssemblyDomains,
        timings: &mut Timings,
    ) -> eyre::Result<()>
    where
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let rank = form.rank();
        if coefficients.len() != form.num_coefficients() {
            return Err(AssemblyError::CoefficientCountMismatch {
                expected: form.num_coefficients(),
                actual: coefficients.len(),
            }
            .into());
        }
        if tensor.rank() != rank {
            return Err(AssemblyError::RankMismatch {
                form_rank: rank,
                tensor_rank: tensor.rank(),
            }
            .into());
        }
        let elements: Vec<_> = (0..rank).map(|i| form.element(i)).collect();
        let coefficient_elements: Vec<_> = (0..form.num_coefficients())
            .map(|i| form.coefficient_element(i))
            .collect();
        for element in elements.iter().chain(&coefficient_elements) {
            if element.cell_type() != mesh.cell_type() {
                return Err(AssemblyError::CellTypeMismatch {
                    element: element.signature(),
                    element_cell_type: element.cell_type(),
                    mesh_cell_type: mesh.cell_type(),
                }
                .into());
            }
        }
        domains.check(mesh)?;

        let start = Instant::now();
        let dofmaps: Vec<_> = elements
            .iter()
            .map(|element| DofMap::build(element.as_ref(), mesh))
            .collect();
        let shape: Vec<_> = dofmaps.iter().map(DofMap::global_dimension).collect();
        if self.options.reset_tensor {
            let pattern = (rank == 2).then(|| {
                let interior_facets = (form.num_interior_facet_integrals() > 0).then(|| mesh.topology());
                build_sparsity_pattern(&dofmaps[0], &dofmaps[1], interior_facets)
            });
            tensor.init(&shape, pattern.as_ref());
        } else if tensor.shape() != shape {
            return Err(AssemblyError::TensorDimensionMismatch {
                expected: shape,
                actual: tensor.shape(),
            }
            .into());
        }
        timings.record("assembly: initialization", start.elapsed());

        let mut workspace = self.workspace.borrow_mut();
        let ws = &mut *workspace;
        ws.coefficient_values.resize(coefficient_elements.len(), Vec::new());
        ws.macro_dofs.resize(rank, Vec::new());

        if form.num_cell_integrals() > 0 {
            let start = Instant::now();
            let tensor_size: usize = dofmaps.iter().map(DofMap::local_dimension).product();
            let mut num_cells = 0;
            for cell in 0..mesh.num_cells() {
                let integral = integral_index(domains.cells, cell);
                if integral >= form.num_cell_integrals() {
                    continue;
                }
                for (values, (coefficient, element)) in ws
                    .coefficient_values
                    .iter_mut()
                    .zip(coefficients.iter().zip(&coefficient_elements))
                {
                    values.resize(element.space_dimension(), T::zero());
                    coefficient.restrict(values, element.as_ref(), mesh, cell);
                }
                let coefficient_values: Vec<&[T]> = ws.coefficient_values.iter().map(Vec::as_slice).collect();

                ws.local_tensor.clear();
                ws.local_tensor.resize(tensor_size, T::zero());
                form.tabulate_cell_tensor(integral, &mut ws.local_tensor, &coefficient_values, mesh, cell)
                    .wrap_err_with(|| format!("failed to tabulate the tensor of cell {}", cell))?;

                let indices: Vec<&[usize]> = dofmaps.iter().map(|dofmap| dofmap.tabulate_dofs(cell)).collect();
                tensor.add_local(&ws.local_tensor, &indices);
                num_cells += 1;
            }
            debug!("Assembled {} cells", num_cells);
            timings.record("assembly: cells", start.elapsed());
        }

        if form.num_exterior_facet_integrals() > 0 {
            let start = Instant::now();
            let boundary = BoundaryMesh::new(mesh);
            let tensor_size: usize = dofmaps.iter().map(DofMap::local_dimension).product();
            for boundary_facet in boundary.facets() {
                let integral = integral_index(domains.exterior_facets, boundary_facet.facet);
                if integral >= form.num_exterior_facet_integrals() {
                    continue;
                }
                let cell = boundary_facet.cell;
                for (values, (coefficient, element)) in ws
                    .coefficient_values
                    .iter_mut()
                    .zip(coefficients.iter().zip(&coefficient_elements))
                {
                    values.resize(element.space_dimension(), T::zero());
                    coefficient.restrict(values, element.as_ref(), mesh, cell);
                }
                let coefficient_values: Vec<&[T]> = ws.coefficient_values.iter().map(Vec::as_slice).collect();

                ws.local_tensor.clear();
                ws.local_tensor.resize(tensor_size, T::zero());
                form.tabulate_exterior_facet_tensor(
                    integral,
                    &mut ws.local_tensor,
                    &coefficient_values,
                    mesh,
                    cell,
                    boundary_facet.local_facet,
                )
                .wrap_err_with(|| format!("failed to tabulate the tensor of exterior facet {}", boundary_facet.facet))?;

                let indices: Vec<&[usize]> = dofmaps.iter().map(|dofmap| dofmap.tabulate_dofs(cell)).collect();
                tensor.add_local(&ws.local_tensor, &indices);
            }
            debug!("Assembled {} exterior facets", boundary.num_facets());
            timings.record("assembly: exterior facets", start.elapsed());
        }

        if form.num_interior_facet_integrals() > 0 {
            let start = Instant::now();
            let topology = mesh.topology();
            let tensor_size: usize = dofmaps
                .iter()
                .map(|dofmap| 2 * dofmap.local_dimension())
                .product();
            let mut num_facets = 0;
            for facet in topology.interior_facets() {
                let integral = integral_index(domains.interior_facets, facet);
                if integral >= form.num_interior_facet_integrals() {
                    continue;
                }
                let facet_cells = topology.facet_cells(facet);
                let cells = [facet_cells[0], facet_cells[1]];
                let local_facets = cells.map(|cell| {
                    topology
                        .local_facet_index(cell, facet)
                        .expect("Facet must be local to its incident cells.")
                });

                let mut local_values = Vec::new();
                for (values, (coefficient, element)) in ws
                    .coefficient_values
                    .iter_mut()
                    .zip(coefficients.iter().zip(&coefficient_elements))
                {
                    values.clear();
                    for cell in cells {
                        local_values.resize(element.space_dimension(), T::zero());
                        coefficient.restrict(&mut local_values, element.as_ref(), mesh, cell);
                        values.extend_from_slice(&local_values);
                    }
                }
                let coefficient_values: Vec<&[T]> = ws.coefficient_values.iter().map(Vec::as_slice).collect();

                ws.local_tensor.clear();
                ws.local_tensor.resize(tensor_size, T::zero());
                form.tabulate_interior_facet_tensor(
                    integral,
                    &mut ws.local_tensor,
                    &coefficient_values,
                    mesh,
                    cells,
                    local_facets,
                )
                .wrap_err_with(|| format!("failed to tabulate the tensor of interior facet {}", facet))?;

                for (macro_dofs, dofmap) in ws.macro_dofs.iter_mut().zip(&dofmaps) {
                    macro_dofs.clear();
                    for cell in cells {
                        macro_dofs.extend_from_slice(dofmap.tabulate_dofs(cell));
                    }
                }
                let indices: Vec<&[usize]> = ws.macro_dofs.iter().map(Vec::as_slice).collect();
                tensor.add_local(&ws.local_tensor, &indices);
                num_facets += 1;
            }
            debug!("Assembled {} interior facets", num_facets);
            timings.record("assembly: interior facets", start.elapsed());
        }

        tensor.apply();
        info!("Assembled form of rank {} with global shape {:?}", rank, shape);
        Ok(())
    }
}

/// Assembles `form` on the whole mesh with default options.
pub fn assemble<T, D>(
    tensor: &mut dyn GenericTensor<T>,
    form: &dyn Form<T, D>,
    mesh: &SimplexMesh<T, D>,
    coefficients: &[&dyn Coefficient<T, D>],
    timings: &mut Timings,
) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    Assembler::default().assemble(tensor, form, mesh, coefficients, &AssemblyDomains::default(), timings)
}

/// Assembles a bilinear form `a` into `matrix` and a linear form `l` into `vector`, then applies
/// the Dirichlet conditions `bcs` to both.
#[allow(clippy::too_many_arguments)]
pub fn assemble_system<T, D, A, B>(
    matrix: &mut A,
    vector: &mut B,
    a: &dyn Form<T, D>,
    l: &dyn Form<T, D>,
    mesh: &SimplexMesh<T, D>,
    a_coefficients: &[&dyn Coefficient<T, D>],
    l_coefficients: &[&dyn Coefficient<T, D>],
    bcs: &[&DirichletBC<T, D>],
    timings: &mut Timings,
) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    A: GenericMatrix<T>,
    B: GenericVector<T>,
    DefaultAllocator: Allocator<T, D>,
{
    let assembler = Assembler::default();
    let domains = AssemblyDomains::default();
    assembler.assemble(matrix, a, mesh, a_coefficients, &domains, timings)?;
    assembler.assemble(vector, l, mesh, l_coefficients, &domains, timings)?;
    let boundary_values = collect_boundary_values(bcs, timings)?;
    boundary_values.apply(matrix, vector)?;
    Ok(())
}
