//! Forms of piecewise linear (and for jump penalties, piecewise constant) Lagrange elements.
//!
//! Local tensors are computed in closed form from the barycentric gradients and the measure of
//! each simplex, so the forms work on simplices of any dimension, including meshes embedded in a
//! higher-dimensional space.
use crate::assembly::Form;
use crate::element::{FiniteElement, LagrangeElement};
use crate::mesh::geometry::{barycentric_gradients, simplex_volume};
use crate::mesh::{CellType, SimplexMesh};
use crate::Real;
use eyre::eyre;
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OVector};
use numeric_literals::replace_float_literals;
use std::sync::Arc;

/// Measure and barycentric gradients of a cell.
fn cell_geometry<T, D>(mesh: &SimplexMesh<T, D>, cell: usize) -> eyre::Result<(T, Vec<OVector<T, D>>)>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let points = mesh.cell_points(cell);
    let gradients = barycentric_gradients(&points).ok_or_else(|| eyre!("cell {} is degenerate", cell))?;
    Ok((simplex_volume(&points), gradients))
}

/// Entry `(i, j)` of the P1 mass matrix of a simplex of dimension `dim` with unit measure.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn p1_mass_entry<T: Real>(dim: usize, i: usize, j: usize) -> T {
    let d: T = convert(dim as f64);
    let numerator = if i == j { 2.0 } else { 1.0 };
    numerator / ((d + 1.0) * (d + 2.0))
}

fn local_facet_volume<T, D>(mesh: &SimplexMesh<T, D>, cell: usize, local_facet: usize) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    simplex_volume(&mesh.local_facet_points(cell, local_facet))
}

/// The stiffness form `∫ ∇u · ∇v`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LaplaceForm {
    element: LagrangeElement,
}

impl LaplaceForm {
    pub fn new(cell_type: CellType) -> Self {
        Self {
            element: LagrangeElement::new(cell_type, 1),
        }
    }
}

impl<T, D> Form<T, D> for LaplaceForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        2
    }

    fn element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn tabulate_cell_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        _coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
    ) -> eyre::Result<()> {
        let (volume, gradients) = cell_geometry(mesh, cell)?;
        let n = gradients.len();
        for (i, g_i) in gradients.iter().enumerate() {
            for (j, g_j) in gradients.iter().enumerate() {
                tensor[i * n + j] = volume * g_i.dot(g_j);
            }
        }
        Ok(())
    }
}

/// The mass form `∫ ρ u v` with constant density `ρ`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MassForm<T> {
    element: LagrangeElement,
    density: T,
}

impl<T: Real> MassForm<T> {
    pub fn new(cell_type: CellType, density: T) -> Self {
        Self {
            element: LagrangeElement::new(cell_type, 1),
            density,
        }
    }

    pub fn density(&self) -> T {
        self.density
    }
}

impl<T, D> Form<T, D> for MassForm<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        2
    }

    fn element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn tabulate_cell_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        _coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
    ) -> eyre::Result<()> {
        let volume = mesh.cell_volume(cell);
        let dim = mesh.topological_dim();
        let n = dim + 1;
        for i in 0..n {
            for j in 0..n {
                tensor[i * n + j] = self.density * volume * p1_mass_entry(dim, i, j);
            }
        }
        Ok(())
    }
}

/// The load form `∫ f v`, with `f` interpolated into the P1 space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SourceForm {
    element: LagrangeElement,
}

impl SourceForm {
    pub fn new(cell_type: CellType) -> Self {
        Self {
            element: LagrangeElement::new(cell_type, 1),
        }
    }
}

impl<T, D> Form<T, D> for SourceForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        1
    }

    fn element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_coefficients(&self) -> usize {
        1
    }

    fn coefficient_element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn tabulate_cell_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
    ) -> eyre::Result<()> {
        let f = coefficients.first().ok_or_else(|| eyre!("missing source coefficient"))?;
        let volume = mesh.cell_volume(cell);
        let dim = mesh.topological_dim();
        for (i, b_i) in tensor.iter_mut().enumerate() {
            *b_i = f
                .iter()
                .enumerate()
                .fold(T::zero(), |sum, (j, &f_j)| sum + volume * p1_mass_entry(dim, i, j) * f_j);
        }
        Ok(())
    }
}

/// The boundary load form `∫_∂Ω g v`, with `g` interpolated into the P1 space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoundarySourceForm {
    element: LagrangeElement,
}

impl BoundarySourceForm {
    pub fn new(cell_type: CellType) -> Self {
        Self {
            element: LagrangeElement::new(cell_type, 1),
        }
    }
}

impl<T, D> Form<T, D> for BoundarySourceForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        1
    }

    fn element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_coefficients(&self) -> usize {
        1
    }

    fn coefficient_element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_exterior_facet_integrals(&self) -> usize {
        1
    }

    fn tabulate_exterior_facet_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
        local_facet: usize,
    ) -> eyre::Result<()> {
        let g = coefficients.first().ok_or_else(|| eyre!("missing boundary source coefficient"))?;
        let area = local_facet_volume(mesh, cell, local_facet);
        let facet_dim = mesh.topological_dim() - 1;
        let cell_type = mesh.cell_type();
        for (a, i) in cell_type.facet_vertices(local_facet).enumerate() {
            tensor[i] = cell_type
                .facet_vertices(local_facet)
                .enumerate()
                .fold(T::zero(), |sum, (b, j)| sum + area * p1_mass_entry(facet_dim, a, b) * g[j]);
        }
        Ok(())
    }
}

/// The interior penalty form `∫_F [u] [v]` over interior facets, where `[u]` is the jump of `u`
/// across the facet.
///
/// For continuous elements the jumps vanish and the assembled matrix is zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JumpPenaltyForm {
    element: LagrangeElement,
}

impl JumpPenaltyForm {
    /// # Panics
    ///
    /// Panics unless `degree` is 0 or 1.
    pub fn new(cell_type: CellType, degree: usize) -> Self {
        assert!(degree <= 1, "Jump penalties are only available for degrees 0 and 1.");
        Self {
            element: LagrangeElement::new(cell_type, degree),
        }
    }

    /// Macro dofs with a nonzero trace on the facet, paired with their jump sign and the local
    /// index of their trace among the facet vertices.
    fn facet_traces<T, D>(
        &self,
        mesh: &SimplexMesh<T, D>,
        cells: [usize; 2],
        local_facets: [usize; 2],
    ) -> eyre::Result<Vec<(usize, T, usize)>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let cell_type = mesh.cell_type();
        let signs = [T::one(), -T::one()];
        if self.element.degree() == 0 {
            return Ok(vec![(0, signs[0], 0), (1, signs[1], 0)]);
        }

        let n = cell_type.num_vertices();
        let facet_vertices: Vec<usize> = cell_type
            .facet_vertices(local_facets[0])
            .map(|local| mesh.cell_vertices(cells[0])[local])
            .collect();
        let mut traces = Vec::with_capacity(2 * facet_vertices.len());
        for (side, (&cell, &local_facet)) in cells.iter().zip(&local_facets).enumerate() {
            for local in cell_type.facet_vertices(local_facet) {
                let vertex = mesh.cell_vertices(cell)[local];
                let position = facet_vertices
                    .iter()
                    .position(|&v| v == vertex)
                    .ok_or_else(|| eyre!("cells {:?} do not share facet vertex {}", cells, vertex))?;
                traces.push((side * n + local, signs[side], position));
            }
        }
        Ok(traces)
    }
}

impl<T, D> Form<T, D> for JumpPenaltyForm
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        2
    }

    fn element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_interior_facet_integrals(&self) -> usize {
        1
    }

    fn tabulate_interior_facet_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        _coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cells: [usize; 2],
        local_facets: [usize; 2],
    ) -> eyre::Result<()> {
        let area = local_facet_volume(mesh, cells[0], local_facets[0]);
        let n = 2 * FiniteElement::<T, D>::space_dimension(&self.element);
        let facet_dim = mesh.topological_dim() - 1;
        let traces = self.facet_traces(mesh, cells, local_facets)?;
        for &(i, sign_i, a) in &traces {
            for &(j, sign_j, b) in &traces {
                let trace_product = if self.element.degree() == 0 {
                    T::one()
                } else {
                    p1_mass_entry(facet_dim, a, b)
                };
                tensor[i * n + j] += sign_i * sign_j * area * trace_product;
            }
        }
        Ok(())
    }
}

/// Measures of cells and facets as a functional.
///
/// Every integral of every kind integrates the unit density, so the assembled value is the total
/// measure of the selected entities. The number of integrals per kind is configurable, which
/// allows selecting entities through sub-domain markers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeasureFunctional {
    pub num_cell_integrals: usize,
    pub num_exterior_facet_integrals: usize,
    pub num_interior_facet_integrals: usize,
}

impl MeasureFunctional {
    /// The total measure of all cells.
    pub fn volume() -> Self {
        Self {
            num_cell_integrals: 1,
            num_exterior_facet_integrals: 0,
            num_interior_facet_integrals: 0,
        }
    }

    /// The total measure of the exterior boundary.
    pub fn boundary_area() -> Self {
        Self {
            num_cell_integrals: 0,
            num_exterior_facet_integrals: 1,
            num_interior_facet_integrals: 0,
        }
    }
}

impl<T, D> Form<T, D> for MeasureFunctional
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        0
    }

    fn element(&self, i: usize) -> Arc<dyn FiniteElement<T, D>> {
        panic!("Functionals have no argument {}.", i)
    }

    fn num_cell_integrals(&self) -> usize {
        self.num_cell_integrals
    }

    fn num_exterior_facet_integrals(&self) -> usize {
        self.num_exterior_facet_integrals
    }

    fn num_interior_facet_integrals(&self) -> usize {
        self.num_interior_facet_integrals
    }

    fn tabulate_cell_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        _coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
    ) -> eyre::Result<()> {
        tensor[0] = mesh.cell_volume(cell);
        Ok(())
    }

    fn tabulate_exterior_facet_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        _coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
        local_facet: usize,
    ) -> eyre::Result<()> {
        tensor[0] = local_facet_volume(mesh, cell, local_facet);
        Ok(())
    }

    fn tabulate_interior_facet_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        _coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cells: [usize; 2],
        local_facets: [usize; 2],
    ) -> eyre::Result<()> {
        tensor[0] = local_facet_volume(mesh, cells[0], local_facets[0]);
        Ok(())
    }
}

/// The functional `∫ f`, with `f` interpolated into the P1 space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IntegralFunctional {
    element: LagrangeElement,
}

impl IntegralFunctional {
    pub fn new(cell_type: CellType) -> Self {
        Self {
            element: LagrangeElement::new(cell_type, 1),
        }
    }
}

impl<T, D> Form<T, D> for IntegralFunctional
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn rank(&self) -> usize {
        0
    }

    fn element(&self, i: usize) -> Arc<dyn FiniteElement<T, D>> {
        panic!("Functionals have no argument {}.", i)
    }

    fn num_coefficients(&self) -> usize {
        1
    }

    fn coefficient_element(&self, _i: usize) -> Arc<dyn FiniteElement<T, D>> {
        Arc::new(self.element)
    }

    fn num_cell_integrals(&self) -> usize {
        1
    }

    fn tabulate_cell_tensor(
        &self,
        _integral: usize,
        tensor: &mut [T],
        coefficients: &[&[T]],
        mesh: &SimplexMesh<T, D>,
        cell: usize,
    ) -> eyre::Result<()> {
        let f = coefficients.first().ok_or_else(|| eyre!("missing integrand coefficient"))?;
        let n: T = convert(f.len() as f64);
        let sum = f.iter().fold(T::zero(), |sum, &f_i| sum + f_i);
        tensor[0] = mesh.cell_volume(cell) * sum / n;
        Ok(())
    }
}
