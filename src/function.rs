//! Function spaces, user-supplied value functions and coefficients of forms.
use crate::dofmap::{DofMap, DofMapError};
use crate::element::FiniteElement;
use crate::mesh::SimplexMesh;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DVector, DefaultAllocator, DimName, OPoint};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// A finite element on a mesh, together with its dof map.
#[derive(Debug, Clone)]
pub struct FunctionSpace<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh: Arc<SimplexMesh<T, D>>,
    element: Arc<dyn FiniteElement<T, D>>,
    dofmap: Arc<DofMap>,
}

impl<T, D> FunctionSpace<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(mesh: Arc<SimplexMesh<T, D>>, element: Arc<dyn FiniteElement<T, D>>) -> Self {
        let dofmap = Arc::new(DofMap::build(element.as_ref(), &mesh));
        Self { mesh, element, dofmap }
    }

    pub fn mesh(&self) -> &Arc<SimplexMesh<T, D>> {
        &self.mesh
    }

    pub fn element(&self) -> &Arc<dyn FiniteElement<T, D>> {
        &self.element
    }

    pub fn dofmap(&self) -> &Arc<DofMap> {
        &self.dofmap
    }

    pub fn dim(&self) -> usize {
        self.dofmap.global_dimension()
    }

    /// The space of a sub-element, with dofs numbered as in this space.
    pub fn sub_space(&self, path: &[usize]) -> Result<Self, DofMapError> {
        let (element, dofmap) = self.dofmap.extract_sub_dofmap(&self.element, &self.mesh, path)?;
        Ok(Self {
            mesh: Arc::clone(&self.mesh),
            element,
            dofmap: Arc::new(dofmap),
        })
    }
}

/// A function that can be evaluated at any point.
pub trait ValueFunction<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn value_dimension(&self) -> usize;

    /// Writes the `value_dimension` components of the function at `x`.
    fn eval(&self, values: &mut [T], x: &OPoint<T, D>);
}

/// A value function defined by a closure.
#[derive(Clone)]
pub struct Expression<F> {
    value_dimension: usize,
    f: F,
}

impl<F> Expression<F> {
    /// Creates an expression with `value_dimension` components. The closure receives the output
    /// slice and the evaluation point.
    pub fn new(value_dimension: usize, f: F) -> Self {
        Self { value_dimension, f }
    }
}

impl<F> Debug for Expression<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("value_dimension", &self.value_dimension)
            .finish()
    }
}

impl<T, D, F> ValueFunction<T, D> for Expression<F>
where
    T: Real,
    D: DimName,
    F: Fn(&mut [T], &OPoint<T, D>),
    DefaultAllocator: Allocator<T, D>,
{
    fn value_dimension(&self) -> usize {
        self.value_dimension
    }

    fn eval(&self, values: &mut [T], x: &OPoint<T, D>) {
        (self.f)(values, x)
    }
}

/// A spatially constant value function.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant<T> {
    values: Vec<T>,
}

impl<T: Real> Constant<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }

    pub fn scalar(value: T) -> Self {
        Self::new(vec![value])
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T, D> ValueFunction<T, D> for Constant<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn value_dimension(&self) -> usize {
        self.values.len()
    }

    fn eval(&self, values: &mut [T], _x: &OPoint<T, D>) {
        values.copy_from_slice(&self.values);
    }
}

/// A function entering a form, restricted cell by cell to the local dofs of an element.
pub trait Coefficient<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Writes the local dof values of the function on `cell` with respect to `element`.
    fn restrict(&self, values: &mut [T], element: &dyn FiniteElement<T, D>, mesh: &SimplexMesh<T, D>, cell: usize);
}

/// Restricts a value function to `cell` by applying the dof functionals of `element`.
fn interpolate_in_cell<T, D>(
    f: &dyn ValueFunction<T, D>,
    values: &mut [T],
    element: &dyn FiniteElement<T, D>,
    mesh: &SimplexMesh<T, D>,
    cell: usize,
) where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    for (i, value) in values.iter_mut().enumerate() {
        *value = element.evaluate_dof(i, f, mesh, cell);
    }
}

impl<T, D, F> Coefficient<T, D> for Expression<F>
where
    T: Real,
    D: DimName,
    F: Fn(&mut [T], &OPoint<T, D>),
    DefaultAllocator: Allocator<T, D>,
{
    fn restrict(&self, values: &mut [T], element: &dyn FiniteElement<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) {
        interpolate_in_cell(self, values, element, mesh, cell)
    }
}

impl<T, D> Coefficient<T, D> for Constant<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn restrict(&self, values: &mut [T], element: &dyn FiniteElement<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) {
        interpolate_in_cell(self, values, element, mesh, cell)
    }
}

/// A function in a finite element space, given by its global dof values.
#[derive(Debug, Clone)]
pub struct DiscreteFunction<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    space: FunctionSpace<T, D>,
    values: DVector<T>,
}

impl<T, D> DiscreteFunction<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn zeros(space: FunctionSpace<T, D>) -> Self {
        let values = DVector::zeros(space.dim());
        Self { space, values }
    }

    pub fn from_values(space: FunctionSpace<T, D>, values: DVector<T>) -> Self {
        assert_eq!(values.len(), space.dim(), "Dof values must match the space dimension.");
        Self { space, values }
    }

    /// Interpolates `f` by applying the element's dof functionals cell by cell.
    pub fn interpolate(space: FunctionSpace<T, D>, f: &dyn ValueFunction<T, D>) -> Self {
        let mut values = DVector::zeros(space.dim());
        let element = space.element();
        let mut local = vec![T::zero(); element.space_dimension()];
        for cell in 0..space.mesh().num_cells() {
            for (i, value) in local.iter_mut().enumerate() {
                *value = element.evaluate_dof(i, f, space.mesh(), cell);
            }
            for (&dof, &value) in space.dofmap().tabulate_dofs(cell).iter().zip(&local) {
                values[dof] = value;
            }
        }
        Self { space, values }
    }

    pub fn space(&self) -> &FunctionSpace<T, D> {
        &self.space
    }

    pub fn values(&self) -> &DVector<T> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut DVector<T> {
        &mut self.values
    }

    /// Evaluates the function at a point `x` of the given cell.
    pub fn eval_in_cell(&self, values: &mut [T], x: &OPoint<T, D>, cell: usize) {
        let element = self.space.element();
        let mut basis = vec![T::zero(); element.value_dimension()];
        values.iter_mut().for_each(|v| *v = T::zero());
        for (i, &dof) in self.space.dofmap().tabulate_dofs(cell).iter().enumerate() {
            element.evaluate_basis(i, &mut basis, x, self.space.mesh(), cell);
            for (value, &phi) in values.iter_mut().zip(&basis) {
                *value += self.values[dof] * phi;
            }
        }
    }
}

/// The restriction of a discrete function to a single cell, as a value function.
struct CellRestriction<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    function: &'a DiscreteFunction<T, D>,
    cell: usize,
}

impl<'a, T, D> ValueFunction<T, D> for CellRestriction<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn value_dimension(&self) -> usize {
        self.function.space.element().value_dimension()
    }

    fn eval(&self, values: &mut [T], x: &OPoint<T, D>) {
        self.function.eval_in_cell(values, x, self.cell)
    }
}

impl<T, D> Coefficient<T, D> for DiscreteFunction<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Copies the local dof values if `element` is the element of the function's space, and
    /// interpolates the function on `cell` otherwise.
    fn restrict(&self, values: &mut [T], element: &dyn FiniteElement<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) {
        if element.signature() == self.space.element().signature() {
            for (value, &dof) in values.iter_mut().zip(self.space.dofmap().tabulate_dofs(cell)) {
                *value = self.values[dof];
            }
        } else {
            let restriction = CellRestriction { function: self, cell };
            interpolate_in_cell(&restriction, values, element, mesh, cell);
        }
    }
}
