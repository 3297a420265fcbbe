//! Dirichlet boundary conditions.
//!
//! A [`DirichletBC`] prescribes the values of a function on part of the boundary. The affected
//! dofs and their values are computed as [`BoundaryValues`] and applied to an assembled system by
//! replacing matrix rows with identity rows and overwriting the right-hand side.
use crate::dofmap::DofMapError;
use crate::function::{FunctionSpace, ValueFunction};
use crate::la::{GenericMatrix, GenericVector};
use crate::mesh::function::MeshFunction;
use crate::mesh::geometry::barycentric_coordinates;
use crate::mesh::subdomain::{mark_facets, SubDomain};
use crate::timing::Timings;
use crate::Real;
use log::{debug, info};
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryConditionError {
    #[error("boundary conditions prescribe conflicting values for dof {dof}")]
    ConflictingValues { dof: usize },
    #[error("geometric boundary search is not implemented for facets of dimension {dim}")]
    UnsupportedFacetDimension { dim: usize },
    #[error("boundary value has {actual} components, but the space has {expected}")]
    ValueDimensionMismatch { expected: usize, actual: usize },
    #[error("boundary value for dof {dof} is out of bounds for a system of dimension {dimension}")]
    DimensionMismatch { dof: usize, dimension: usize },
    #[error("facet markers must have dimension {expected_dim} and length {expected_len}, got dimension {actual_dim} and length {actual_len}")]
    MarkerMismatch {
        expected_dim: usize,
        actual_dim: usize,
        expected_len: usize,
        actual_len: usize,
    },
    #[error("pointwise boundary conditions require a sub-domain")]
    PointwiseRequiresSubDomain,
    #[error(transparent)]
    InvalidSubSystem(#[from] DofMapError),
}

/// How the dofs of a boundary condition are found.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirichletMethod {
    /// Dofs associated with the marked facets through the facet dofs of their incident cell.
    #[default]
    Topological,
    /// Dofs of all cells touching a marked facet whose coordinates lie on that facet.
    Geometric,
    /// Dofs whose coordinates are inside the sub-domain.
    Pointwise,
}

/// Prescribed values indexed by global dof, in increasing dof order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundaryValues<T> {
    values: BTreeMap<usize, T>,
}

impl<T: Real> BoundaryValues<T> {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Sets the value of a dof, replacing any previous value.
    pub fn insert(&mut self, dof: usize, value: T) {
        self.values.insert(dof, value);
    }

    pub fn get(&self, dof: usize) -> Option<T> {
        self.values.get(&dof).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = (usize, T)> {
        self.values.iter().map(|(&dof, &value)| (dof, value))
    }

    pub fn dofs(&self) -> Vec<usize> {
        self.values.keys().copied().collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.values.values().copied().collect()
    }

    fn check_dimension(&self, dimension: usize) -> Result<(), BoundaryConditionError> {
        match self.values.keys().next_back() {
            Some(&dof) if dof >= dimension => Err(BoundaryConditionError::DimensionMismatch { dof, dimension }),
            _ => Ok(()),
        }
    }

    /// Replaces the rows of all prescribed dofs by identity rows.
    pub fn apply_matrix<A>(&self, matrix: &mut A) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
    {
        self.check_dimension(matrix.nrows())?;
        matrix.ident(&self.dofs());
        matrix.apply();
        Ok(())
    }

    /// Overwrites the entries of all prescribed dofs by their values.
    pub fn apply_vector<B>(&self, vector: &mut B) -> Result<(), BoundaryConditionError>
    where
        B: GenericVector<T> + ?Sized,
    {
        self.check_dimension(vector.len())?;
        vector.set_local(&self.values(), &self.dofs());
        vector.apply();
        Ok(())
    }

    pub fn apply<A, B>(&self, matrix: &mut A, vector: &mut B) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
        B: GenericVector<T> + ?Sized,
    {
        self.check_dimension(vector.len())?;
        self.apply_matrix(matrix)?;
        self.apply_vector(vector)
    }

    /// Applies the values to the Jacobian `matrix` and `residual` of a nonlinear problem at the
    /// current iterate `x`. Residual entries of prescribed dofs become `x - g`.
    pub fn apply_nonlinear<A, B, X>(&self, matrix: &mut A, residual: &mut B, x: &X) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
        B: GenericVector<T> + ?Sized,
        X: GenericVector<T> + ?Sized,
    {
        self.check_dimension(residual.len())?;
        self.check_dimension(x.len())?;
        self.apply_matrix(matrix)?;
        let dofs = self.dofs();
        let mut current = vec![T::zero(); dofs.len()];
        x.get_local(&mut current, &dofs);
        let differences: Vec<_> = current
            .iter()
            .zip(self.values.values())
            .map(|(&x, &g)| x - g)
            .collect();
        residual.set_local(&differences, &dofs);
        residual.apply();
        Ok(())
    }

    /// Zeroes the rows of all prescribed dofs, without setting a diagonal.
    pub fn zero_rows<A>(&self, matrix: &mut A) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
    {
        self.check_dimension(matrix.nrows())?;
        matrix.zero_rows(&self.dofs());
        matrix.apply();
        Ok(())
    }
}

enum FacetSelection<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    SubDomain(Arc<dyn SubDomain<T, D>>),
    Markers { markers: MeshFunction<usize>, marker: usize },
}

/// A Dirichlet boundary condition `u = g` on part of the boundary.
pub struct DirichletBC<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    space: FunctionSpace<T, D>,
    value: Arc<dyn ValueFunction<T, D>>,
    selection: FacetSelection<T, D>,
    method: DirichletMethod,
}

impl<T, D> fmt::Debug for DirichletBC<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selection = match &self.selection {
            FacetSelection::SubDomain(_) => "sub-domain".to_string(),
            FacetSelection::Markers { marker, .. } => format!("facet marker {}", marker),
        };
        f.debug_struct("DirichletBC")
            .field("element", &self.space.element().signature())
            .field("selection", &selection)
            .field("method", &self.method)
            .finish()
    }
}

impl<T, D> DirichletBC<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// A boundary condition on the facets inside `sub_domain`.
    pub fn new(
        space: FunctionSpace<T, D>,
        value: Arc<dyn ValueFunction<T, D>>,
        sub_domain: Arc<dyn SubDomain<T, D>>,
        method: DirichletMethod,
    ) -> Self {
        Self {
            space,
            value,
            selection: FacetSelection::SubDomain(sub_domain),
            method,
        }
    }

    /// A boundary condition on the facets where `markers` equals `marker`.
    pub fn from_markers(
        space: FunctionSpace<T, D>,
        value: Arc<dyn ValueFunction<T, D>>,
        markers: MeshFunction<usize>,
        marker: usize,
        method: DirichletMethod,
    ) -> Result<Self, BoundaryConditionError> {
        let mesh = space.mesh();
        let expected_dim = mesh.topological_dim() - 1;
        if markers.dim() != expected_dim || markers.len() != mesh.num_facets() {
            return Err(BoundaryConditionError::MarkerMismatch {
                expected_dim,
                actual_dim: markers.dim(),
                expected_len: mesh.num_facets(),
                actual_len: markers.len(),
            });
        }
        Ok(Self {
            space,
            value,
            selection: FacetSelection::Markers { markers, marker },
            method,
        })
    }

    /// Restricts the condition to a sub-field of a mixed space. The value function must then
    /// have as many components as the sub-field.
    pub fn with_sub_system(mut self, path: &[usize]) -> Result<Self, BoundaryConditionError> {
        self.space = self.space.sub_space(path)?;
        Ok(self)
    }

    pub fn space(&self) -> &FunctionSpace<T, D> {
        &self.space
    }

    pub fn method(&self) -> DirichletMethod {
        self.method
    }

    fn check_value_dimension(&self, value: &dyn ValueFunction<T, D>) -> Result<(), BoundaryConditionError> {
        let expected = self.space.element().value_dimension();
        if value.value_dimension() != expected {
            return Err(BoundaryConditionError::ValueDimensionMismatch {
                expected,
                actual: value.value_dimension(),
            });
        }
        Ok(())
    }

    fn marked_facets(&self) -> Vec<usize> {
        let mesh = self.space.mesh();
        match &self.selection {
            FacetSelection::SubDomain(sub_domain) => {
                let mut markers = MeshFunction::new(mesh, mesh.topological_dim() - 1, 0);
                mark_facets(mesh, sub_domain.as_ref(), &mut markers, 1);
                let facets = markers.indices_where(&1).collect();
                facets
            }
            FacetSelection::Markers { markers, marker } => markers.indices_where(marker).collect(),
        }
    }

    /// Computes the prescribed dofs and their values.
    pub fn boundary_values(&self, timings: &mut Timings) -> Result<BoundaryValues<T>, BoundaryConditionError> {
        self.check_value_dimension(self.value.as_ref())?;
        let start = Instant::now();
        let values = match self.method {
            DirichletMethod::Topological => self.compute_topological(&self.marked_facets()),
            DirichletMethod::Geometric => self.compute_geometric(&self.marked_facets())?,
            DirichletMethod::Pointwise => self.compute_pointwise()?,
        };
        timings.record("boundary conditions: values", start.elapsed());
        info!(
            "Computed {} boundary values ({:?} search)",
            values.len(),
            self.method
        );
        Ok(values)
    }

    fn compute_topological(&self, facets: &[usize]) -> BoundaryValues<T> {
        let mesh = self.space.mesh();
        let topology = mesh.topology();
        let element = self.space.element();
        let dofmap = self.space.dofmap();
        let mut values = BoundaryValues::new();
        for &facet in facets {
            let cell = topology.facet_cells(facet)[0];
            let local_facet = topology
                .local_facet_index(cell, facet)
                .expect("Facet must be local to its incident cell.");
            let dofs = dofmap.tabulate_dofs(cell);
            for &local in dofmap.tabulate_facet_dofs(local_facet) {
                let value = element.evaluate_dof(local, self.value.as_ref(), mesh, cell);
                values.insert(dofs[local], value);
            }
        }
        debug!("Topological search visited {} facets", facets.len());
        values
    }

    fn compute_geometric(&self, facets: &[usize]) -> Result<BoundaryValues<T>, BoundaryConditionError> {
        let mesh = self.space.mesh();
        let facet_dim = mesh.topological_dim() - 1;
        if !(1..=2).contains(&facet_dim) {
            return Err(BoundaryConditionError::UnsupportedFacetDimension { dim: facet_dim });
        }
        let topology = mesh.topology();
        let element = self.space.element();
        let dofmap = self.space.dofmap();
        let mut values = BoundaryValues::new();
        for &facet in facets {
            let facet_points = mesh.facet_points(facet);
            for &vertex in topology.facet_vertices(facet) {
                for &cell in topology.vertex_cells(vertex) {
                    let coordinates = dofmap.tabulate_coordinates(element.as_ref(), mesh, cell);
                    let dofs = dofmap.tabulate_dofs(cell);
                    for (local, x) in coordinates.iter().enumerate() {
                        if on_facet(x, &facet_points) {
                            let value = element.evaluate_dof(local, self.value.as_ref(), mesh, cell);
                            values.insert(dofs[local], value);
                        }
                    }
                }
            }
        }
        Ok(values)
    }

    fn compute_pointwise(&self) -> Result<BoundaryValues<T>, BoundaryConditionError> {
        let sub_domain = match &self.selection {
            FacetSelection::SubDomain(sub_domain) => sub_domain,
            FacetSelection::Markers { .. } => return Err(BoundaryConditionError::PointwiseRequiresSubDomain),
        };
        let mesh = self.space.mesh();
        let element = self.space.element();
        let dofmap = self.space.dofmap();
        let mut values = BoundaryValues::new();
        for cell in 0..mesh.num_cells() {
            let coordinates = dofmap.tabulate_coordinates(element.as_ref(), mesh, cell);
            let dofs = dofmap.tabulate_dofs(cell);
            for (local, x) in coordinates.iter().enumerate() {
                if sub_domain.inside(x, false) {
                    let value = element.evaluate_dof(local, self.value.as_ref(), mesh, cell);
                    values.insert(dofs[local], value);
                }
            }
        }
        Ok(values)
    }

    pub fn apply<A, B>(&self, matrix: &mut A, vector: &mut B, timings: &mut Timings) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
        B: GenericVector<T> + ?Sized,
    {
        self.boundary_values(timings)?.apply(matrix, vector)
    }

    pub fn apply_matrix<A>(&self, matrix: &mut A, timings: &mut Timings) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
    {
        self.boundary_values(timings)?.apply_matrix(matrix)
    }

    pub fn apply_vector<B>(&self, vector: &mut B, timings: &mut Timings) -> Result<(), BoundaryConditionError>
    where
        B: GenericVector<T> + ?Sized,
    {
        self.boundary_values(timings)?.apply_vector(vector)
    }

    /// See [`BoundaryValues::apply_nonlinear`].
    pub fn apply_nonlinear<A, B, X>(
        &self,
        matrix: &mut A,
        residual: &mut B,
        x: &X,
        timings: &mut Timings,
    ) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
        B: GenericVector<T> + ?Sized,
        X: GenericVector<T> + ?Sized,
    {
        self.boundary_values(timings)?
            .apply_nonlinear(matrix, residual, x)
    }

    /// Zeroes the rows of the prescribed dofs.
    pub fn zero<A>(&self, matrix: &mut A, timings: &mut Timings) -> Result<(), BoundaryConditionError>
    where
        A: GenericMatrix<T> + ?Sized,
    {
        self.boundary_values(timings)?.zero_rows(matrix)
    }

    /// Checks that `value` agrees with the prescribed value at all vertices of the marked facets.
    pub fn is_compatible(&self, value: &dyn ValueFunction<T, D>) -> Result<bool, BoundaryConditionError> {
        self.check_value_dimension(self.value.as_ref())?;
        self.check_value_dimension(value)?;
        let mesh = self.space.mesh();
        let topology = mesh.topology();
        let tolerance: T = convert(1e-10);
        let n = value.value_dimension();
        let mut prescribed = vec![T::zero(); n];
        let mut given = vec![T::zero(); n];
        for facet in self.marked_facets() {
            for &vertex in topology.facet_vertices(facet) {
                let x = mesh.vertex(vertex);
                self.value.eval(&mut prescribed, x);
                value.eval(&mut given, x);
                let agrees = prescribed
                    .iter()
                    .zip(&given)
                    .all(|(&a, &b)| (a - b).abs() <= tolerance * (T::one() + a.abs()));
                if !agrees {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Whether `x` lies on the simplex spanned by `points`, up to a tolerance relative to its size.
fn on_facet<T, D>(x: &OPoint<T, D>, points: &[OPoint<T, D>]) -> bool
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let tolerance: T = convert(1e-10);
    let scale = points
        .iter()
        .skip(1)
        .map(|p| (&p.coords - &points[0].coords).norm())
        .fold(T::zero(), |max, length| max.max(length));
    let lambda = match barycentric_coordinates(points, x) {
        Some(lambda) => lambda,
        None => return false,
    };
    if lambda.iter().any(|&l| l < -tolerance) {
        return false;
    }
    let projection = points
        .iter()
        .zip(&lambda)
        .fold(OPoint::<T, D>::origin().coords, |acc, (p, &l)| acc + &p.coords * l);
    (x.coords.clone() - projection).norm() <= tolerance * scale
}

/// Merges the boundary values of several conditions.
///
/// # Errors
///
/// Returns [`BoundaryConditionError::ConflictingValues`] if two conditions prescribe different
/// values for the same dof.
pub fn collect_boundary_values<T, D>(
    bcs: &[&DirichletBC<T, D>],
    timings: &mut Timings,
) -> Result<BoundaryValues<T>, BoundaryConditionError>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let tolerance: T = convert(1e-12);
    let mut collected = BoundaryValues::<T>::new();
    for bc in bcs {
        for (dof, value) in bc.boundary_values(timings)?.iter() {
            if let Some(existing) = collected.get(dof) {
                if (existing - value).abs() > tolerance * (T::one() + value.abs()) {
                    return Err(BoundaryConditionError::ConflictingValues { dof });
                }
            }
            collected.insert(dof, value);
        }
    }
    Ok(collected)
}
