//! Finite elements: local dof numbering, dof coordinates and basis evaluation.
//!
//! [`FiniteElement`] is the capability interface the dof map, assembly and boundary conditions
//! rely on. It is object safe, so spaces and forms hold elements as
//! `Arc<dyn FiniteElement<T, D>>`.
use crate::function::ValueFunction;
use crate::mesh::geometry::barycentric_coordinates;
use crate::mesh::{CellType, SimplexMesh};
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint};
use numeric_literals::replace_float_literals;
use std::fmt::Debug;
use std::sync::Arc;

pub trait FiniteElement<T, D>: Debug + Send + Sync
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// A string identifying the element. Equal signatures imply identical dof layouts.
    fn signature(&self) -> String;

    fn cell_type(&self) -> CellType;

    /// Number of local dofs per cell.
    fn space_dimension(&self) -> usize;

    /// Number of components of the element's basis functions.
    fn value_dimension(&self) -> usize;

    /// Number of local dofs on each facet of a cell.
    fn num_facet_dofs(&self) -> usize;

    fn num_sub_elements(&self) -> usize {
        0
    }

    fn sub_element(&self, _index: usize) -> Option<Arc<dyn FiniteElement<T, D>>> {
        None
    }

    /// Total number of dofs on the given mesh.
    fn global_dimension(&self, mesh: &SimplexMesh<T, D>) -> usize;

    /// Writes the global dof indices of the cell's local dofs.
    fn tabulate_dofs(&self, dofs: &mut [usize], mesh: &SimplexMesh<T, D>, cell: usize);

    /// Writes the local dof indices lying on the given local facet.
    fn tabulate_facet_dofs(&self, dofs: &mut [usize], local_facet: usize);

    /// Writes the physical coordinates associated with the cell's local dofs.
    fn tabulate_dof_coordinates(&self, coordinates: &mut [OPoint<T, D>], mesh: &SimplexMesh<T, D>, cell: usize);

    /// The value component a local dof belongs to.
    fn dof_component(&self, index: usize) -> usize;

    /// Evaluates basis function `index` of `cell` at `x`, writing `value_dimension` components.
    fn evaluate_basis(&self, index: usize, values: &mut [T], x: &OPoint<T, D>, mesh: &SimplexMesh<T, D>, cell: usize);

    /// Applies the functional of local dof `index` to `f`.
    fn evaluate_dof(&self, index: usize, f: &dyn ValueFunction<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) -> T;
}

/// Scalar continuous Lagrange elements of degree 1 and 2, and the discontinuous constant
/// element of degree 0.
///
/// Local dofs are ordered vertices first, then edge midpoints in local edge order. The global
/// numbering follows the mesh: vertex dofs take the vertex index and edge dofs follow all vertex
/// dofs. The degree 0 dof of a cell takes the cell index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LagrangeElement {
    cell_type: CellType,
    degree: usize,
}

impl LagrangeElement {
    pub fn new(cell_type: CellType, degree: usize) -> Self {
        assert!(degree <= 2, "Lagrange elements are only available up to degree 2.");
        Self { cell_type, degree }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    fn num_vertex_dofs(&self) -> usize {
        match self.degree {
            0 => 0,
            _ => self.cell_type.num_vertices(),
        }
    }

    fn barycentric<T, D>(&self, x: &OPoint<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) -> Vec<T>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        barycentric_coordinates(&mesh.cell_points(cell), x)
            .unwrap_or_else(|| panic!("Cell {} is degenerate.", cell))
    }
}

impl<T, D> FiniteElement<T, D> for LagrangeElement
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn signature(&self) -> String {
        format!("Lagrange({:?}, {})", self.cell_type, self.degree)
    }

    fn cell_type(&self) -> CellType {
        self.cell_type
    }

    fn space_dimension(&self) -> usize {
        match self.degree {
            0 => 1,
            1 => self.cell_type.num_vertices(),
            _ => self.cell_type.num_vertices() + self.cell_type.num_edges(),
        }
    }

    fn value_dimension(&self) -> usize {
        1
    }

    fn num_facet_dofs(&self) -> usize {
        match self.degree {
            0 => 0,
            1 => self.cell_type.num_vertices() - 1,
            _ => match self.cell_type.facet_type() {
                Some(facet_type) => facet_type.num_vertices() + facet_type.num_edges(),
                None => 1,
            },
        }
    }

    fn global_dimension(&self, mesh: &SimplexMesh<T, D>) -> usize {
        match self.degree {
            0 => mesh.num_cells(),
            1 => mesh.num_vertices(),
            _ => mesh.num_vertices() + mesh.num_edges(),
        }
    }

    fn tabulate_dofs(&self, dofs: &mut [usize], mesh: &SimplexMesh<T, D>, cell: usize) {
        assert_eq!(dofs.len(), FiniteElement::<T, D>::space_dimension(self));
        if self.degree == 0 {
            dofs[0] = cell;
            return;
        }
        let nv = self.cell_type.num_vertices();
        dofs[..nv].copy_from_slice(mesh.cell_vertices(cell));
        if self.degree == 2 {
            let offset = mesh.num_vertices();
            for (dof, &edge) in dofs[nv..].iter_mut().zip(mesh.topology().cell_edges(cell)) {
                *dof = offset + edge;
            }
        }
    }

    fn tabulate_facet_dofs(&self, dofs: &mut [usize], local_facet: usize) {
        assert_eq!(dofs.len(), FiniteElement::<T, D>::num_facet_dofs(self));
        if self.degree == 0 {
            return;
        }
        let nv = self.cell_type.num_vertices();
        let vertices = self.cell_type.facet_vertices(local_facet);
        let edges = self
            .cell_type
            .facet_edges(local_facet)
            .map(|edge| nv + edge)
            .filter(|_| self.degree == 2);
        for (dof, local) in dofs.iter_mut().zip(vertices.chain(edges)) {
            *dof = local;
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn tabulate_dof_coordinates(&self, coordinates: &mut [OPoint<T, D>], mesh: &SimplexMesh<T, D>, cell: usize) {
        assert_eq!(coordinates.len(), FiniteElement::<T, D>::space_dimension(self));
        if self.degree == 0 {
            coordinates[0] = mesh.cell_midpoint(cell);
            return;
        }
        let points = mesh.cell_points(cell);
        let nv = self.num_vertex_dofs();
        coordinates[..nv].clone_from_slice(&points);
        if self.degree == 2 {
            for (coordinate, [a, b]) in coordinates[nv..].iter_mut().zip(self.cell_type.local_edges()) {
                *coordinate = points[*a].coords.lerp(&points[*b].coords, 0.5).into();
            }
        }
    }

    fn dof_component(&self, index: usize) -> usize {
        assert!(index < FiniteElement::<T, D>::space_dimension(self));
        0
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn evaluate_basis(&self, index: usize, values: &mut [T], x: &OPoint<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) {
        if self.degree == 0 {
            values[0] = 1.0;
            return;
        }
        let lambda = self.barycentric(x, mesh, cell);
        let nv = self.num_vertex_dofs();
        values[0] = match self.degree {
            1 => lambda[index],
            _ if index < nv => lambda[index] * (2.0 * lambda[index] - 1.0),
            _ => {
                let [a, b] = self.cell_type.local_edges()[index - nv];
                4.0 * lambda[a] * lambda[b]
            }
        };
    }

    fn evaluate_dof(&self, index: usize, f: &dyn ValueFunction<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) -> T {
        let mut coordinates = vec![OPoint::origin(); FiniteElement::<T, D>::space_dimension(self)];
        self.tabulate_dof_coordinates(&mut coordinates, mesh, cell);
        let mut values = vec![T::zero(); f.value_dimension()];
        f.eval(&mut values, &coordinates[index]);
        values[0]
    }
}

/// The component range `offset..offset + dim` of another value function.
struct ComponentView<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    function: &'a dyn ValueFunction<T, D>,
    offset: usize,
    dim: usize,
}

impl<'a, T, D> ValueFunction<T, D> for ComponentView<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn value_dimension(&self) -> usize {
        self.dim
    }

    fn eval(&self, values: &mut [T], x: &OPoint<T, D>) {
        let mut all = vec![T::zero(); self.function.value_dimension()];
        self.function.eval(&mut all, x);
        values.copy_from_slice(&all[self.offset..self.offset + self.dim]);
    }
}

/// A concatenation of sub-elements, for example the components of a vector field or the fields
/// of a mixed formulation.
///
/// Local dofs, facet dofs and value components of the sub-elements are stored one block after
/// another. Global dofs of sub-element `i` are shifted by the global dimensions of the
/// sub-elements before it.
#[derive(Debug, Clone)]
pub struct MixedElement<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    elements: Vec<Arc<dyn FiniteElement<T, D>>>,
}

impl<T, D> MixedElement<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(elements: Vec<Arc<dyn FiniteElement<T, D>>>) -> Self {
        assert!(!elements.is_empty(), "A mixed element needs at least one sub-element.");
        let cell_type = elements[0].cell_type();
        assert!(
            elements.iter().all(|element| element.cell_type() == cell_type),
            "Sub-elements of a mixed element must share the cell type."
        );
        Self { elements }
    }

    /// A vector-valued element with `n` copies of `element` as components.
    pub fn vector(element: Arc<dyn FiniteElement<T, D>>, n: usize) -> Self {
        Self::new(vec![element; n])
    }

    pub fn elements(&self) -> &[Arc<dyn FiniteElement<T, D>>] {
        &self.elements
    }

    /// Sub-element owning local dof `index`, and the index relative to that sub-element.
    fn locate(&self, mut index: usize) -> (usize, usize) {
        for (i, element) in self.elements.iter().enumerate() {
            if index < element.space_dimension() {
                return (i, index);
            }
            index -= element.space_dimension();
        }
        panic!("Local dof index out of bounds.")
    }

    fn component_offset(&self, sub_element: usize) -> usize {
        self.elements[..sub_element]
            .iter()
            .map(|element| element.value_dimension())
            .sum()
    }
}

impl<T, D> FiniteElement<T, D> for MixedElement<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn signature(&self) -> String {
        let signatures: Vec<_> = self.elements.iter().map(|element| element.signature()).collect();
        format!("Mixed({})", signatures.join(", "))
    }

    fn cell_type(&self) -> CellType {
        self.elements[0].cell_type()
    }

    fn space_dimension(&self) -> usize {
        self.elements.iter().map(|element| element.space_dimension()).sum()
    }

    fn value_dimension(&self) -> usize {
        self.elements.iter().map(|element| element.value_dimension()).sum()
    }

    fn num_facet_dofs(&self) -> usize {
        self.elements.iter().map(|element| element.num_facet_dofs()).sum()
    }

    fn num_sub_elements(&self) -> usize {
        self.elements.len()
    }

    fn sub_element(&self, index: usize) -> Option<Arc<dyn FiniteElement<T, D>>> {
        self.elements.get(index).cloned()
    }

    fn global_dimension(&self, mesh: &SimplexMesh<T, D>) -> usize {
        self.elements.iter().map(|element| element.global_dimension(mesh)).sum()
    }

    fn tabulate_dofs(&self, dofs: &mut [usize], mesh: &SimplexMesh<T, D>, cell: usize) {
        assert_eq!(dofs.len(), self.space_dimension());
        let mut local_offset = 0;
        let mut global_offset = 0;
        for element in &self.elements {
            let n = element.space_dimension();
            let block = &mut dofs[local_offset..local_offset + n];
            element.tabulate_dofs(block, mesh, cell);
            block.iter_mut().for_each(|dof| *dof += global_offset);
            local_offset += n;
            global_offset += element.global_dimension(mesh);
        }
    }

    fn tabulate_facet_dofs(&self, dofs: &mut [usize], local_facet: usize) {
        assert_eq!(dofs.len(), self.num_facet_dofs());
        let mut local_offset = 0;
        let mut facet_offset = 0;
        for element in &self.elements {
            let n = element.num_facet_dofs();
            let block = &mut dofs[facet_offset..facet_offset + n];
            element.tabulate_facet_dofs(block, local_facet);
            block.iter_mut().for_each(|dof| *dof += local_offset);
            facet_offset += n;
            local_offset += element.space_dimension();
        }
    }

    fn tabulate_dof_coordinates(&self, coordinates: &mut [OPoint<T, D>], mesh: &SimplexMesh<T, D>, cell: usize) {
        assert_eq!(coordinates.len(), self.space_dimension());
        let mut local_offset = 0;
        for element in &self.elements {
            let n = element.space_dimension();
            element.tabulate_dof_coordinates(&mut coordinates[local_offset..local_offset + n], mesh, cell);
            local_offset += n;
        }
    }

    fn dof_component(&self, index: usize) -> usize {
        let (sub_element, local) = self.locate(index);
        self.component_offset(sub_element) + self.elements[sub_element].dof_component(local)
    }

    fn evaluate_basis(&self, index: usize, values: &mut [T], x: &OPoint<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) {
        let (sub_element, local) = self.locate(index);
        let offset = self.component_offset(sub_element);
        let dim = self.elements[sub_element].value_dimension();
        values.iter_mut().for_each(|v| *v = T::zero());
        self.elements[sub_element].evaluate_basis(local, &mut values[offset..offset + dim], x, mesh, cell);
    }

    fn evaluate_dof(&self, index: usize, f: &dyn ValueFunction<T, D>, mesh: &SimplexMesh<T, D>, cell: usize) -> T {
        let (sub_element, local) = self.locate(index);
        let view = ComponentView {
            function: f,
            offset: self.component_offset(sub_element),
            dim: self.elements[sub_element].value_dimension(),
        };
        self.elements[sub_element].evaluate_dof(local, &view, mesh, cell)
    }
}
