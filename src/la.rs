//! The linear-algebra backend seam: global tensors the assembler and boundary conditions write to.
//!
//! Implementations are provided for [`CsrMatrix`] (the primary sparse backend), [`CooMatrix`]
//! (a buffered backend), dense [`DMatrix`] and [`DVector`], and [`ScalarTensor`] for functionals.
use crate::Real;
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rustc_hash::FxHashSet;

/// A global tensor of rank 0, 1 or 2.
pub trait GenericTensor<T: Real> {
    fn rank(&self) -> usize;

    fn shape(&self) -> Vec<usize>;

    /// Allocates zeroed storage for the given shape.
    ///
    /// Rank-2 tensors receive the nonzero structure in `pattern`. Backends without a fixed
    /// structure may ignore it.
    fn init(&mut self, shape: &[usize], pattern: Option<&SparsityPattern>);

    /// Sets all stored entries to zero, keeping the structure.
    fn zero(&mut self);

    /// Adds a dense row-major block at the given global indices, one index list per rank.
    ///
    /// # Panics
    ///
    /// Sparse backends panic if an entry is not part of their structure.
    fn add_local(&mut self, block: &[T], indices: &[&[usize]]);

    /// Flushes buffered contributions into the backend's canonical storage.
    fn apply(&mut self) {}
}

pub trait GenericMatrix<T: Real>: GenericTensor<T> {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    fn get(&self, i: usize, j: usize) -> T;

    /// Sets all entries of the given rows to zero.
    fn zero_rows(&mut self, rows: &[usize]);

    /// Replaces the given rows by rows of the identity matrix.
    fn ident(&mut self, rows: &[usize]);
}

pub trait GenericVector<T: Real>: GenericTensor<T> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_local(&self, values: &mut [T], indices: &[usize]);

    fn set_local(&mut self, values: &[T], indices: &[usize]);
}

/// The value of an assembled functional.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ScalarTensor<T> {
    pub value: T,
}

impl<T: Real> ScalarTensor<T> {
    pub fn new() -> Self {
        Self { value: T::zero() }
    }
}

impl<T: Real> GenericTensor<T> for ScalarTensor<T> {
    fn rank(&self) -> usize {
        0
    }

    fn shape(&self) -> Vec<usize> {
        Vec::new()
    }

    fn init(&mut self, shape: &[usize], _pattern: Option<&SparsityPattern>) {
        assert!(shape.is_empty(), "A scalar has no dimensions.");
        self.value = T::zero();
    }

    fn zero(&mut self) {
        self.value = T::zero();
    }

    fn add_local(&mut self, block: &[T], indices: &[&[usize]]) {
        assert!(indices.is_empty());
        self.value += block[0];
    }
}

impl<T: Real> GenericTensor<T> for DVector<T> {
    fn rank(&self) -> usize {
        1
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.len()]
    }

    fn init(&mut self, shape: &[usize], _pattern: Option<&SparsityPattern>) {
        *self = DVector::zeros(shape[0]);
    }

    fn zero(&mut self) {
        self.fill(T::zero());
    }

    fn add_local(&mut self, block: &[T], indices: &[&[usize]]) {
        for (&i, &value) in indices[0].iter().zip(block) {
            self[i] += value;
        }
    }
}

impl<T: Real> GenericVector<T> for DVector<T> {
    fn len(&self) -> usize {
        self.nrows()
    }

    fn get_local(&self, values: &mut [T], indices: &[usize]) {
        for (value, &i) in values.iter_mut().zip(indices) {
            *value = self[i];
        }
    }

    fn set_local(&mut self, values: &[T], indices: &[usize]) {
        for (&value, &i) in values.iter().zip(indices) {
            self[i] = value;
        }
    }
}

impl<T: Real> GenericTensor<T> for DMatrix<T> {
    fn rank(&self) -> usize {
        2
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.nrows(), self.ncols()]
    }

    fn init(&mut self, shape: &[usize], _pattern: Option<&SparsityPattern>) {
        *self = DMatrix::zeros(shape[0], shape[1]);
    }

    fn zero(&mut self) {
        self.fill(T::zero());
    }

    fn add_local(&mut self, block: &[T], indices: &[&[usize]]) {
        let (rows, cols) = (indices[0], indices[1]);
        for (r, &i) in rows.iter().enumerate() {
            for (c, &j) in cols.iter().enumerate() {
                self[(i, j)] += block[r * cols.len() + c];
            }
        }
    }
}

impl<T: Real> GenericMatrix<T> for DMatrix<T> {
    fn nrows(&self) -> usize {
        self.shape().0
    }

    fn ncols(&self) -> usize {
        self.shape().1
    }

    fn get(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }

    fn zero_rows(&mut self, rows: &[usize]) {
        for &i in rows {
            self.row_mut(i).fill(T::zero());
        }
    }

    fn ident(&mut self, rows: &[usize]) {
        for &i in rows {
            self.row_mut(i).fill(T::zero());
            self[(i, i)] = T::one();
        }
    }
}

/// Position of entry `(i, j)` in the values of a CSR matrix.
fn csr_entry_index(offsets: &[usize], col_indices: &[usize], i: usize, j: usize) -> Option<usize> {
    let (begin, end) = (offsets[i], offsets[i + 1]);
    col_indices[begin..end]
        .binary_search(&j)
        .ok()
        .map(|k| begin + k)
}

impl<T: Real> GenericTensor<T> for CsrMatrix<T> {
    fn rank(&self) -> usize {
        2
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.nrows(), self.ncols()]
    }

    fn init(&mut self, shape: &[usize], pattern: Option<&SparsityPattern>) {
        let pattern = pattern.expect("CSR matrices need a sparsity pattern.");
        assert_eq!(shape, &[pattern.major_dim(), pattern.minor_dim()][..]);
        let values = vec![T::zero(); pattern.nnz()];
        *self = CsrMatrix::try_from_pattern_and_values(pattern.clone(), values)
            .expect("Values match the pattern's number of entries.");
    }

    fn zero(&mut self) {
        self.values_mut().iter_mut().for_each(|v| *v = T::zero());
    }

    fn add_local(&mut self, block: &[T], indices: &[&[usize]]) {
        let (rows, cols) = (indices[0], indices[1]);
        let (offsets, col_indices, values) = self.csr_data_mut();
        for (r, &i) in rows.iter().enumerate() {
            for (c, &j) in cols.iter().enumerate() {
                let k = csr_entry_index(offsets, col_indices, i, j)
                    .unwrap_or_else(|| panic!("Entry ({}, {}) is not part of the sparsity pattern.", i, j));
                values[k] += block[r * cols.len() + c];
            }
        }
    }
}

impl<T: Real> GenericMatrix<T> for CsrMatrix<T> {
    fn nrows(&self) -> usize {
        CsrMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        CsrMatrix::ncols(self)
    }

    fn get(&self, i: usize, j: usize) -> T {
        csr_entry_index(self.row_offsets(), self.col_indices(), i, j)
            .map(|k| self.values()[k])
            .unwrap_or_else(T::zero)
    }

    fn zero_rows(&mut self, rows: &[usize]) {
        let (offsets, _, values) = self.csr_data_mut();
        for &i in rows {
            values[offsets[i]..offsets[i + 1]]
                .iter_mut()
                .for_each(|v| *v = T::zero());
        }
    }

    /// # Panics
    ///
    /// Panics if a diagonal entry is not part of the sparsity pattern.
    fn ident(&mut self, rows: &[usize]) {
        self.zero_rows(rows);
        let (offsets, col_indices, values) = self.csr_data_mut();
        for &i in rows {
            let k = csr_entry_index(offsets, col_indices, i, i)
                .unwrap_or_else(|| panic!("Diagonal entry of row {} is not part of the sparsity pattern.", i));
            values[k] = T::one();
        }
    }
}

impl<T: Real> GenericTensor<T> for CooMatrix<T> {
    fn rank(&self) -> usize {
        2
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.nrows(), self.ncols()]
    }

    fn init(&mut self, shape: &[usize], _pattern: Option<&SparsityPattern>) {
        *self = CooMatrix::new(shape[0], shape[1]);
    }

    fn zero(&mut self) {
        *self = CooMatrix::new(self.nrows(), self.ncols());
    }

    fn add_local(&mut self, block: &[T], indices: &[&[usize]]) {
        let (rows, cols) = (indices[0], indices[1]);
        for (r, &i) in rows.iter().enumerate() {
            for (c, &j) in cols.iter().enumerate() {
                self.push(i, j, block[r * cols.len() + c]);
            }
        }
    }
}

impl<T: Real> GenericMatrix<T> for CooMatrix<T> {
    fn nrows(&self) -> usize {
        CooMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        CooMatrix::ncols(self)
    }

    /// Sums the buffered triplets at `(i, j)`.
    fn get(&self, i: usize, j: usize) -> T {
        izip!(self.row_indices(), self.col_indices(), self.values())
            .filter(|(r, c, _)| **r == i && **c == j)
            .fold(T::zero(), |sum, (_, _, &v)| sum + v)
    }

    fn zero_rows(&mut self, rows: &[usize]) {
        let rows: FxHashSet<_> = rows.iter().copied().collect();
        let mut rebuilt = CooMatrix::new(self.nrows(), self.ncols());
        for (i, j, &v) in self.triplet_iter() {
            if !rows.contains(&i) {
                rebuilt.push(i, j, v);
            }
        }
        *self = rebuilt;
    }

    fn ident(&mut self, rows: &[usize]) {
        self.zero_rows(rows);
        let rows: FxHashSet<_> = rows.iter().copied().collect();
        for i in rows {
            self.push(i, i, T::one());
        }
    }
}
