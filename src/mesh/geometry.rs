//! Geometric quantities of simplices embedded in a space of equal or higher dimension.
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DMatrix, DVector, DefaultAllocator, DimName, OPoint, OVector};

/// Jacobian of the affine map from the reference simplex, as a `D x k` matrix.
fn jacobian<T, D>(points: &[OPoint<T, D>]) -> DMatrix<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let k = points.len() - 1;
    DMatrix::from_fn(D::dim(), k, |r, c| points[c + 1][r] - points[0][r])
}

/// Measure of the simplex spanned by the given points.
///
/// The simplex may have lower dimension than the ambient space, in which case the measure is
/// computed from the Gram determinant. A single point has unit (counting) measure.
pub fn simplex_volume<T, D>(points: &[OPoint<T, D>]) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    assert!(!points.is_empty(), "A simplex needs at least one vertex.");
    let k = points.len() - 1;
    if k == 0 {
        return T::one();
    }
    let j = jacobian(points);
    let gram = j.transpose() * &j;
    let factorial = (1..=k).fold(T::one(), |acc, i| acc * convert::<f64, T>(i as f64));
    gram.determinant().max(T::zero()).sqrt() / factorial
}

pub fn simplex_midpoint<T, D>(points: &[OPoint<T, D>]) -> OPoint<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    assert!(!points.is_empty(), "A simplex needs at least one vertex.");
    let sum = points
        .iter()
        .fold(OVector::<T, D>::zeros(), |acc, p| acc + &p.coords);
    let n = convert::<f64, T>(points.len() as f64);
    OPoint::from(sum / n)
}

/// Gradients of the barycentric coordinate functions of a simplex.
///
/// Returns `None` if the simplex is degenerate.
pub fn barycentric_gradients<T, D>(points: &[OPoint<T, D>]) -> Option<Vec<OVector<T, D>>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let k = points.len() - 1;
    let j = jacobian(points);
    let gram_inv = (j.transpose() * &j).try_inverse()?;
    // Columns of the pseudo-inverse transpose are the gradients of λ_1, ..., λ_k
    let g = &j * gram_inv;

    let mut gradients = Vec::with_capacity(k + 1);
    let mut grad_0 = OVector::<T, D>::zeros();
    for i in 0..k {
        let grad = OVector::<T, D>::from_iterator(g.column(i).iter().copied());
        grad_0 -= &grad;
        gradients.push(grad);
    }
    gradients.insert(0, grad_0);
    Some(gradients)
}

/// Barycentric coordinates of `x` with respect to a simplex.
///
/// If `x` does not lie in the affine hull of the simplex, the coordinates of its orthogonal
/// projection are returned. Returns `None` if the simplex is degenerate.
pub fn barycentric_coordinates<T, D>(points: &[OPoint<T, D>], x: &OPoint<T, D>) -> Option<Vec<T>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let j = jacobian(points);
    let rhs = DVector::from_iterator(D::dim(), (x - &points[0]).iter().copied());
    let gram_inv = (j.transpose() * &j).try_inverse()?;
    let lambda = gram_inv * (j.transpose() * rhs);

    let mut coords = Vec::with_capacity(points.len());
    coords.push(T::one() - lambda.sum());
    coords.extend(lambda.iter().copied());
    Some(coords)
}
