use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used throughout `adafem`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
