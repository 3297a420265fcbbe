//! Finite element assembly on simplicial meshes with adaptive refinement.
//!
//! The crate is organized bottom-up:
//!
//! - [`mesh`] holds simplicial meshes, their derived topology, mesh functions and the refinement
//!   engines: uniform refinement, Rivara bisection and red/green closure on a mesh hierarchy.
//! - [`element`] and [`dofmap`] describe finite elements and their global dof numbering.
//! - [`function`] provides function spaces, value functions and discrete functions.
//! - [`la`] is the seam to the linear algebra backend.
//! - [`assembly`] assembles variational forms, and [`bc`] applies Dirichlet conditions.
//!
//! Long-running operations take a [`Timings`](timing::Timings) context that collects the
//! duration of each phase.
pub use adafem_traits::Real;

pub mod assembly;
pub mod bc;
pub mod dofmap;
pub mod element;
pub mod function;
pub mod la;
pub mod mesh;
pub mod timing;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
