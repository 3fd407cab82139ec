//! # Pop3D Core
//!
//! Common types for the multi-camera reconstruction crates: rotation parameterizations and their
//! conversions, typed rigid poses, named per-frame feature maps, and the shared error type.
//!
//! Rotations arrive in three forms. The motion capture system reports Euler angles or
//! quaternions with the scalar last, while separately calibrated cameras store quaternions with
//! the scalar first. [`RotationRepresentation`] carries the form with the value, so nothing is
//! inferred from the length of a parameter list after it has been read once.
//!
//! All poses apply `R·p + t` forwards and `Rᵗ·(p - t)` backwards.

mod error;
mod feature;
mod pose;
mod rotation;

pub use error::*;
pub use feature::*;
pub use nalgebra;
pub use pose::*;
pub use rotation::*;
