//! Utility types and functions.
//!
//! - [`Error`] / [`Result`] / [`FailureKind`] - Error handling and classification
//! - [`ContentHash`] - MD5 content digests
//! - [`Transform3`] - Accumulating 3×3 transforms, plus glam re-exports

mod error;
mod hash;
mod math;

pub use error::*;
pub use hash::*;
pub use math::*;
