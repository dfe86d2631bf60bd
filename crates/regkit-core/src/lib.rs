//! Core data structures for regkit: images, geometry, transforms,
//! interpolators, parameter maps and image I/O contracts.

pub mod error;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod io;
pub mod parameters;
pub mod signature;
pub mod spatial;
pub mod statistics;
pub mod transform;

pub use error::{CoreError, Result};
pub use image::{Image, ImageBuffer};
pub use parameters::ParameterMap;
pub use signature::{PixelType, TypeSignature};
pub use spatial::{Geometry, Matrix, Vector};
