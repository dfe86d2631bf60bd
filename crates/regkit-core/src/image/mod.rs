//! Image types.
//!
//! [`Image`] keeps voxel data in a burn tensor together with its physical
//! geometry. [`ImageBuffer`] is the host-side `f64` copy that per-sample
//! kernels (interpolation, metrics, moments) read from.

pub mod buffer;
pub mod image;

pub use buffer::ImageBuffer;
pub use image::Image;
