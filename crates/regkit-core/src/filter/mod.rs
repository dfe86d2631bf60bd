//! Image filters used by the resolution pyramids.

pub mod gaussian;
pub mod schedule;
pub mod shrink;

pub use gaussian::GaussianFilter;
pub use schedule::PyramidSchedule;
pub use shrink::ShrinkFilter;
