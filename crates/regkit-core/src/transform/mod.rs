//! Spatial transforms.

pub mod affine;
pub mod chained;
pub mod trait_;
pub mod translation;

pub use affine::AffineTransform;
pub use chained::ChainedTransform;
pub use trait_::Transform;
pub use translation::TranslationTransform;
