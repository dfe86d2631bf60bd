use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::image::Image;

/// Shrink filter.
///
/// Keeps every n-th voxel along each axis and scales the spacing by n. The
/// first voxel is kept, so the origin is unchanged.
pub struct ShrinkFilter<B: Backend> {
    factors: Vec<usize>,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> ShrinkFilter<B> {
    /// Factor per axis; a single value applies to every axis.
    pub fn new(factors: Vec<usize>) -> Self {
        Self {
            factors,
            _b: std::marker::PhantomData,
        }
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        let mut data = image.data().clone();
        let device = data.device();
        let mut size = image.size();
        let mut spacing = *image.spacing();

        for axis in 0..D {
            let factor = self.factors.get(axis).or(self.factors.first()).copied().unwrap_or(1);
            if factor <= 1 {
                continue;
            }
            let kept: Vec<i32> = (0..size[axis]).step_by(factor).map(|i| i as i32).collect();
            size[axis] = kept.len();
            spacing[axis] *= factor as f64;

            let indices = Tensor::<B, 1, Int>::from_ints(kept.as_slice(), &device);
            data = data.select(D - 1 - axis, indices);
        }

        Image::from_parts(data, image.geometry().resampled(size, spacing))
    }
}
