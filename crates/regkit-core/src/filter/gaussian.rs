use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor};

use crate::image::Image;

/// Gaussian smoothing filter.
///
/// Separable 1-D convolutions along each image axis. Sigmas are given in
/// physical units and converted to voxels with the image spacing. Each pass
/// is normalised by the convolved support so borders keep their intensity.
pub struct GaussianFilter<B: Backend> {
    sigmas: Vec<f64>,
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Standard deviation per axis in physical units; a single value applies
    /// to every axis.
    pub fn new(sigmas: Vec<f64>) -> Self {
        Self {
            sigmas,
            max_kernel_width: 65,
            _b: std::marker::PhantomData,
        }
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        let spacing = image.spacing();
        let mut data = image.data().clone();
        let mut support = Tensor::<B, D>::ones(data.shape(), &data.device());

        for axis in 0..D {
            let sigma = self.sigmas.get(axis).or(self.sigmas.first()).copied().unwrap_or(0.0);
            if sigma <= 1e-6 {
                continue;
            }
            let pixel_sigma = sigma / spacing[axis];
            let radius = (3.0 * pixel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width);
            let kernel = generate_kernel(pixel_sigma, (width - 1) / 2);
            let kernel = Tensor::<B, 1>::from_floats(kernel.as_slice(), &data.device());

            // tensor dims run slowest-first, geometry axes fastest-first
            let dim = D - 1 - axis;
            data = convolve_1d(data, kernel.clone(), dim);
            support = convolve_1d(support, kernel, dim);
        }

        let smoothed = data / support;
        Image::from_parts(smoothed, image.geometry().clone())
    }
}

fn generate_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let raw: Vec<f64> = (0..=(2 * radius))
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

fn convolve_1d<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    kernel: Tensor<B, 1>,
    dim: usize,
) -> Tensor<B, D> {
    let dims: [usize; D] = input.shape().dims();

    // move the target dimension last
    let mut permutation = [0isize; D];
    let mut next = 0;
    for i in (0..D).filter(|&i| i != dim) {
        permutation[next] = i as isize;
        next += 1;
    }
    permutation[D - 1] = dim as isize;

    let length = dims[dim];
    let batch: usize = (0..D).filter(|&i| i != dim).map(|i| dims[i]).product();
    let kernel_size = kernel.dims()[0];

    let output = burn::tensor::module::conv1d(
        input.permute(permutation).reshape([batch, 1, length]),
        kernel.reshape([1, 1, kernel_size]),
        None,
        ConvOptions::new([1], [kernel_size / 2], [1], 1),
    );

    let mut permuted_shape = [0usize; D];
    for (position, &source) in permutation.iter().enumerate() {
        permuted_shape[position] = dims[source as usize];
    }
    let mut inverse = [0isize; D];
    for (position, &source) in permutation.iter().enumerate() {
        inverse[source as usize] = position as isize;
    }
    output.reshape(Shape::new(permuted_shape)).permute(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageBuffer;
    use crate::spatial::Geometry;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = generate_kernel(1.5, 5);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel.len(), 11);
        assert!((kernel[0] - kernel[10]).abs() < 1e-7);
    }

    #[test]
    fn test_constant_image_is_unchanged() {
        let device = Default::default();
        let buffer = ImageBuffer::filled(Geometry::<2>::with_size([9, 7]), 4.0);
        let image = Image::<B, 2>::from_buffer(&buffer, &device);

        let smoothed = GaussianFilter::new(vec![2.0]).apply(&image).to_buffer().unwrap();
        for v in smoothed.values() {
            assert!((v - 4.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_smoothing_spreads_impulse_along_each_axis() {
        let device = Default::default();
        let geometry = Geometry::<2>::with_size([11, 11]);
        let mut buffer = ImageBuffer::filled(geometry, 0.0);
        let centre = buffer.geometry().linear_index(&[5, 5]);
        buffer.values_mut()[centre] = 1.0;
        let image = Image::<B, 2>::from_buffer(&buffer, &device);

        let smoothed = GaussianFilter::new(vec![1.0, 0.0]).apply(&image).to_buffer().unwrap();
        assert!(smoothed.get(&[4, 5]) > 0.0);
        assert_eq!(smoothed.get(&[5, 4]), 0.0);
        assert!(smoothed.get(&[5, 5]) < 1.0);
    }
}
