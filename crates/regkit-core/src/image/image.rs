//! Image type with physical metadata.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::buffer::ImageBuffer;
use crate::error::{CoreError, Result};
use crate::spatial::{Geometry, Vector};

/// Image with tensor data and physical geometry.
///
/// The tensor shape is the geometry size reversed (`[Z, Y, X]` in 3-D), so a
/// row-major flattening of the tensor lists voxels with x varying fastest.
///
/// # Type Parameters
/// * `B` - The backend holding the voxel data
/// * `D` - The dimensionality of the image (2 or 3)
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    geometry: Geometry<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create an image; the tensor shape must equal `geometry.tensor_shape()`.
    pub fn new(data: Tensor<B, D>, geometry: Geometry<D>) -> Result<Self> {
        let dims: [usize; D] = data.shape().dims();
        if dims != geometry.tensor_shape() {
            return Err(CoreError::VoxelCount {
                expected: geometry.number_of_voxels(),
                actual: dims.iter().product(),
            });
        }
        Ok(Self { data, geometry })
    }

    /// Shape-preserving filters rebuild images without re-checking.
    pub(crate) fn from_parts(data: Tensor<B, D>, geometry: Geometry<D>) -> Self {
        Self { data, geometry }
    }

    /// Upload a host buffer to the backend.
    pub fn from_buffer(buffer: &ImageBuffer<D>, device: &B::Device) -> Self {
        let geometry = buffer.geometry().clone();
        let data = TensorData::new(buffer.values().to_vec(), Shape::new(geometry.tensor_shape()))
            .convert::<B::FloatElem>();
        Self {
            data: Tensor::from_data(data, device),
            geometry,
        }
    }

    /// Download the voxel values to the host.
    pub fn to_buffer(&self) -> Result<ImageBuffer<D>> {
        let values = self
            .data
            .clone()
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .map_err(|e| CoreError::invalid_value("ImageData", 0, format!("{e:?}"), "tensor readback failed"))?;
        ImageBuffer::new(self.geometry.clone(), values)
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    pub fn geometry(&self) -> &Geometry<D> {
        &self.geometry
    }

    pub fn size(&self) -> [usize; D] {
        self.geometry.size()
    }

    pub fn origin(&self) -> &Vector<D> {
        self.geometry.origin()
    }

    pub fn spacing(&self) -> &Vector<D> {
        self.geometry.spacing()
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_buffer_round_trip_preserves_order() {
        let device = Default::default();
        let geometry = Geometry::<2>::with_size([3, 2]);
        let buffer = ImageBuffer::new(geometry, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let image = Image::<B, 2>::from_buffer(&buffer, &device);
        assert_eq!(image.data().dims(), [2, 3]);

        let back = image.to_buffer().unwrap();
        assert_eq!(back.values(), buffer.values());
    }

    #[test]
    fn test_new_rejects_mismatched_shape() {
        let device = Default::default();
        let data = Tensor::<B, 2>::zeros([3, 2], &device);
        let result = Image::new(data, Geometry::<2>::with_size([3, 2]));
        assert!(result.is_err());
    }
}
