//! Image loading and writing contracts.
//!
//! Registration code only sees [`ImageLoader`] and [`ImageWriter`]; file
//! formats live in separate crates. Images cross this boundary in a
//! dimension-erased form ([`RawImage`]) because the dimension is discovered
//! from the header before any typed pipeline exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::image::ImageBuffer;
use crate::signature::PixelType;
use crate::spatial::{Geometry, Matrix, Vector};

/// Metadata of an image file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    pub dimension: usize,
    pub size: Vec<usize>,
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    /// Row-major `dimension x dimension` direction cosines.
    pub direction: Vec<f64>,
    pub pixel_type: PixelType,
}

impl ImageHeader {
    /// Unit spacing, zero origin and identity direction.
    pub fn with_size(size: Vec<usize>, pixel_type: PixelType) -> Self {
        let dimension = size.len();
        let mut direction = vec![0.0; dimension * dimension];
        for axis in 0..dimension {
            direction[axis * dimension + axis] = 1.0;
        }
        Self {
            dimension,
            spacing: vec![1.0; dimension],
            origin: vec![0.0; dimension],
            direction,
            size,
            pixel_type,
        }
    }

    pub fn number_of_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Typed geometry; fails when `D` differs from the header dimension.
    pub fn geometry<const D: usize>(&self) -> Result<Geometry<D>> {
        if self.dimension != D
            || self.size.len() != D
            || self.spacing.len() != D
            || self.origin.len() != D
            || self.direction.len() != D * D
        {
            return Err(CoreError::DimensionMismatch {
                expected: D,
                actual: self.dimension,
            });
        }
        let mut size = [0usize; D];
        size.copy_from_slice(&self.size);
        Geometry::new(
            size,
            Vector::from_column_slice(&self.origin),
            Vector::from_column_slice(&self.spacing),
            Matrix::from_row_slice(&self.direction),
        )
    }

    pub fn from_geometry<const D: usize>(geometry: &Geometry<D>, pixel_type: PixelType) -> Self {
        let direction = geometry.direction();
        let mut rows = Vec::with_capacity(D * D);
        for row in 0..D {
            for col in 0..D {
                rows.push(direction[(row, col)]);
            }
        }
        Self {
            dimension: D,
            size: geometry.size().to_vec(),
            spacing: geometry.spacing().iter().copied().collect(),
            origin: geometry.origin().iter().copied().collect(),
            direction: rows,
            pixel_type,
        }
    }
}

/// Header plus voxel values, first axis varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub header: ImageHeader,
    pub voxels: Vec<f64>,
}

impl RawImage {
    pub fn new(header: ImageHeader, voxels: Vec<f64>) -> Result<Self> {
        if voxels.len() != header.number_of_voxels() {
            return Err(CoreError::VoxelCount {
                expected: header.number_of_voxels(),
                actual: voxels.len(),
            });
        }
        Ok(Self { header, voxels })
    }

    pub fn into_buffer<const D: usize>(self) -> Result<ImageBuffer<D>> {
        let geometry = self.header.geometry::<D>()?;
        ImageBuffer::new(geometry, self.voxels)
    }

    pub fn from_buffer<const D: usize>(buffer: &ImageBuffer<D>, pixel_type: PixelType) -> Self {
        Self {
            header: ImageHeader::from_geometry(buffer.geometry(), pixel_type),
            voxels: buffer.values().to_vec(),
        }
    }
}

/// Reads image headers and voxel data.
pub trait ImageLoader: Send + Sync {
    fn read_header(&self, path: &Path) -> Result<ImageHeader>;

    fn load(&self, path: &Path) -> Result<RawImage>;
}

/// Writes images.
pub trait ImageWriter: Send + Sync {
    fn write(&self, path: &Path, image: &RawImage) -> Result<()>;
}

/// Image store keyed by path, for tests and programmatic callers.
#[derive(Debug, Default)]
pub struct InMemoryImageStore {
    images: RwLock<HashMap<PathBuf, RawImage>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, image: RawImage) {
        if let Ok(mut images) = self.images.write() {
            images.insert(path.into(), image);
        }
    }

    pub fn get(&self, path: &Path) -> Option<RawImage> {
        self.images.read().ok()?.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.images.read().map(|i| i.contains_key(path)).unwrap_or(false)
    }
}

impl ImageLoader for InMemoryImageStore {
    fn read_header(&self, path: &Path) -> Result<ImageHeader> {
        self.load(path).map(|image| image.header)
    }

    fn load(&self, path: &Path) -> Result<RawImage> {
        self.get(path)
            .ok_or_else(|| CoreError::image_io(path, "no such image in store"))
    }
}

impl ImageWriter for InMemoryImageStore {
    fn write(&self, path: &Path, image: &RawImage) -> Result<()> {
        let mut images = self
            .images
            .write()
            .map_err(|_| CoreError::image_io(path, "image store lock poisoned"))?;
        images.insert(path.to_path_buf(), image.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_geometry_dimension_checked() {
        let header = ImageHeader::with_size(vec![4, 5, 6], PixelType::Float);
        assert!(header.geometry::<3>().is_ok());
        assert_eq!(
            header.geometry::<2>().unwrap_err(),
            CoreError::DimensionMismatch { expected: 2, actual: 3 }
        );
    }

    #[test]
    fn test_store_round_trip() {
        let store = InMemoryImageStore::new();
        let mut header = ImageHeader::with_size(vec![2, 2], PixelType::Short);
        header.origin = vec![3.0, -1.0];
        let image = RawImage::new(header, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        store.write(Path::new("a.nii"), &image).unwrap();

        assert_eq!(store.read_header(Path::new("a.nii")).unwrap().pixel_type, PixelType::Short);
        let buffer = store.load(Path::new("a.nii")).unwrap().into_buffer::<2>().unwrap();
        assert_eq!(buffer.geometry().origin(), &Vector::<2>::new(3.0, -1.0));
        assert!(store.load(Path::new("missing.nii")).is_err());
    }

    #[test]
    fn test_raw_image_checks_voxel_count() {
        let header = ImageHeader::with_size(vec![3, 3], PixelType::Float);
        assert!(RawImage::new(header, vec![0.0; 8]).is_err());
    }
}
