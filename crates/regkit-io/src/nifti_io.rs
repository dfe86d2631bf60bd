use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};
use regkit_core::io::{ImageHeader, ImageLoader, ImageWriter, RawImage};
use regkit_core::{CoreError, PixelType};

/// Header of a NIfTI file without reading the voxel data.
pub fn read_nifti_header<P: AsRef<Path>>(path: P) -> Result<ImageHeader> {
    let path = path.as_ref();
    let header = NiftiHeader::from_file(path).context("Failed to read NIfTI header")?;
    convert_header(&header)
}

/// Read a 2-D or 3-D NIfTI image. Voxels are returned x-fastest.
pub fn read_nifti<P: AsRef<Path>>(path: P) -> Result<RawImage> {
    let path = path.as_ref();
    let obj = ReaderOptions::new().read_file(path).context("Failed to read NIfTI file")?;
    let header = convert_header(obj.header())?;

    let volume = obj
        .into_volume()
        .into_ndarray::<f64>()
        .context("Failed to convert volume to ndarray")?;
    if volume.ndim() < header.dimension {
        bail!(
            "NIfTI volume has {} axes but the header declares {}",
            volume.ndim(),
            header.dimension
        );
    }
    // the array is indexed [x, y, z]; its transpose iterates with x fastest
    let voxels: Vec<f64> = volume.t().iter().copied().collect();
    tracing::debug!(path = %path.display(), size = ?header.size, "read NIfTI image");
    RawImage::new(header, voxels).map_err(anyhow::Error::from)
}

/// Write an image as NIfTI (`.nii` or `.nii.gz`) with `f64` voxels.
pub fn write_nifti<P: AsRef<Path>>(path: P, image: &RawImage) -> Result<()> {
    let path = path.as_ref();
    let header = &image.header;
    let n = header.dimension;
    if n == 0 || n > 3 {
        bail!("Cannot write a {n}-dimensional image as NIfTI");
    }

    let array = ArrayD::from_shape_vec(IxDyn(&header.size).f(), image.voxels.clone())
        .context("Voxel count does not match image size")?;

    let mut srow = [[0.0f32; 4]; 3];
    for row in 0..3 {
        for col in 0..3 {
            srow[row][col] = if row < n && col < n {
                (header.direction[row * n + col] * header.spacing[col]) as f32
            } else if row == col {
                1.0
            } else {
                0.0
            };
        }
        srow[row][3] = if row < n { header.origin[row] as f32 } else { 0.0 };
    }
    let mut pixdim = [1.0f32; 8];
    for axis in 0..n {
        pixdim[axis + 1] = header.spacing[axis] as f32;
    }
    let reference = NiftiHeader {
        sform_code: 2,
        qform_code: 0,
        srow_x: srow[0],
        srow_y: srow[1],
        srow_z: srow[2],
        pixdim,
        ..NiftiHeader::default()
    };

    WriterOptions::new(path)
        .reference_header(&reference)
        .write_nifti(&array)
        .context("Failed to write NIfTI file")?;
    Ok(())
}

fn convert_header(header: &NiftiHeader) -> Result<ImageHeader> {
    let n = header.dim[0] as usize;
    if n == 0 || n > 3 {
        bail!("Only 2-D and 3-D NIfTI images are supported, found {n} dimensions");
    }
    let size: Vec<usize> = (1..=n).map(|axis| header.dim[axis] as usize).collect();
    let affine = spatial_affine(header);

    let mut spacing = Vec::with_capacity(n);
    let mut direction = vec![0.0; n * n];
    for col in 0..n {
        let column: Vec<f64> = (0..n).map(|row| affine[row][col] as f64).collect();
        let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 1e-9 {
            for row in 0..n {
                direction[row * n + col] = column[row] / norm;
            }
            spacing.push(norm);
        } else {
            direction[col * n + col] = 1.0;
            spacing.push(1.0);
        }
    }
    let origin = (0..n).map(|row| affine[row][3] as f64).collect();

    Ok(ImageHeader {
        dimension: n,
        size,
        spacing,
        origin,
        direction,
        pixel_type: pixel_type(header)?,
    })
}

/// Voxel-to-world matrix rows from sform, qform, or pixdim, in that order.
fn spatial_affine(header: &NiftiHeader) -> [[f32; 4]; 3] {
    if header.sform_code > 0 {
        return [header.srow_x, header.srow_y, header.srow_z];
    }
    let (dx, dy) = (header.pixdim[1], header.pixdim[2]);
    if header.qform_code > 0 {
        let (b, c, d) = (header.quatern_b, header.quatern_c, header.quatern_d);
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };
        let dz = header.pixdim[3] * qfac;
        return [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z,
            ],
        ];
    }
    let positive = |v: f32| if v > 0.0 { v } else { 1.0 };
    [
        [positive(dx), 0.0, 0.0, 0.0],
        [0.0, positive(dy), 0.0, 0.0],
        [0.0, 0.0, positive(header.pixdim[3]), 0.0],
    ]
}

fn pixel_type(header: &NiftiHeader) -> Result<PixelType> {
    let data_type = header.data_type().context("Unknown NIfTI data type")?;
    Ok(match data_type {
        NiftiType::Int8 => PixelType::Char,
        NiftiType::Uint8 => PixelType::UnsignedChar,
        NiftiType::Int16 => PixelType::Short,
        NiftiType::Uint16 => PixelType::UnsignedShort,
        NiftiType::Int32 => PixelType::Int,
        NiftiType::Uint32 => PixelType::UnsignedInt,
        NiftiType::Float32 => PixelType::Float,
        NiftiType::Float64 => PixelType::Double,
        other => bail!("Unsupported NIfTI data type {other:?}"),
    })
}

/// [`ImageLoader`] and [`ImageWriter`] backed by NIfTI files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiImageIo;

fn to_core(path: &Path, error: anyhow::Error) -> CoreError {
    CoreError::image_io(path, format!("{error:#}"))
}

impl ImageLoader for NiftiImageIo {
    fn read_header(&self, path: &Path) -> regkit_core::Result<ImageHeader> {
        read_nifti_header(path).map_err(|e| to_core(path, e))
    }

    fn load(&self, path: &Path) -> regkit_core::Result<RawImage> {
        read_nifti(path).map_err(|e| to_core(path, e))
    }
}

impl ImageWriter for NiftiImageIo {
    fn write(&self, path: &Path, image: &RawImage) -> regkit_core::Result<()> {
        write_nifti(path, image).map_err(|e| to_core(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    #[test]
    fn test_read_nifti_basic() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // logical shape (x, y, z) = (3, 4, 5)
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let header = read_nifti_header(&file_path)?;
        assert_eq!(header.dimension, 3);
        assert_eq!(header.size, vec![3, 4, 5]);
        assert_eq!(header.pixel_type, PixelType::Float);

        let image = read_nifti(&file_path)?;
        assert_eq!(image.voxels.len(), 60);
        assert_eq!(image.voxels[0], 0.0);
        assert_eq!(image.voxels[1], 1.0);
        assert_eq!(image.voxels[3], 10.0);
        assert_eq!(image.voxels[12], 100.0);
        Ok(())
    }

    #[test]
    fn test_missing_file_maps_to_image_io_error() {
        let err = NiftiImageIo.read_header(Path::new("/nonexistent/file.nii")).unwrap_err();
        assert!(matches!(err, CoreError::ImageIo { .. }));
    }
}
