pub mod nifti_io;

pub use nifti_io::{read_nifti, read_nifti_header, write_nifti, NiftiImageIo};
