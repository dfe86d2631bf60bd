//! Pixel types and the type signature that selects a compiled pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Scalar pixel representation named in parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    Char,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
    Double,
}

impl PixelType {
    /// Name as it appears in parameter files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::UnsignedChar => "unsigned char",
            Self::Short => "short",
            Self::UnsignedShort => "unsigned short",
            Self::Int => "int",
            Self::UnsignedInt => "unsigned int",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', " ");
        match normalized.as_str() {
            "char" => Ok(Self::Char),
            "unsigned char" | "uchar" => Ok(Self::UnsignedChar),
            "short" => Ok(Self::Short),
            "unsigned short" | "ushort" => Ok(Self::UnsignedShort),
            "int" => Ok(Self::Int),
            "unsigned int" | "uint" => Ok(Self::UnsignedInt),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            _ => Err(CoreError::UnknownPixelType(s.to_string())),
        }
    }
}

/// Fixed and moving (pixel type, dimension) pairs of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeSignature {
    pub fixed_pixel_type: PixelType,
    pub fixed_dimension: usize,
    pub moving_pixel_type: PixelType,
    pub moving_dimension: usize,
}

impl TypeSignature {
    pub fn new(
        fixed_pixel_type: PixelType,
        fixed_dimension: usize,
        moving_pixel_type: PixelType,
        moving_dimension: usize,
    ) -> Self {
        Self {
            fixed_pixel_type,
            fixed_dimension,
            moving_pixel_type,
            moving_dimension,
        }
    }

    /// Signature with identical fixed and moving parts.
    pub fn symmetric(pixel_type: PixelType, dimension: usize) -> Self {
        Self::new(pixel_type, dimension, pixel_type, dimension)
    }

    /// Both dimensions are known.
    pub fn is_complete(&self) -> bool {
        self.fixed_dimension > 0 && self.moving_dimension > 0
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fixed ({}, {}D) / moving ({}, {}D)",
            self.fixed_pixel_type, self.fixed_dimension, self.moving_pixel_type, self.moving_dimension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_type_round_trip_names() {
        for name in ["char", "unsigned char", "short", "float", "double", "unsigned int"] {
            let pixel: PixelType = name.parse().unwrap();
            assert_eq!(pixel.as_str(), name);
        }
    }

    #[test]
    fn test_pixel_type_aliases() {
        assert_eq!("UCHAR".parse::<PixelType>().unwrap(), PixelType::UnsignedChar);
        assert_eq!("unsigned_short".parse::<PixelType>().unwrap(), PixelType::UnsignedShort);
        assert!("complex".parse::<PixelType>().is_err());
    }

    #[test]
    fn test_signature_completeness() {
        let mut signature = TypeSignature::symmetric(PixelType::Float, 3);
        assert!(signature.is_complete());
        signature.moving_dimension = 0;
        assert!(!signature.is_complete());
    }
}
