//! Core data types for skyforest-rasterio

use serde::{Deserialize, Serialize};

/// Represents pixel data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 32-bit integer
    I32,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Complex pair of signed 16-bit integers
    CI16,
    /// Complex pair of signed 32-bit integers
    CI32,
    /// Complex pair of 32-bit floats
    CF32,
    /// Complex pair of 64-bit floats
    CF64,
}

impl DataType {
    /// Every supported type, real types first
    pub const ALL: [DataType; 11] = [
        DataType::U8,
        DataType::U16,
        DataType::I16,
        DataType::U32,
        DataType::I32,
        DataType::F32,
        DataType::F64,
        DataType::CI16,
        DataType::CI32,
        DataType::CF32,
        DataType::CF64,
    ];

    /// Returns the size in bytes of one pixel word
    pub fn size(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 | DataType::CI16 => 4,
            DataType::F64 | DataType::CI32 | DataType::CF32 => 8,
            DataType::CF64 => 16,
        }
    }

    /// Returns whether this type stores a real/imaginary pair
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            DataType::CI16 | DataType::CI32 | DataType::CF32 | DataType::CF64
        )
    }

    /// Returns whether this type is floating point (or a pair of floats)
    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            DataType::F32 | DataType::F64 | DataType::CF32 | DataType::CF64
        )
    }

    /// Size in bytes of one component; equals `size()` for real types
    pub fn component_size(&self) -> usize {
        if self.is_complex() {
            self.size() / 2
        } else {
            self.size()
        }
    }

    /// Returns the name of this data type
    pub fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "U8",
            DataType::U16 => "U16",
            DataType::I16 => "I16",
            DataType::U32 => "U32",
            DataType::I32 => "I32",
            DataType::F32 => "F32",
            DataType::F64 => "F64",
            DataType::CI16 => "CI16",
            DataType::CI32 => "CI32",
            DataType::CF32 => "CF32",
            DataType::CF64 => "CF64",
        }
    }
}

/// Direction of a RasterIO request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwFlag {
    /// Raster to buffer
    Read,
    /// Buffer to raster
    Write,
}

/// Resampling algorithm used when buffer and window geometry differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleAlg {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
    Gauss,
}

impl ResampleAlg {
    /// Radius of the convolution kernel in source pixels, before widening
    /// for decimation
    pub fn kernel_radius(&self) -> usize {
        match self {
            ResampleAlg::Nearest | ResampleAlg::Average | ResampleAlg::Mode => 0,
            ResampleAlg::Bilinear | ResampleAlg::Gauss => 1,
            ResampleAlg::Cubic | ResampleAlg::CubicSpline => 2,
            ResampleAlg::Lanczos => 3,
        }
    }

    /// Returns the name of this algorithm
    pub fn name(&self) -> &'static str {
        match self {
            ResampleAlg::Nearest => "NEAREST",
            ResampleAlg::Bilinear => "BILINEAR",
            ResampleAlg::Cubic => "CUBIC",
            ResampleAlg::CubicSpline => "CUBICSPLINE",
            ResampleAlg::Lanczos => "LANCZOS",
            ResampleAlg::Average => "AVERAGE",
            ResampleAlg::Mode => "MODE",
            ResampleAlg::Gauss => "GAUSS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_size() {
        assert_eq!(DataType::U8.size(), 1);
        assert_eq!(DataType::U16.size(), 2);
        assert_eq!(DataType::U32.size(), 4);
        assert_eq!(DataType::F32.size(), 4);
        assert_eq!(DataType::F64.size(), 8);
        assert_eq!(DataType::CI16.size(), 4);
        assert_eq!(DataType::CF64.size(), 16);
    }

    #[test]
    fn test_complex_component_size() {
        assert!(DataType::CF32.is_complex());
        assert!(!DataType::F32.is_complex());
        assert_eq!(DataType::CF32.component_size(), 4);
        assert_eq!(DataType::I16.component_size(), 2);
    }

    #[test]
    fn test_data_type_name() {
        assert_eq!(DataType::U8.name(), "U8");
        assert_eq!(DataType::CF32.name(), "CF32");
    }

    #[test]
    fn test_kernel_radius() {
        assert_eq!(ResampleAlg::Nearest.kernel_radius(), 0);
        assert_eq!(ResampleAlg::Bilinear.kernel_radius(), 1);
        assert_eq!(ResampleAlg::Cubic.kernel_radius(), 2);
        assert_eq!(ResampleAlg::Lanczos.kernel_radius(), 3);
    }
}
