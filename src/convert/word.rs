//! Single-word conversion between pixel types
//!
//! Every word is viewed as a `(real, imaginary)` pair of `f64`. All supported
//! integer components are at most 32 bits wide, so the pair represents every
//! source value exactly. Narrowing back into the destination goes through
//! Rust's `as` casts, which truncate toward zero and saturate at the
//! destination bounds (NaN becomes 0).

use bytemuck::Pod;
use crate::types::DataType;

/// A fixed-width pixel word with a known [`DataType`]
pub trait Word: Pod {
    /// The pixel type this word represents
    const TYPE: DataType;

    /// Returns the real and imaginary parts (imaginary is 0 for real types)
    fn components(self) -> (f64, f64);

    /// Builds a word from components, saturating to the representable range.
    /// Real types ignore `im`.
    fn from_components(re: f64, im: f64) -> Self;
}

macro_rules! impl_real_word {
    ($t:ty, $dt:expr) => {
        impl Word for $t {
            const TYPE: DataType = $dt;

            #[inline]
            fn components(self) -> (f64, f64) {
                (self as f64, 0.0)
            }

            #[inline]
            fn from_components(re: f64, _im: f64) -> Self {
                re as $t
            }
        }
    };
}

impl_real_word!(u8, DataType::U8);
impl_real_word!(u16, DataType::U16);
impl_real_word!(i16, DataType::I16);
impl_real_word!(u32, DataType::U32);
impl_real_word!(i32, DataType::I32);
impl_real_word!(f64, DataType::F64);

impl Word for f32 {
    const TYPE: DataType = DataType::F32;

    #[inline]
    fn components(self) -> (f64, f64) {
        (self as f64, 0.0)
    }

    #[inline]
    fn from_components(re: f64, _im: f64) -> Self {
        clamp_to_f32(re)
    }
}

macro_rules! impl_complex_word {
    ($t:ty, $dt:expr, $narrow:expr) => {
        impl Word for [$t; 2] {
            const TYPE: DataType = $dt;

            #[inline]
            fn components(self) -> (f64, f64) {
                (self[0] as f64, self[1] as f64)
            }

            #[inline]
            fn from_components(re: f64, im: f64) -> Self {
                let narrow: fn(f64) -> $t = $narrow;
                [narrow(re), narrow(im)]
            }
        }
    };
}

impl_complex_word!(i16, DataType::CI16, |v| v as i16);
impl_complex_word!(i32, DataType::CI32, |v| v as i32);
impl_complex_word!(f32, DataType::CF32, clamp_to_f32);
impl_complex_word!(f64, DataType::CF64, |v| v);

/// Finite values outside the f32 range saturate to `±f32::MAX`
#[inline]
fn clamp_to_f32(value: f64) -> f32 {
    if value.is_finite() {
        value.clamp(f32::MIN as f64, f32::MAX as f64) as f32
    } else {
        value as f32
    }
}

/// Converts one word of type `S` to type `D`.
///
/// Identical types are copied bit for bit, so NaN payloads survive.
#[inline]
pub fn convert_word<S: Word, D: Word>(value: S) -> D {
    if S::TYPE == D::TYPE {
        return bytemuck::pod_read_unaligned(bytemuck::bytes_of(&value));
    }
    let (re, im) = value.components();
    D::from_components(re, im)
}
