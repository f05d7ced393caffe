//! Vectorized copy kernels with scalar fallbacks
//!
//! x86_64 always has SSE2, so the kernels below need no runtime detection.
//! Every kernel processes whole vectors and leaves the tail to the scalar
//! loop, which keeps results identical to the generic word converter.

use crate::convert::copy::copy_words_generic;
use crate::types::DataType;

/// Gathers every `src_stride`-th byte into a packed destination (stride 2..=4)
#[cfg(target_arch = "x86_64")]
pub(crate) fn unrolled_copy_u8(dst: &mut [u8], src: &[u8], src_stride: usize, count: usize) {
    use std::arch::x86_64::*;

    let mut i = 0;

    unsafe {
        match src_stride {
            2 => {
                let mask = _mm_set1_epi16(0x00FF);
                while i + 16 <= count && i * 2 + 32 <= src.len() {
                    let p = src.as_ptr().add(i * 2);
                    let lo = _mm_and_si128(_mm_loadu_si128(p as *const __m128i), mask);
                    let hi = _mm_and_si128(_mm_loadu_si128(p.add(16) as *const __m128i), mask);
                    _mm_storeu_si128(dst.as_mut_ptr().add(i) as *mut __m128i, _mm_packus_epi16(lo, hi));
                    i += 16;
                }
            }
            4 => {
                let mask = _mm_set1_epi32(0x0000_00FF);
                while i + 16 <= count && i * 4 + 64 <= src.len() {
                    let p = src.as_ptr().add(i * 4);
                    let a = _mm_and_si128(_mm_loadu_si128(p as *const __m128i), mask);
                    let b = _mm_and_si128(_mm_loadu_si128(p.add(16) as *const __m128i), mask);
                    let c = _mm_and_si128(_mm_loadu_si128(p.add(32) as *const __m128i), mask);
                    let d = _mm_and_si128(_mm_loadu_si128(p.add(48) as *const __m128i), mask);
                    let ab = _mm_packs_epi32(a, b);
                    let cd = _mm_packs_epi32(c, d);
                    _mm_storeu_si128(dst.as_mut_ptr().add(i) as *mut __m128i, _mm_packus_epi16(ab, cd));
                    i += 16;
                }
            }
            _ => {}
        }
    }

    unrolled_copy_u8_scalar(&mut dst[i..], &src[i * src_stride..], src_stride, count - i);
}

/// Gathers every `src_stride`-th byte into a packed destination (scalar fallback)
#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn unrolled_copy_u8(dst: &mut [u8], src: &[u8], src_stride: usize, count: usize) {
    unrolled_copy_u8_scalar(dst, src, src_stride, count);
}

fn unrolled_copy_u8_scalar(dst: &mut [u8], src: &[u8], src_stride: usize, count: usize) {
    let mut i = 0;
    while i + 4 <= count {
        dst[i] = src[i * src_stride];
        dst[i + 1] = src[(i + 1) * src_stride];
        dst[i + 2] = src[(i + 2) * src_stride];
        dst[i + 3] = src[(i + 3) * src_stride];
        i += 4;
    }
    while i < count {
        dst[i] = src[i * src_stride];
        i += 1;
    }
}

/// Converts packed words with a vector kernel when one exists for the type
/// pair. Returns `false` when no kernel applies and nothing was written.
#[cfg(target_arch = "x86_64")]
pub(crate) fn convert_packed(
    src: &[u8],
    src_type: DataType,
    dst: &mut [u8],
    dst_type: DataType,
    count: usize,
) -> bool {
    let done = match (src_type, dst_type) {
        (DataType::U8, DataType::F32) => x86::u8_to_f32(src, dst, count),
        (DataType::F32, DataType::U8) => x86::f32_to_u8(src, dst, count),
        (DataType::U16, DataType::F32) => x86::u16_to_f32(src, dst, count),
        _ => return false,
    };

    let (ss, ds) = (src_type.size(), dst_type.size());
    copy_words_generic(
        &src[done * ss..],
        src_type,
        ss,
        &mut dst[done * ds..],
        dst_type,
        ds,
        count - done,
    );
    true
}

/// Converts packed words with a vector kernel (no kernels on this target)
#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn convert_packed(
    _src: &[u8],
    _src_type: DataType,
    _dst: &mut [u8],
    _dst_type: DataType,
    _count: usize,
) -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    /// Returns the number of words converted
    pub(super) fn u8_to_f32(src: &[u8], dst: &mut [u8], count: usize) -> usize {
        let mut i = 0;
        unsafe {
            let zero = _mm_setzero_si128();
            while i + 16 <= count && i + 16 <= src.len() && (i + 16) * 4 <= dst.len() {
                let bytes = _mm_loadu_si128(src.as_ptr().add(i) as *const __m128i);
                let lo16 = _mm_unpacklo_epi8(bytes, zero);
                let hi16 = _mm_unpackhi_epi8(bytes, zero);
                let out = dst.as_mut_ptr().add(i * 4) as *mut f32;
                _mm_storeu_ps(out, _mm_cvtepi32_ps(_mm_unpacklo_epi16(lo16, zero)));
                _mm_storeu_ps(out.add(4), _mm_cvtepi32_ps(_mm_unpackhi_epi16(lo16, zero)));
                _mm_storeu_ps(out.add(8), _mm_cvtepi32_ps(_mm_unpacklo_epi16(hi16, zero)));
                _mm_storeu_ps(out.add(12), _mm_cvtepi32_ps(_mm_unpackhi_epi16(hi16, zero)));
                i += 16;
            }
        }
        i
    }

    pub(super) fn u16_to_f32(src: &[u8], dst: &mut [u8], count: usize) -> usize {
        let mut i = 0;
        unsafe {
            let zero = _mm_setzero_si128();
            while i + 8 <= count && (i + 8) * 2 <= src.len() && (i + 8) * 4 <= dst.len() {
                let words = _mm_loadu_si128(src.as_ptr().add(i * 2) as *const __m128i);
                let out = dst.as_mut_ptr().add(i * 4) as *mut f32;
                _mm_storeu_ps(out, _mm_cvtepi32_ps(_mm_unpacklo_epi16(words, zero)));
                _mm_storeu_ps(out.add(4), _mm_cvtepi32_ps(_mm_unpackhi_epi16(words, zero)));
                i += 8;
            }
        }
        i
    }

    /// Truncating, saturating narrow; NaN lands on 0 through `max(v, 0)`
    pub(super) fn f32_to_u8(src: &[u8], dst: &mut [u8], count: usize) -> usize {
        let mut i = 0;
        unsafe {
            let zero = _mm_setzero_ps();
            let max = _mm_set1_ps(255.0);
            while i + 16 <= count && (i + 16) * 4 <= src.len() && i + 16 <= dst.len() {
                let p = src.as_ptr().add(i * 4) as *const f32;
                let clamp = |v: __m128| _mm_cvttps_epi32(_mm_min_ps(_mm_max_ps(v, zero), max));
                let a = clamp(_mm_loadu_ps(p));
                let b = clamp(_mm_loadu_ps(p.add(4)));
                let c = clamp(_mm_loadu_ps(p.add(8)));
                let d = clamp(_mm_loadu_ps(p.add(12)));
                let packed = _mm_packus_epi16(_mm_packs_epi32(a, b), _mm_packs_epi32(c, d));
                _mm_storeu_si128(dst.as_mut_ptr().add(i) as *mut __m128i, packed);
                i += 16;
            }
        }
        i
    }
}
