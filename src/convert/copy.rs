//! Strided, type-converting bulk word copies

use std::mem::size_of;
use crate::convert::simd;
use crate::convert::word::{convert_word, Word};
use crate::types::DataType;

/// Converts and copies `count` words from `src` to `dst`.
///
/// `src_stride` and `dst_stride` are byte distances between consecutive
/// words. A source stride of 0 replicates the first source word `count`
/// times. Both slices must cover `(count - 1) * stride + word_size` bytes.
pub fn copy_words(
    src: &[u8],
    src_type: DataType,
    src_stride: usize,
    dst: &mut [u8],
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    if count == 0 {
        return;
    }

    if src_stride == 0 && count > 1 {
        replicate_word(src, src_type, dst, dst_type, dst_stride, count);
        return;
    }

    if src_type == dst_type {
        copy_same_type(src, src_stride, dst, dst_stride, src_type.size(), count);
        return;
    }

    if src_stride == src_type.size()
        && dst_stride == dst_type.size()
        && simd::convert_packed(src, src_type, dst, dst_type, count)
    {
        return;
    }

    copy_words_generic(src, src_type, src_stride, dst, dst_type, dst_stride, count);
}

/// Per-word conversion loop used whenever no fast path applies
pub fn copy_words_generic(
    src: &[u8],
    src_type: DataType,
    src_stride: usize,
    dst: &mut [u8],
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    match src_type {
        DataType::U8 => copy_from::<u8>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::U16 => copy_from::<u16>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::I16 => copy_from::<i16>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::U32 => copy_from::<u32>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::I32 => copy_from::<i32>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::F32 => copy_from::<f32>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::F64 => copy_from::<f64>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::CI16 => copy_from::<[i16; 2]>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::CI32 => copy_from::<[i32; 2]>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::CF32 => copy_from::<[f32; 2]>(src, src_stride, dst, dst_type, dst_stride, count),
        DataType::CF64 => copy_from::<[f64; 2]>(src, src_stride, dst, dst_type, dst_stride, count),
    }
}

fn copy_from<S: Word>(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    match dst_type {
        DataType::U8 => copy_typed::<S, u8>(src, src_stride, dst, dst_stride, count),
        DataType::U16 => copy_typed::<S, u16>(src, src_stride, dst, dst_stride, count),
        DataType::I16 => copy_typed::<S, i16>(src, src_stride, dst, dst_stride, count),
        DataType::U32 => copy_typed::<S, u32>(src, src_stride, dst, dst_stride, count),
        DataType::I32 => copy_typed::<S, i32>(src, src_stride, dst, dst_stride, count),
        DataType::F32 => copy_typed::<S, f32>(src, src_stride, dst, dst_stride, count),
        DataType::F64 => copy_typed::<S, f64>(src, src_stride, dst, dst_stride, count),
        DataType::CI16 => copy_typed::<S, [i16; 2]>(src, src_stride, dst, dst_stride, count),
        DataType::CI32 => copy_typed::<S, [i32; 2]>(src, src_stride, dst, dst_stride, count),
        DataType::CF32 => copy_typed::<S, [f32; 2]>(src, src_stride, dst, dst_stride, count),
        DataType::CF64 => copy_typed::<S, [f64; 2]>(src, src_stride, dst, dst_stride, count),
    }
}

fn copy_typed<S: Word, D: Word>(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    count: usize,
) {
    let src_size = size_of::<S>();
    let dst_size = size_of::<D>();

    for i in 0..count {
        let s = i * src_stride;
        let d = i * dst_stride;
        let value: S = bytemuck::pod_read_unaligned(&src[s..s + src_size]);
        let out: D = convert_word(value);
        dst[d..d + dst_size].copy_from_slice(bytemuck::bytes_of(&out));
    }
}

/// Converts the first source word once, then repeats the converted bytes
fn replicate_word(
    src: &[u8],
    src_type: DataType,
    dst: &mut [u8],
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    let size = dst_type.size();
    let mut word = [0u8; 16];
    copy_words_generic(src, src_type, src_type.size(), &mut word, dst_type, size, 1);
    let word = &word[..size];

    if dst_stride == size && size == 1 {
        dst[..count].fill(word[0]);
        return;
    }

    for i in 0..count {
        let d = i * dst_stride;
        dst[d..d + size].copy_from_slice(word);
    }
}

fn copy_same_type(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    size: usize,
    count: usize,
) {
    if src_stride == size && dst_stride == size {
        let len = count * size;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }

    if count == 1 {
        dst[..size].copy_from_slice(&src[..size]);
        return;
    }

    if size == 1 && dst_stride == 1 && (2..=4).contains(&src_stride) {
        simd::unrolled_copy_u8(dst, src, src_stride, count);
        return;
    }

    match size {
        1 => strided_copy::<1>(src, src_stride, dst, dst_stride, count),
        2 => strided_copy::<2>(src, src_stride, dst, dst_stride, count),
        4 => strided_copy::<4>(src, src_stride, dst, dst_stride, count),
        8 => strided_copy::<8>(src, src_stride, dst, dst_stride, count),
        _ => strided_copy::<16>(src, src_stride, dst, dst_stride, count),
    }
}

#[inline]
fn strided_copy<const N: usize>(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    count: usize,
) {
    for i in 0..count {
        let s = i * src_stride;
        let d = i * dst_stride;
        dst[d..d + N].copy_from_slice(&src[s..s + N]);
    }
}

/// Reads one word of any type as `(real, imaginary)` components
pub fn word_components(bytes: &[u8], data_type: DataType) -> (f64, f64) {
    let mut out = [0u8; 16];
    copy_words_generic(bytes, data_type, data_type.size(), &mut out, DataType::CF64, 16, 1);
    let pair: [f64; 2] = bytemuck::pod_read_unaligned(&out);
    (pair[0], pair[1])
}

/// Writes a real value into one word of any type, saturating as needed
pub fn store_value(value: f64, dst: &mut [u8], data_type: DataType) {
    copy_words_generic(
        bytemuck::bytes_of(&value),
        DataType::F64,
        8,
        dst,
        data_type,
        data_type.size(),
        1,
    );
}

/// Number of bytes a strided run of `count` words occupies
#[inline]
pub fn span_len(count: usize, stride: usize, word_size: usize) -> usize {
    if count == 0 {
        0
    } else {
        (count - 1) * stride + word_size
    }
}
