//! Byte order (endianness) handling
//!
//! Provides in-place word swapping for pixel buffers whose storage byte
//! order differs from the host. Used by block stores that keep raw words in
//! a declared byte order.

use serde::{Deserialize, Serialize};

/// Largest number of words handed to a single `swap_words` pass
const SWAP_CHUNK_WORDS: usize = 1 << 30;

/// Represents the byte order (endianness) of binary data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian byte order (least significant byte first)
    LittleEndian,
    /// Big-endian byte order (most significant byte first)
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    /// Whether data in this order must be swapped to be read natively
    pub fn needs_swap(&self) -> bool {
        *self != Self::native()
    }
}

/// Swaps `word_count` words of `word_size` bytes in place.
///
/// `word_skip` is the byte distance between the starts of consecutive words.
/// Size 1 is a no-op; sizes other than 1, 2, 4 and 8 are a caller bug.
pub fn swap_words(data: &mut [u8], word_size: usize, word_count: usize, word_skip: usize) {
    if word_size == 1 || word_count == 0 {
        return;
    }

    if word_skip == word_size && swap_aligned(data, word_size, word_count) {
        return;
    }

    match word_size {
        2 | 4 | 8 => {
            for i in 0..word_count {
                let offset = i * word_skip;
                data[offset..offset + word_size].reverse();
            }
        }
        _ => unreachable!("unsupported word size {}", word_size),
    }
}

/// Packed words whose first byte is suitably aligned are swapped as integers
fn swap_aligned(data: &mut [u8], word_size: usize, word_count: usize) -> bool {
    let bytes = &mut data[..word_size * word_count];
    match word_size {
        2 => match bytemuck::try_cast_slice_mut::<u8, u16>(bytes) {
            Ok(words) => words.iter_mut().for_each(|w| *w = w.swap_bytes()),
            Err(_) => return false,
        },
        4 => match bytemuck::try_cast_slice_mut::<u8, u32>(bytes) {
            Ok(words) => words.iter_mut().for_each(|w| *w = w.swap_bytes()),
            Err(_) => return false,
        },
        8 => match bytemuck::try_cast_slice_mut::<u8, u64>(bytes) {
            Ok(words) => words.iter_mut().for_each(|w| *w = w.swap_bytes()),
            Err(_) => return false,
        },
        _ => return false,
    }
    true
}

/// Like [`swap_words`] for arbitrarily large counts, segmenting the work
pub fn swap_words_ex(data: &mut [u8], word_size: usize, word_count: usize, word_skip: usize) {
    let mut done = 0;
    while done < word_count {
        let chunk = (word_count - done).min(SWAP_CHUNK_WORDS);
        swap_words(&mut data[done * word_skip..], word_size, chunk, word_skip);
        done += chunk;
    }
}

/// Swaps complex words, which are two independent components
pub fn swap_data_type_words(data: &mut [u8], data_type: crate::types::DataType, word_count: usize) {
    if data_type.is_complex() {
        let half = data_type.component_size();
        swap_words_ex(data, half, word_count * 2, half);
    } else {
        swap_words_ex(data, data_type.size(), word_count, data_type.size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_native_needs_no_swap() {
        assert!(!ByteOrder::native().needs_swap());
        let other = match ByteOrder::native() {
            ByteOrder::LittleEndian => ByteOrder::BigEndian,
            ByteOrder::BigEndian => ByteOrder::LittleEndian,
        };
        assert!(other.needs_swap());
    }

    #[test]
    fn test_swap_u16_packed() {
        let mut data = vec![0x12, 0x34, 0x56, 0x78];
        swap_words(&mut data, 2, 2, 2);
        assert_eq!(data, vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn test_swap_u32_unaligned() {
        let mut data = vec![0u8, 1, 2, 3, 4];
        swap_words(&mut data[1..], 4, 1, 4);
        assert_eq!(data, vec![0, 4, 3, 2, 1]);
    }

    #[test]
    fn test_swap_with_skip() {
        let mut data: Vec<u8> = (0..12).collect();
        swap_words(&mut data, 2, 3, 4);
        assert_eq!(data, vec![1, 0, 2, 3, 5, 4, 6, 7, 9, 8, 10, 11]);
    }

    #[test]
    fn test_swap_u64() {
        let mut data = 0x0102_0304_0506_0708u64.to_ne_bytes().to_vec();
        swap_words(&mut data, 8, 1, 8);
        assert_eq!(data, 0x0807_0605_0403_0201u64.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_swap_byte_is_noop() {
        let mut data = vec![1u8, 2, 3];
        swap_words(&mut data, 1, 3, 1);
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_swap_ex_matches_swap_words() {
        let original: Vec<u8> = (0..64).collect();
        let mut a = original.clone();
        let mut b = original.clone();
        swap_words(&mut a, 4, 16, 4);
        swap_words_ex(&mut b, 4, 16, 4);
        assert_eq!(a, b);
        swap_words_ex(&mut b, 4, 16, 4);
        assert_eq!(b, original);
    }

    #[test]
    fn test_swap_complex_components() {
        let mut data = vec![0x01, 0x02, 0x03, 0x04];
        swap_data_type_words(&mut data, DataType::CI16, 1);
        assert_eq!(data, vec![0x02, 0x01, 0x04, 0x03]);
    }
}
