//! Bit-level copies for sub-byte pixel data

/// Copies `step_count` groups of `bit_count` bits, most significant bit first.
///
/// Group `i` starts `i * step` bits past each offset, so a step equal to
/// `bit_count` copies a contiguous run and a smaller step re-reads or
/// overwrites the tail of the previous group.
#[allow(clippy::too_many_arguments)]
pub fn copy_bits(
    src: &[u8],
    src_bit_offset: usize,
    src_bit_step: usize,
    dst: &mut [u8],
    dst_bit_offset: usize,
    dst_bit_step: usize,
    bit_count: usize,
    step_count: usize,
) {
    for step in 0..step_count {
        let mut src_offset = src_bit_offset + step * src_bit_step;
        let mut dst_offset = dst_bit_offset + step * dst_bit_step;
        for _ in 0..bit_count {
            let dst_mask = 0x80u8 >> (dst_offset & 7);
            if src[src_offset >> 3] & (0x80u8 >> (src_offset & 7)) != 0 {
                dst[dst_offset >> 3] |= dst_mask;
            } else {
                dst[dst_offset >> 3] &= !dst_mask;
            }
            src_offset += 1;
            dst_offset += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_copy_across_byte_boundary() {
        let src = [0b1011_0011, 0b1100_0000];
        let mut dst = [0u8; 2];
        copy_bits(&src, 4, 4, &mut dst, 0, 4, 4, 2);
        assert_eq!(dst, [0b0011_1100, 0]);
    }

    #[test]
    fn test_clears_destination_bits() {
        let src = [0u8];
        let mut dst = [0xFFu8];
        copy_bits(&src, 0, 1, &mut dst, 2, 1, 3, 1);
        assert_eq!(dst, [0b1100_0111]);
    }

    #[test]
    fn test_strided_groups() {
        // Take the top 2 bits of each source nibble.
        let src = [0b1101_0110];
        let mut dst = [0u8];
        copy_bits(&src, 0, 4, &mut dst, 0, 2, 2, 2);
        assert_eq!(dst, [0b1101_0000]);
    }

    #[test]
    fn test_step_shorter_than_group_overlaps() {
        // Groups of 3 bits starting at source bits 0 and 1
        let src = [0b1010_0000];
        let mut dst = [0u8];
        copy_bits(&src, 0, 1, &mut dst, 0, 3, 3, 2);
        assert_eq!(dst, [0b1010_1000]);
    }

    #[test]
    fn test_unaligned_destination_offset() {
        let src = [0xFF];
        let mut dst = [0u8; 2];
        copy_bits(&src, 0, 8, &mut dst, 5, 8, 8, 1);
        assert_eq!(dst, [0b0000_0111, 0b1111_1000]);
    }
}
