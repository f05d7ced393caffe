//! Swath planning for whole-raster copies
//!
//! A swath is the window moved by one read/write pair. It aims for at least
//! one row of destination blocks and stays within a memory target derived
//! from the cache budget.

use tracing::{debug, warn};
use crate::band::RasterBand;
use crate::config::Config;

/// Swaths never target less than this many bytes
const MIN_SWATH_BYTES: usize = 1_000_000;

/// Preferred lower bound of the ideal swath buffer
const IDEAL_SWATH_FLOOR: usize = 10 * 1000 * 1000;

/// Swath dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swath {
    pub cols: usize,
    pub lines: usize,
}

#[inline]
fn divides(x: usize, y: usize) -> bool {
    x != 0 && y % x == 0
}

#[inline]
fn round_to(x: usize, y: usize) -> usize {
    if y == 0 {
        x
    } else {
        (x / y) * y
    }
}

/// Picks the swath for copying `src` into `dst`.
///
/// # Arguments
/// * `band_count` - Bands moved per swath when `interleave` is set
/// * `compressed` - The destination compresses blocks, so every block
///   should be written once
pub fn swath_size(
    src: &RasterBand,
    dst: &RasterBand,
    band_count: usize,
    compressed: bool,
    interleave: bool,
    config: &Config,
) -> Swath {
    let (x_size, y_size) = (src.x_size(), src.y_size());
    let (src_bx, src_by) = src.block_size();
    let (dst_bx, dst_by) = dst.block_size();
    let max_bx = dst_bx.max(src_bx);
    let max_by = dst_by.max(src_by);

    let mut pixel_size = dst.data_type().size();
    if interleave {
        pixel_size *= band_count.max(1);
    }

    let mut cols = x_size;
    let mut lines = dst_by;

    let jpeg2000_source = src
        .metadata_item("COMPRESSION")
        .is_some_and(|c| c.eq_ignore_ascii_case("JPEG2000"));

    let mut target = match config.swath_size {
        Some(size) => size,
        None => {
            let mut target = config.cache_max_bytes / 4;
            let mut ideal = cols * lines * pixel_size;
            if ideal < target && ideal < IDEAL_SWATH_FLOOR {
                ideal = IDEAL_SWATH_FLOOR;
            }
            if jpeg2000_source
                && (!compressed
                    || (dst_bx != 0 && dst_by != 0 && src_bx % dst_bx == 0 && src_by % dst_by == 0))
            {
                ideal = ideal.max(cols * src_by * pixel_size);
            }
            if target > ideal {
                target = ideal;
            }
            target
        }
    };
    target = target.max(MIN_SWATH_BYTES);

    if compressed && interleave && target > config.cache_max_bytes {
        warn!(
            cache_max = config.cache_max_bytes,
            swath = target,
            "When translating into a compressed interleave format, the block cache size \
             should be at least the size of the swath"
        );
    }

    // Both sides tiled with compatible tile sizes: stay on multiples of the
    // larger tile
    if dst_bx != x_size
        && src_bx != x_size
        && divides(dst_bx, max_bx)
        && divides(src_bx, max_bx)
        && divides(dst_by, max_by)
        && divides(src_by, max_by)
        && max_bx * max_by * pixel_size <= target
    {
        cols = round_to(target / (max_by * pixel_size), max_bx);
        if cols == 0 {
            cols = max_bx;
        }
        cols = cols.min(x_size);
        lines = max_by;

        if cols * lines * pixel_size > target {
            cols = x_size;
            lines = dst_by;
        }
    }

    let memory_per_col = (cols * pixel_size).max(1);
    if memory_per_col * lines > target {
        lines = (target / memory_per_col).max(1);
        debug!(
            lines,
            required = dst_by * memory_per_col,
            target,
            "adjusting line swath to the target size"
        );
    } else if lines == 1 || memory_per_col * lines < target / 10 {
        lines = y_size.min((target / memory_per_col).max(1));
        if max_by != 0
            && lines % max_by != 0
            && lines > max_by
            && divides(dst_by, max_by)
            && divides(src_by, max_by)
        {
            lines = round_to(lines, max_by);
        }
    }

    if jpeg2000_source
        && (!compressed || (divides(dst_bx, src_bx) && divides(dst_by, src_by)))
    {
        if lines < src_by {
            lines = src_by;
            cols = round_to(target / (src_bx * pixel_size).max(1), src_bx);
            if cols == 0 {
                cols = src_bx;
            }
            cols = cols.min(x_size);
            debug!("because of compression and too high block, use partial width at one time");
        } else if src_by != 0 && lines % src_by != 0 {
            lines = round_to(lines, src_by);
            debug!(lines, "because of compression, round swath lines to block height");
        }
    } else if compressed {
        if lines < dst_by {
            lines = dst_by;
            cols = round_to(target / (lines * pixel_size).max(1), dst_bx);
            if cols == 0 {
                cols = dst_bx;
            }
            cols = cols.min(x_size);
            debug!("because of compression and too high block, use partial width at one time");
        } else if dst_by != 0 && lines % dst_by != 0 {
            lines = round_to(lines, dst_by);
            debug!(lines, "because of compression, round swath lines to block height");
        }
    }

    Swath {
        cols: cols.max(1),
        lines: lines.max(1),
    }
}
