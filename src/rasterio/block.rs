//! Block-aligned RasterIO engine
//!
//! Satisfies a windowed request from the band's blocks. Three structural
//! cases exist: packed full-width strips, 1:1 windows of any alignment, and
//! the general decimating/magnifying case. Reads may instead be served from
//! an overview or routed to the resampling path.

use std::ops::Range;
use tracing::{debug, warn};
use crate::band::RasterBand;
use crate::cache::BlockGuard;
use crate::convert::copy_words;
use crate::error::{Error, Result};
use crate::progress;
use crate::rasterio::{best_overview_level, BufferLayout, ExtraArg, IoBuffer, Window};
use crate::types::{DataType, ResampleAlg, RwFlag};

/// Added to nearest-neighbour sample positions to absorb rounding noise
const SAMPLE_EPSILON: f64 = 1e-10;

const USER_TERMINATED: &str = "User terminated RasterIO()";

impl RasterBand {
    /// Block-level implementation behind [`RasterBand::raster_io`]; expects a
    /// validated request with resolved spacing.
    pub(crate) fn i_raster_io(
        &self,
        window: &Window,
        mut buf: IoBuffer<'_>,
        layout: &BufferLayout,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        if let Some(err) = self.cache.take_flush_error() {
            return Err(Error::DeferredFlush(Box::new(err)));
        }
        if self.block_x_size == 0 || self.block_y_size == 0 {
            return Err(Error::InvalidBlockSize {
                width: self.block_x_size,
                height: self.block_y_size,
            });
        }

        let rw = buf.rw();
        let buf_word = layout.data_type.size();
        let same_size = window.x_size == layout.x_size && window.y_size == layout.y_size;
        let integer_coords = extra
            .floating
            .map_or(true, |floating| floating.is_integer_aligned(window));

        if layout.pixel_space == buf_word
            && layout.line_space == buf_word * window.x_size
            && self.block_x_size == self.x_size
            && same_size
            && integer_coords
        {
            return self.io_full_width(window, &mut buf, layout, extra);
        }

        if rw == RwFlag::Read
            && (layout.x_size < window.x_size || layout.y_size < window.y_size)
            && !self.overviews.is_empty()
        {
            let mut overview_extra = ExtraArg::copy_from(extra);
            if let Some((level, overview_window)) =
                best_overview_level(self, window, layout.x_size, layout.y_size, &mut overview_extra)
            {
                let overview = self.overview(level).ok_or_else(|| {
                    Error::InvalidArgument(format!("Overview {} does not exist", level))
                })?;
                debug!(level, ?overview_window, "serving read from overview");
                return overview.raster_io(overview_window, buf, layout, Some(&overview_extra));
            }
        }

        if self.config.no_costly_overview
            && layout.x_size < window.x_size / 100
            && layout.y_size < window.y_size / 100
            && layout.pixel_space == buf_word
            && layout.line_space == buf_word * layout.x_size
        {
            if let IoBuffer::Read(data) = &mut buf {
                data[..layout.line_space * layout.y_size].fill(0);
                return Ok(());
            }
        }

        if same_size && integer_coords {
            return self.io_one_to_one(window, &mut buf, layout, extra);
        }

        match buf {
            IoBuffer::Write(data) => self.io_general_write(window, data, layout, extra),
            IoBuffer::Read(data) => {
                if extra.resample_alg != ResampleAlg::Nearest {
                    if extra.resample_alg == ResampleAlg::Gauss && self.data_type.is_complex() {
                        warn!(
                            "Resampling method not supported on complex data type band. \
                             Falling back to nearest neighbour"
                        );
                    } else {
                        return self.raster_io_resampled(window, data, layout, extra);
                    }
                }
                self.io_general_read(window, data, layout, extra)
            }
        }
    }

    /// Locks a block for I/O, honouring the interruption flag
    pub(crate) fn fetch_block(&self, x: usize, y: usize, just_initialize: bool) -> Result<BlockGuard<'_>> {
        if self.is_interrupted() {
            return Err(Error::Interrupted);
        }
        self.cache
            .lock_block(x, y, just_initialize)
            .map_err(|err| Error::block_fetch(x, y, err))
    }

    /// Packed request on a band whose blocks span the full raster width
    fn io_full_width(
        &self,
        window: &Window,
        buf: &mut IoBuffer<'_>,
        layout: &BufferLayout,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let (bw, bh) = (self.block_x_size, self.block_y_size);
        let band_word = self.data_type.size();
        let write = buf.rw() == RwFlag::Write;
        let covers_width = window.x_off == 0 && window.x_size == bw;
        let window_bottom = window.y_off + window.y_size;

        let mut row = 0;
        while row < layout.y_size {
            let src_y = window.y_off + row;
            let block_y = src_y / bh;
            let top = block_y * bh;
            let first = src_y - top;
            let rows = (bh - first).min(layout.y_size - row);

            let mut just_initialize =
                write && covers_width && window.y_off <= top && window_bottom >= top + bh;
            // Partial last block row that this write completes
            let zero_fill = write
                && !just_initialize
                && covers_width
                && window.y_off <= top
                && window_bottom == self.y_size
                && top + bh > self.y_size;
            if zero_fill {
                just_initialize = true;
            }

            let mut block = self.fetch_block(0, block_y, just_initialize)?;
            if write {
                block.mark_dirty();
            }
            if zero_fill {
                block.data_mut().fill(0);
            }

            for r in 0..rows {
                let block_off = ((first + r) * bw + window.x_off) * band_word;
                transfer(
                    buf,
                    layout.offset(0, row + r),
                    layout.data_type,
                    layout.pixel_space,
                    &mut block,
                    block_off,
                    self.data_type,
                    window.x_size,
                );
                progress::check(
                    extra.progress,
                    (row + r + 1) as f64 / layout.y_size as f64,
                    USER_TERMINATED,
                )?;
            }

            row += rows;
        }

        Ok(())
    }

    /// Window and buffer of equal size, any alignment and spacing
    fn io_one_to_one(
        &self,
        window: &Window,
        buf: &mut IoBuffer<'_>,
        layout: &BufferLayout,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let (bw, bh) = (self.block_x_size, self.block_y_size);
        let band_word = self.data_type.size();
        let write = buf.rw() == RwFlag::Write;
        let window_right = window.x_off + window.x_size;
        let window_bottom = window.y_off + window.y_size;

        let mut buf_y = 0;
        while buf_y < layout.y_size {
            let src_y = window.y_off + buf_y;
            let block_y = src_y / bh;
            let top = block_y * bh;
            let y_in_block = src_y - top;
            let y_inc = bh - y_in_block;
            let kmax = y_inc.min(layout.y_size - buf_y);

            let mut buf_x = 0;
            while buf_x < layout.x_size {
                let src_x = window.x_off + buf_x;
                let block_x = src_x / bw;
                let left = block_x * bw;
                let x_right = left + bw;
                let x_in_block = src_x - left;
                let x_span = x_right.min(window_right) - src_x;

                let mut just_initialize = write
                    && window.y_off <= top
                    && window_bottom >= top + bh
                    && window.x_off <= left
                    && window_right >= x_right;
                // Partial edge block that this write completes on both axes
                let zero_fill = write
                    && !just_initialize
                    && window.x_off <= left
                    && window.y_off <= top
                    && (window_right >= x_right
                        || (window_right == self.x_size && x_right > self.x_size))
                    && (window_bottom >= top + bh
                        || (window_bottom == self.y_size && top + bh > self.y_size));
                if zero_fill {
                    just_initialize = true;
                }

                let mut block = self.fetch_block(block_x, block_y, just_initialize)?;
                if write {
                    block.mark_dirty();
                }
                if zero_fill {
                    block.data_mut().fill(0);
                }

                for k in 0..kmax {
                    let block_off = ((y_in_block + k) * bw + x_in_block) * band_word;
                    transfer(
                        buf,
                        layout.offset(buf_x, buf_y + k),
                        layout.data_type,
                        layout.pixel_space,
                        &mut block,
                        block_off,
                        self.data_type,
                        x_span,
                    );
                }

                buf_x += x_span;
            }

            buf_y += y_inc;
            progress::check(
                extra.progress,
                buf_y.min(layout.y_size) as f64 / layout.y_size as f64,
                USER_TERMINATED,
            )?;
        }

        Ok(())
    }

    /// Write with differing window and buffer sizes: every raster pixel of
    /// the window takes the buffer pixel it falls into
    fn io_general_write(
        &self,
        window: &Window,
        data: &[u8],
        layout: &BufferLayout,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let (bw, bh) = (self.block_x_size, self.block_y_size);
        let band_word = self.data_type.size();
        let source = extra.source_window(window);
        let x_inc = source.x_size / layout.x_size as f64;
        let y_inc = source.y_size / layout.y_size as f64;

        let cols: Vec<usize> = (0..window.x_size)
            .map(|dx| ((dx as f64 / x_inc) as usize).min(layout.x_size - 1))
            .collect();
        let rows: Vec<usize> = (0..window.y_size)
            .map(|dy| ((dy as f64 / y_inc) as usize).min(layout.y_size - 1))
            .collect();

        let window_right = window.x_off + window.x_size;
        let window_bottom = window.y_off + window.y_size;

        for block_y in window.y_off / bh..=(window_bottom - 1) / bh {
            let top = block_y * bh;
            let y_range = top.max(window.y_off)..(top + bh).min(window_bottom);

            for block_x in window.x_off / bw..=(window_right - 1) / bw {
                let left = block_x * bw;
                let x_range = left.max(window.x_off)..(left + bw).min(window_right);

                let just_initialize = window.y_off <= top
                    && window_bottom >= top + bh
                    && window.x_off <= left
                    && window_right >= left + bw;
                let mut block = self.fetch_block(block_x, block_y, just_initialize)?;
                block.mark_dirty();

                let block_data = block.data_mut();
                for y in y_range.clone() {
                    let buf_row = rows[y - window.y_off];
                    for x in x_range.clone() {
                        let block_off = ((y - top) * bw + (x - left)) * band_word;
                        copy_words(
                            &data[layout.offset(cols[x - window.x_off], buf_row)..],
                            layout.data_type,
                            layout.pixel_space,
                            &mut block_data[block_off..],
                            self.data_type,
                            band_word,
                            1,
                        );
                    }
                }
            }

            for y in y_range {
                progress::check(
                    extra.progress,
                    (y + 1 - window.y_off) as f64 / window.y_size as f64,
                    USER_TERMINATED,
                )?;
            }
        }

        Ok(())
    }

    /// Nearest-neighbour read with differing window and buffer sizes
    fn io_general_read(
        &self,
        window: &Window,
        data: &mut [u8],
        layout: &BufferLayout,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let (bw, bh) = (self.block_x_size, self.block_y_size);
        let band_word = self.data_type.size();
        let source = extra.source_window(window);

        let cols = nearest_samples(
            source.x_off,
            source.x_size / layout.x_size as f64,
            layout.x_size,
            self.x_size,
        );
        let rows = nearest_samples(
            source.y_off,
            source.y_size / layout.y_size as f64,
            layout.y_size,
            self.y_size,
        );
        let (Some(&first_col), Some(&last_col)) = (cols.first(), cols.last()) else {
            return Ok(());
        };
        let (Some(&first_row), Some(&last_row)) = (rows.first(), rows.last()) else {
            return Ok(());
        };

        for block_y in first_row / bh..=last_row / bh {
            let buf_rows = block_range(&rows, block_y, bh);
            if buf_rows.is_empty() {
                continue;
            }

            for block_x in first_col / bw..=last_col / bw {
                let buf_cols = block_range(&cols, block_x, bw);
                if buf_cols.is_empty() {
                    continue;
                }

                let block = self.fetch_block(block_x, block_y, false)?;
                let block_data = block.data();
                for i in buf_rows.clone() {
                    let row_base = (rows[i] - block_y * bh) * bw;
                    for j in buf_cols.clone() {
                        let block_off = (row_base + cols[j] - block_x * bw) * band_word;
                        copy_words(
                            &block_data[block_off..],
                            self.data_type,
                            band_word,
                            &mut data[layout.offset(j, i)..],
                            layout.data_type,
                            layout.pixel_space,
                            1,
                        );
                    }
                }
            }

            progress::check(
                extra.progress,
                buf_rows.end as f64 / layout.y_size as f64,
                USER_TERMINATED,
            )?;
        }

        Ok(())
    }
}

/// Raster coordinate sampled by each of `count` buffer pixels
fn nearest_samples(origin: f64, inc: f64, count: usize, limit: usize) -> Vec<usize> {
    (0..count)
        .map(|i| {
            let sample = ((i as f64 + 0.5) * inc + origin + SAMPLE_EPSILON) as usize;
            sample.min(limit.saturating_sub(1))
        })
        .collect()
}

/// Buffer indices whose samples fall into block `block` of `block_size`.
/// `samples` is non-decreasing, so the indices are contiguous.
fn block_range(samples: &[usize], block: usize, block_size: usize) -> Range<usize> {
    let start = samples.partition_point(|&s| s < block * block_size);
    let end = samples.partition_point(|&s| s < (block + 1) * block_size);
    start..end
}

/// Copies `count` words between a locked block and the caller buffer, in
/// the direction of `buf`
#[allow(clippy::too_many_arguments)]
fn transfer(
    buf: &mut IoBuffer<'_>,
    buf_off: usize,
    buf_type: DataType,
    buf_stride: usize,
    block: &mut BlockGuard<'_>,
    block_off: usize,
    band_type: DataType,
    count: usize,
) {
    let band_word = band_type.size();
    match buf {
        IoBuffer::Read(data) => copy_words(
            &block.data()[block_off..],
            band_type,
            band_word,
            &mut data[buf_off..],
            buf_type,
            buf_stride,
            count,
        ),
        IoBuffer::Write(data) => copy_words(
            &data[buf_off..],
            buf_type,
            buf_stride,
            &mut block.data_mut()[block_off..],
            band_type,
            band_word,
            count,
        ),
    }
}
