//! Resampled reads
//!
//! Non-nearest reads with differing window and buffer sizes. Real bands are
//! processed in destination chunks whose full-resolution source footprint
//! stays near one megapixel; complex bands go through a [`Warper`].

use tracing::debug;
use crate::band::{MaskSource, RasterBand};
use crate::convert::{copy_words, store_value, word_components};
use crate::error::{Error, Result};
use crate::progress;
use crate::rasterio::kernels::{self, SampleGeometry, SourceChunk};
use crate::rasterio::warp::{PixelWarper, RasterIoTransformer, Warper};
use crate::rasterio::{BufferLayout, ExtraArg, IoBuffer, Window};
use crate::types::DataType;

/// Upper bound on the full-resolution pixels of one source chunk
const MAX_CHUNK_PIXELS: usize = 1024 * 1024;

/// Tolerance for treating a destination offset as integral
const VIRTUAL_OFFSET_EPSILON: f64 = 1e-8;

const USER_TERMINATED: &str = "User terminated RasterIO()";

/// Mutable raster view over a caller buffer
///
/// Pixels are addressed in buffer coordinates; values are written as `f64`
/// and converted (with saturation) into the view's data type.
pub struct MemRasterView<'a> {
    data: &'a mut [u8],
    layout: BufferLayout,
}

impl<'a> MemRasterView<'a> {
    pub fn new(data: &'a mut [u8], layout: BufferLayout) -> Result<Self> {
        let layout = layout.resolve();
        if data.len() < layout.required_len() {
            return Err(Error::InvalidArgument(format!(
                "View buffer of {} bytes too small (needs {})",
                data.len(),
                layout.required_len()
            )));
        }
        Ok(Self { data, layout })
    }

    pub fn width(&self) -> usize {
        self.layout.x_size
    }

    pub fn height(&self) -> usize {
        self.layout.y_size
    }

    pub fn data_type(&self) -> DataType {
        self.layout.data_type
    }

    /// Writes consecutive real values starting at (`x`, `y`)
    pub fn write_row(&mut self, x: usize, y: usize, values: &[f64]) {
        let count = values.len().min(self.layout.x_size.saturating_sub(x));
        let offset = self.layout.offset(x, y);
        copy_words(
            bytemuck::cast_slice(values),
            DataType::F64,
            8,
            &mut self.data[offset..],
            self.layout.data_type,
            self.layout.pixel_space,
            count,
        );
    }

    /// Writes consecutive complex values starting at (`x`, `y`)
    pub fn write_complex_row(&mut self, x: usize, y: usize, values: &[[f64; 2]]) {
        let count = values.len().min(self.layout.x_size.saturating_sub(x));
        let offset = self.layout.offset(x, y);
        copy_words(
            bytemuck::cast_slice(values),
            DataType::CF64,
            16,
            &mut self.data[offset..],
            self.layout.data_type,
            self.layout.pixel_space,
            count,
        );
    }

    /// Sets `count` pixels from (`x`, `y`) to `value`
    pub fn fill(&mut self, x: usize, y: usize, count: usize, value: f64) {
        let count = count.min(self.layout.x_size.saturating_sub(x));
        let offset = self.layout.offset(x, y);
        copy_words(
            bytemuck::bytes_of(&value),
            DataType::F64,
            0,
            &mut self.data[offset..],
            self.layout.data_type,
            self.layout.pixel_space,
            count,
        );
    }

    /// Pixel (`x`, `y`) as `(real, imaginary)`
    pub fn pixel(&self, x: usize, y: usize) -> (f64, f64) {
        word_components(&self.data[self.layout.offset(x, y)..], self.layout.data_type)
    }
}

/// Destination chunk dimensions for a resampled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkPlan {
    pub block_x: usize,
    pub block_y: usize,
}

/// Halves the destination chunk until its full-resolution footprint fits
/// [`MAX_CHUNK_PIXELS`].
pub(crate) fn plan_chunks(
    band: &RasterBand,
    window: &Window,
    layout: &BufferLayout,
    x_ratio: f64,
    y_ratio: f64,
) -> ChunkPlan {
    let mut block_x = layout.x_size;
    let mut block_y = layout.y_size;
    loop {
        let full_x = (3 + (block_x as f64 * x_ratio) as usize).min(band.x_size);
        let full_y = (3 + (block_y as f64 * y_ratio) as usize).min(band.y_size);
        if (block_x == 1 && block_y == 1) || full_x * full_y <= MAX_CHUNK_PIXELS {
            break;
        }
        if full_x >= window.x_size && window.x_size == band.block_x_size && block_y > 1 {
            block_y /= 2;
        } else if block_x > 1 && (full_x > full_y || block_y == 1) {
            block_x /= 2;
        } else {
            block_y /= 2;
        }
    }
    ChunkPlan { block_x, block_y }
}

/// Snaps `origin` to a multiple of `ratio` when `origin / ratio` is integral
fn snap_origin(origin: f64, ratio: f64) -> f64 {
    let dst = origin / ratio;
    let rounded = (dst + 0.5).floor();
    if (dst - rounded).abs() < VIRTUAL_OFFSET_EPSILON {
        rounded * ratio
    } else {
        origin
    }
}

/// Source span read for destination pixels `d0..d0 + count` of one axis,
/// padded by `pad` and clamped to `limit`
fn source_span(base: usize, d0: usize, count: usize, ratio: f64, pad: usize, limit: usize) -> (usize, usize) {
    let start = (base + (d0 as f64 * ratio) as usize).min(limit.saturating_sub(1));
    let end = (base + 1 + ((d0 + count) as f64 * ratio).ceil() as usize).min(limit);
    let start = start.saturating_sub(pad);
    let end = (end + pad).min(limit).max(start + 1);
    (start, end - start)
}

/// The shared value when every byte of `mask` is equal
fn uniform(mask: &[u8]) -> Option<u8> {
    let first = *mask.first()?;
    mask.iter().all(|&m| m == first).then_some(first)
}

/// `nodata` as representable in `data_type`
pub(crate) fn nodata_in_band_type(nodata: f64, data_type: DataType) -> f64 {
    let mut word = [0u8; 16];
    store_value(nodata, &mut word, data_type);
    word_components(&word, data_type).0
}

/// Whether `value` matches the nodata value `nodata`
pub(crate) fn is_nodata(value: f64, nodata: f64) -> bool {
    value == nodata || (value.is_nan() && nodata.is_nan())
}

impl RasterBand {
    /// Resampled read of `window` into `data`; `layout` must be resolved
    pub(crate) fn raster_io_resampled(
        &self,
        window: &Window,
        data: &mut [u8],
        layout: &BufferLayout,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let source = extra.source_window(window);
        let x_ratio = source.x_size / layout.x_size as f64;
        let y_ratio = source.y_size / layout.y_size as f64;
        let geometry = SampleGeometry {
            x_ratio,
            y_ratio,
            x_origin: snap_origin(source.x_off, x_ratio),
            y_origin: snap_origin(source.y_off, y_ratio),
        };
        debug!(alg = extra.resample_alg.name(), x_ratio, y_ratio, "resampled read");

        if layout.data_type == self.data_type {
            let mut view = MemRasterView::new(data, *layout)?;
            return self.resample_into(window, &mut view, &geometry, extra);
        }

        let band_word = self.data_type.size();
        let row_bytes = layout.x_size * band_word;
        let mut temp = vec![0u8; row_bytes * layout.y_size];
        {
            let mut view = MemRasterView::new(
                &mut temp,
                BufferLayout::packed(layout.x_size, layout.y_size, self.data_type),
            )?;
            self.resample_into(window, &mut view, &geometry, extra)?;
        }
        for (y, row) in temp.chunks_exact(row_bytes).enumerate() {
            copy_words(
                row,
                self.data_type,
                band_word,
                &mut data[layout.offset(0, y)..],
                layout.data_type,
                layout.pixel_space,
                layout.x_size,
            );
        }
        Ok(())
    }

    fn resample_into(
        &self,
        window: &Window,
        view: &mut MemRasterView<'_>,
        geometry: &SampleGeometry,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let alg = extra.resample_alg;
        let (buf_x, buf_y) = (view.width(), view.height());
        let layout = BufferLayout::packed(buf_x, buf_y, view.data_type());
        let plan = plan_chunks(self, window, &layout, geometry.x_ratio, geometry.y_ratio);
        debug!(block_x = plan.block_x, block_y = plan.block_y, "resampling chunk size");
        let total = buf_x.div_ceil(plan.block_x) * buf_y.div_ceil(plan.block_y);

        if self.data_type.is_complex() {
            let transformer = RasterIoTransformer::new(
                geometry.x_origin,
                geometry.y_origin,
                geometry.x_ratio,
                geometry.y_ratio,
            );
            let warper: &dyn Warper = match &self.warper {
                Some(warper) => warper.as_ref(),
                None => &PixelWarper,
            };
            let mut done = 0;
            for dst_y in (0..buf_y).step_by(plan.block_y) {
                let rows = plan.block_y.min(buf_y - dst_y);
                for dst_x in (0..buf_x).step_by(plan.block_x) {
                    let cols = plan.block_x.min(buf_x - dst_x);
                    warper.warp(
                        self,
                        &transformer,
                        alg,
                        self.nodata,
                        &Window::new(dst_x, dst_y, cols, rows),
                        view,
                        None,
                    )?;
                    done += 1;
                    progress::check(extra.progress, done as f64 / total as f64, USER_TERMINATED)?;
                }
            }
            return Ok(());
        }

        let radius = alg.kernel_radius();
        let pad_x = radius * ((0.5 + geometry.x_ratio) as usize).max(1);
        let pad_y = radius * ((0.5 + geometry.y_ratio) as usize).max(1);
        let base_x = geometry.x_origin.floor().max(0.0) as usize;
        let base_y = geometry.y_origin.floor().max(0.0) as usize;
        let fill = self.nodata.unwrap_or(0.0);
        let round = !self.data_type.is_floating();
        let mut done = 0;

        for dst_y in (0..buf_y).step_by(plan.block_y) {
            let rows = plan.block_y.min(buf_y - dst_y);
            let (src_y, src_rows) = source_span(base_y, dst_y, rows, geometry.y_ratio, pad_y, self.y_size);

            for dst_x in (0..buf_x).step_by(plan.block_x) {
                let cols = plan.block_x.min(buf_x - dst_x);
                let (src_x, src_cols) =
                    source_span(base_x, dst_x, cols, geometry.x_ratio, pad_x, self.x_size);
                let chunk_window = Window::new(src_x, src_y, src_cols, src_rows);

                let mut values = vec![0f64; src_cols * src_rows];
                self.raster_io(
                    chunk_window,
                    IoBuffer::Read(bytemuck::cast_slice_mut(&mut values)),
                    &BufferLayout::packed(src_cols, src_rows, DataType::F64),
                    None,
                )?;

                let mask = self.read_mask_chunk(&chunk_window, &values)?;
                let mask = match mask.as_deref().and_then(uniform) {
                    Some(0) => {
                        for r in 0..rows {
                            view.fill(dst_x, dst_y + r, cols, fill);
                        }
                        done += 1;
                        progress::check(extra.progress, done as f64 / total as f64, USER_TERMINATED)?;
                        continue;
                    }
                    Some(_) => None,
                    None => mask,
                };

                let chunk = SourceChunk {
                    values: &values,
                    mask: mask.as_deref(),
                    x_off: src_x,
                    y_off: src_y,
                    width: src_cols,
                    height: src_rows,
                };
                let mut out = kernels::resample(
                    alg,
                    &chunk,
                    geometry,
                    dst_x..dst_x + cols,
                    dst_y..dst_y + rows,
                    fill,
                );
                if round {
                    out.iter_mut().for_each(|v| *v = v.round());
                }
                for (r, row) in out.chunks_exact(cols).enumerate() {
                    view.write_row(dst_x, dst_y + r, row);
                }

                done += 1;
                progress::check(extra.progress, done as f64 / total as f64, USER_TERMINATED)?;
            }
        }

        Ok(())
    }

    /// Validity mask of `window`, or `None` when every pixel is valid
    fn read_mask_chunk(&self, window: &Window, values: &[f64]) -> Result<Option<Vec<u8>>> {
        match &self.mask {
            MaskSource::AllValid => Ok(None),
            MaskSource::Nodata => {
                let Some(nodata) = self.nodata else {
                    return Ok(None);
                };
                let nodata = nodata_in_band_type(nodata, self.data_type);
                Ok(Some(
                    values
                        .iter()
                        .map(|&v| if is_nodata(v, nodata) { 0 } else { 255 })
                        .collect(),
                ))
            }
            MaskSource::Band(mask) => {
                let mut out = vec![0u8; window.x_size * window.y_size];
                mask.raster_io(
                    *window,
                    IoBuffer::Read(&mut out),
                    &BufferLayout::packed(window.x_size, window.y_size, DataType::U8),
                    None,
                )?;
                Ok(Some(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use approx::assert_relative_eq;
    use crate::progress::ProgressFn;
    use crate::types::ResampleAlg;

    fn band(width: usize, height: usize, block: (usize, usize), data_type: DataType) -> RasterBand {
        RasterBand::builder(width, height, data_type)
            .block_size(block.0, block.1)
            .build()
    }

    fn with_alg(alg: ResampleAlg) -> ExtraArg<'static> {
        ExtraArg::new().with_resample_alg(alg)
    }

    #[test]
    fn test_average_decimation_2x() {
        let band = band(4, 4, (2, 2), DataType::U8);
        let data: Vec<u8> = (0..16).map(|i| i * 2).collect();
        band.write_slice(Window::new(0, 0, 4, 4), &data, 4, 4).unwrap();

        let out: Vec<f32> = band
            .read_vec(Window::new(0, 0, 4, 4), 2, 2, Some(&with_alg(ResampleAlg::Average)))
            .unwrap();
        // mean of 0,2,8,10 and so on; converted through the band type (rounded)
        assert_eq!(out, vec![5.0, 9.0, 21.0, 25.0]);
    }

    #[test]
    fn test_bilinear_magnification_float_band() {
        let band = band(2, 1, (2, 1), DataType::F32);
        band.write_slice(Window::new(0, 0, 2, 1), &[0f32, 10.0], 2, 1).unwrap();

        let out: Vec<f64> = band
            .read_vec(Window::new(0, 0, 2, 1), 4, 1, Some(&with_alg(ResampleAlg::Bilinear)))
            .unwrap();
        let expected = [0.0, 2.5, 7.5, 10.0];
        for (got, want) in out.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_nodata_excluded_from_average() {
        let band = RasterBand::builder(4, 2, DataType::F32)
            .block_size(4, 2)
            .nodata(-1.0)
            .build();
        let data = [1f32, -1.0, -1.0, -1.0, 3.0, -1.0, -1.0, -1.0];
        band.write_slice(Window::new(0, 0, 4, 2), &data, 4, 2).unwrap();

        let out: Vec<f32> = band
            .read_vec(Window::new(0, 0, 4, 2), 2, 1, Some(&with_alg(ResampleAlg::Average)))
            .unwrap();
        assert_eq!(out, vec![2.0, -1.0]);
    }

    #[test]
    fn test_all_masked_chunk_gets_nodata() {
        let mask = RasterBand::builder(4, 4, DataType::U8).block_size(4, 4).build();
        let band = RasterBand::builder(4, 4, DataType::U16)
            .block_size(4, 4)
            .nodata(7.0)
            .mask_band(mask)
            .build();
        band.write_slice(Window::new(0, 0, 4, 4), &[100u16; 16], 4, 4).unwrap();

        let out: Vec<u16> = band
            .read_vec(Window::new(0, 0, 4, 4), 2, 2, Some(&with_alg(ResampleAlg::Cubic)))
            .unwrap();
        assert_eq!(out, vec![7; 4]);
    }

    #[test]
    fn test_constant_survives_every_kernel() {
        let band = band(16, 16, (8, 8), DataType::I16);
        band.write_slice(Window::new(0, 0, 16, 16), &[-42i16; 256], 16, 16).unwrap();

        for alg in [
            ResampleAlg::Bilinear,
            ResampleAlg::Cubic,
            ResampleAlg::CubicSpline,
            ResampleAlg::Lanczos,
            ResampleAlg::Average,
            ResampleAlg::Mode,
            ResampleAlg::Gauss,
        ] {
            let out: Vec<i16> = band
                .read_vec(Window::new(2, 2, 12, 12), 5, 3, Some(&with_alg(alg)))
                .unwrap();
            assert_eq!(out, vec![-42; 15], "{}", alg.name());
        }
    }

    #[test]
    fn test_buffer_type_conversion_through_temp() {
        let band = band(4, 1, (4, 1), DataType::U8);
        band.write_slice(Window::new(0, 0, 4, 1), &[10u8, 20, 30, 41], 4, 1).unwrap();

        let out: Vec<f64> = band
            .read_vec(Window::new(0, 0, 4, 1), 2, 1, Some(&with_alg(ResampleAlg::Average)))
            .unwrap();
        // 35.5 rounds in the Byte band type before conversion
        assert_eq!(out, vec![15.0, 36.0]);
    }

    #[test]
    fn test_progress_counts_chunks() {
        let band = band(4, 4, (2, 2), DataType::U8);
        let seen = RefCell::new(Vec::new());
        let record = |fraction: f64, _: &str| {
            seen.borrow_mut().push(fraction);
            true
        };
        let record_ref: ProgressFn = &record;
        let extra = ExtraArg::new()
            .with_resample_alg(ResampleAlg::Bilinear)
            .with_progress(record_ref);
        band.read_vec::<u8>(Window::new(0, 0, 4, 4), 2, 2, Some(&extra)).unwrap();
        assert_eq!(*seen.borrow(), vec![1.0]);

        let stop: ProgressFn = &|_: f64, _: &str| false;
        let extra = ExtraArg::new()
            .with_resample_alg(ResampleAlg::Bilinear)
            .with_progress(stop);
        let err = band
            .read_vec::<u8>(Window::new(0, 0, 4, 4), 2, 2, Some(&extra))
            .unwrap_err();
        assert!(matches!(err, Error::UserCancelled(_)));
    }

    #[test]
    fn test_complex_reads_are_chunked() {
        let (width, height) = (1100, 1000);
        let band = band(width, height, (width, 1), DataType::CF32);
        let data: Vec<[f32; 2]> = (0..width * height)
            .map(|i| [(i % width) as f32, -((i / width) as f32)])
            .collect();
        band.write_slice(Window::new(0, 0, width, height), &data, width, height).unwrap();

        let seen = RefCell::new(Vec::new());
        let record = |fraction: f64, _: &str| {
            seen.borrow_mut().push(fraction);
            true
        };
        let record_ref: ProgressFn = &record;
        let extra = ExtraArg::new()
            .with_resample_alg(ResampleAlg::Average)
            .with_progress(record_ref);
        let out: Vec<[f32; 2]> = band
            .read_vec(Window::new(0, 0, width, height), 550, 500, Some(&extra))
            .unwrap();

        assert_eq!(*seen.borrow(), vec![0.5, 1.0]);
        for (i, value) in out.iter().enumerate() {
            let (c, r) = ((i % 550) as f32, (i / 550) as f32);
            assert_eq!(*value, [2.0 * c + 0.5, -(2.0 * r + 0.5)], "pixel {}", i);
        }
    }

    #[test]
    fn test_chunk_plan_halves_large_requests() {
        let band = band(4096, 4096, (256, 256), DataType::U8);
        let window = Window::new(0, 0, 4096, 4096);
        let layout = BufferLayout::packed(2048, 2048, DataType::U8);
        let plan = plan_chunks(&band, &window, &layout, 2.0, 2.0);
        let full_x = 3 + plan.block_x * 2;
        let full_y = 3 + plan.block_y * 2;
        assert!(full_x * full_y <= MAX_CHUNK_PIXELS);
        assert!(plan.block_x < 2048 || plan.block_y < 2048);

        let small = BufferLayout::packed(100, 100, DataType::U8);
        let plan = plan_chunks(&band, &Window::new(0, 0, 200, 200), &small, 2.0, 2.0);
        assert_eq!(plan, ChunkPlan { block_x: 100, block_y: 100 });
    }

    #[test]
    fn test_snap_origin() {
        assert_eq!(snap_origin(4.0, 2.0), 4.0);
        assert_eq!(snap_origin(1.5, 0.5), 1.5);
        assert_eq!(snap_origin(1.2, 2.0), 1.2);
        assert_relative_eq!(snap_origin(6.000000001, 3.0), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_source_span_padding() {
        assert_eq!(source_span(0, 0, 2, 2.0, 0, 4), (0, 4));
        assert_eq!(source_span(4, 1, 1, 2.0, 2, 10), (4, 6));
        assert_eq!(source_span(0, 0, 4, 0.5, 1, 2), (0, 2));
    }

    #[test]
    fn test_view_fill_and_pixel() {
        let mut data = vec![0u8; 8];
        let mut view = MemRasterView::new(&mut data, BufferLayout::packed(2, 2, DataType::U16)).unwrap();
        view.fill(0, 1, 2, 70000.0);
        view.write_row(0, 0, &[1.0, 2.0]);
        assert_eq!(view.pixel(1, 1), (65535.0, 0.0));
        assert_eq!(view.pixel(1, 0), (2.0, 0.0));
        assert!(MemRasterView::new(&mut [0u8; 3], BufferLayout::packed(2, 2, DataType::U8)).is_err());
    }
}
