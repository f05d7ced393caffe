//! Whole-raster copies
//!
//! Copies every pixel of a dataset or band into another of the same size,
//! one swath at a time, converting to the destination data type.

use tracing::debug;
use crate::band::{RasterBand, COVERAGE_DATA};
use crate::config::{Config, CopyOptions, Interleave};
use crate::copy::swath::swath_size;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::progress::{self, ProgressFn};
use crate::rasterio::{BufferLayout, ExtraArg, IoBuffer, Window};

const USER_TERMINATED: &str = "User terminated CreateCopy()";

/// Whether a dataset's `INTERLEAVE` metadata asks for interleaved copies
fn metadata_interleaved(dataset: &Dataset) -> bool {
    dataset
        .metadata_item("INTERLEAVE")
        .and_then(Interleave::parse)
        .is_some_and(|il| il.is_interleaved())
}

/// Copies all bands of `src` into `dst`.
///
/// Bands are copied one after the other unless interleaving is requested
/// by `options` or by the `INTERLEAVE` metadata of either dataset, in which
/// case every swath carries all bands.
pub fn copy_whole_raster(
    src: &Dataset,
    dst: &Dataset,
    options: &CopyOptions,
    config: &Config,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    if src.x_size() != dst.x_size() || src.y_size() != dst.y_size() || src.band_count() != dst.band_count() {
        return Err(Error::Mismatch(format!(
            "Input and output dataset sizes or band counts do not match: {}x{}x{} vs {}x{}x{}",
            src.x_size(),
            src.y_size(),
            src.band_count(),
            dst.x_size(),
            dst.y_size(),
            dst.band_count()
        )));
    }

    progress::check(progress, 0.0, USER_TERMINATED)?;

    let (Some(src_proto), Some(dst_proto)) = (src.band(0), dst.band(0)) else {
        return Ok(());
    };

    let interleave = match options.interleave {
        Some(il) => il.is_interleaved(),
        None => metadata_interleaved(src) || metadata_interleaved(dst),
    };
    let band_count = dst.band_count();
    let data_type = dst_proto.data_type();
    let swath = swath_size(src_proto, dst_proto, band_count, options.compressed, interleave, config);
    debug!(
        "{}*{} swaths, interleave={}",
        swath.cols, swath.lines, interleave
    );

    let (x_size, y_size) = (dst.x_size(), dst.y_size());
    let word = data_type.size();
    let mut swath_buf = if interleave {
        vec![0u8; swath.cols * swath.lines * word * band_count]
    } else {
        vec![0u8; swath.cols * swath.lines * word]
    };

    let tiles_per_band = y_size.div_ceil(swath.lines) * x_size.div_ceil(swath.cols);
    let total = if interleave {
        tiles_per_band as f64
    } else {
        (tiles_per_band * band_count) as f64
    };
    let mut done = 0usize;

    if !interleave {
        for b in 0..band_count {
            let bands = [b];
            for tile in tiles(x_size, y_size, swath.cols, swath.lines) {
                let has_data = !options.skip_holes
                    || src.bands()[b].data_coverage_status(tile.x_off, tile.y_off, tile.x_size, tile.y_size)
                        & COVERAGE_DATA
                        != 0;
                if has_data {
                    let layout = BufferLayout::packed(tile.x_size, tile.y_size, data_type);
                    let scaled = progress::scaled(done as f64 / total, (done as f64 + 0.5) / total, progress);
                    let scaled_ref: ProgressFn<'_> = &scaled;
                    let extra = ExtraArg {
                        progress: progress.map(|_| scaled_ref),
                        ..ExtraArg::default()
                    };
                    src.raster_io(tile, IoBuffer::Read(&mut swath_buf), &layout, Some(&bands[..]), 0, Some(&extra))?;
                    dst.raster_io(tile, IoBuffer::Write(&swath_buf), &layout, Some(&bands[..]), 0, None)?;
                }
                done += 1;
                progress::check(progress, done as f64 / total, USER_TERMINATED)?;
            }
        }
        return Ok(());
    }

    for tile in tiles(x_size, y_size, swath.cols, swath.lines) {
        let has_data = !options.skip_holes
            || src.bands().iter().any(|band| {
                band.data_coverage_status(tile.x_off, tile.y_off, tile.x_size, tile.y_size) & COVERAGE_DATA != 0
            });
        if has_data {
            let layout = BufferLayout::with_spacing(
                tile.x_size,
                tile.y_size,
                data_type,
                word * band_count,
                word * band_count * tile.x_size,
            );
            let scaled = progress::scaled(done as f64 / total, (done as f64 + 0.5) / total, progress);
            let scaled_ref: ProgressFn<'_> = &scaled;
            let extra = ExtraArg {
                progress: progress.map(|_| scaled_ref),
                ..ExtraArg::default()
            };
            src.raster_io(tile, IoBuffer::Read(&mut swath_buf), &layout, None, word, Some(&extra))?;
            dst.raster_io(tile, IoBuffer::Write(&swath_buf), &layout, None, word, None)?;
        }
        done += 1;
        progress::check(progress, done as f64 / total, USER_TERMINATED)?;
    }
    Ok(())
}

/// Copies every pixel of `src` into `dst`, converting to the destination type
pub fn copy_band_raster(
    src: &RasterBand,
    dst: &RasterBand,
    options: &CopyOptions,
    config: &Config,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let (x_size, y_size) = (src.x_size(), src.y_size());
    if dst.x_size() != x_size || dst.y_size() != y_size {
        return Err(Error::Mismatch(format!(
            "Input and output band sizes do not match: {}x{} vs {}x{}",
            x_size,
            y_size,
            dst.x_size(),
            dst.y_size()
        )));
    }

    progress::check(progress, 0.0, USER_TERMINATED)?;

    let data_type = dst.data_type();
    let swath = swath_size(src, dst, 1, options.compressed, false, config);
    debug!("{}*{} swaths", swath.cols, swath.lines);

    let mut swath_buf = vec![0u8; swath.cols * swath.lines * data_type.size()];
    for tile in tiles(x_size, y_size, swath.cols, swath.lines) {
        let has_data = !options.skip_holes
            || src.data_coverage_status(tile.x_off, tile.y_off, tile.x_size, tile.y_size) & COVERAGE_DATA != 0;
        if has_data {
            let layout = BufferLayout::packed(tile.x_size, tile.y_size, data_type);
            src.raster_io(tile, IoBuffer::Read(&mut swath_buf), &layout, None)?;
            dst.raster_io(tile, IoBuffer::Write(&swath_buf), &layout, None)?;
        }
        progress::check(
            progress,
            (tile.y_off + tile.y_size) as f64 / y_size as f64,
            USER_TERMINATED,
        )?;
    }
    Ok(())
}

/// Swath windows covering a `x_size` x `y_size` raster, row by row
fn tiles(x_size: usize, y_size: usize, cols: usize, lines: usize) -> impl Iterator<Item = Window> {
    (0..y_size).step_by(lines).flat_map(move |y| {
        (0..x_size)
            .step_by(cols)
            .map(move |x| Window::new(x, y, cols.min(x_size - x), lines.min(y_size - y)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Arc;
    use crate::band::{CoverageFn, COVERAGE_EMPTY};
    use crate::store::MemBlockStore;
    use crate::types::DataType;

    fn small_swaths() -> Config {
        Config {
            swath_size: Some(1),
            ..Config::default()
        }
    }

    fn source(width: usize, height: usize, bands: usize) -> Dataset {
        let mut builder = Dataset::builder(width, height);
        for b in 0..bands {
            let band = RasterBand::builder(width, height, DataType::U16)
                .block_size(4, 4)
                .build();
            let data: Vec<u16> = (0..width * height).map(|i| (i + b * 1000) as u16).collect();
            band.write_slice(Window::new(0, 0, width, height), &data, width, height)
                .unwrap();
            builder = builder.band(band);
        }
        builder.build().unwrap()
    }

    fn destination(width: usize, height: usize, bands: usize, data_type: DataType) -> Dataset {
        let mut builder = Dataset::builder(width, height);
        for _ in 0..bands {
            builder = builder.band(
                RasterBand::builder(width, height, data_type)
                    .block_size(width, 2)
                    .store(Arc::new(MemBlockStore::new()))
                    .build(),
            );
        }
        builder.build().unwrap()
    }

    fn contents(ds: &Dataset) -> Vec<Vec<u32>> {
        ds.bands()
            .iter()
            .map(|band| {
                band.read_vec(Window::new(0, 0, ds.x_size(), ds.y_size()), ds.x_size(), ds.y_size(), None)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_band_and_pixel_modes_agree() {
        let src = source(9, 7, 3);
        let sequential = destination(9, 7, 3, DataType::U32);
        let interleaved = destination(9, 7, 3, DataType::U32);

        copy_whole_raster(&src, &sequential, &CopyOptions::default(), &small_swaths(), None).unwrap();
        let options = CopyOptions::from_pairs(&[("INTERLEAVE", "PIXEL")]).unwrap();
        copy_whole_raster(&src, &interleaved, &options, &small_swaths(), None).unwrap();

        assert_eq!(contents(&sequential), contents(&src));
        assert_eq!(contents(&interleaved), contents(&src));
    }

    #[test]
    fn test_interleave_from_metadata() {
        let src = source(4, 4, 2);
        let dst = {
            let mut builder = Dataset::builder(4, 4).metadata("INTERLEAVE", "pixel");
            for _ in 0..2 {
                builder = builder.band(RasterBand::builder(4, 4, DataType::U16).build());
            }
            builder.build().unwrap()
        };
        assert!(metadata_interleaved(&dst));
        copy_whole_raster(&src, &dst, &CopyOptions::default(), &Config::default(), None).unwrap();
        assert_eq!(contents(&dst), contents(&src));
    }

    #[test]
    fn test_mismatch_is_rejected_before_io() {
        let src = source(4, 4, 2);
        let dst = destination(4, 4, 1, DataType::U16);
        let called = RefCell::new(false);
        let record = |_: f64, _: &str| {
            *called.borrow_mut() = true;
            true
        };
        let record_ref: ProgressFn = &record;
        let err = copy_whole_raster(&src, &dst, &CopyOptions::default(), &Config::default(), Some(record_ref))
            .unwrap_err();
        assert!(matches!(err, Error::Mismatch(_)));
        assert!(!*called.borrow());
    }

    #[test]
    fn test_cancel_at_start() {
        let src = source(4, 4, 1);
        let dst = destination(4, 4, 1, DataType::U16);
        let stop: ProgressFn = &|_: f64, _: &str| false;
        let err = copy_whole_raster(&src, &dst, &CopyOptions::default(), &Config::default(), Some(stop))
            .unwrap_err();
        assert!(matches!(err, Error::UserCancelled(ref m) if m == "User terminated CreateCopy()"));
        assert_eq!(contents(&dst), vec![vec![0; 16]]);
    }

    #[test]
    fn test_progress_reaches_one() {
        let src = source(8, 8, 2);
        let dst = destination(8, 8, 2, DataType::U16);
        let seen = RefCell::new(Vec::new());
        let record = |fraction: f64, _: &str| {
            seen.borrow_mut().push(fraction);
            true
        };
        let record_ref: ProgressFn = &record;
        copy_whole_raster(&src, &dst, &CopyOptions::default(), &Config::default(), Some(record_ref)).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    fn holey_source() -> Dataset {
        // Band 0 reports no data anywhere; band 1 only above row 500
        let empty: CoverageFn = Arc::new(|_: usize, _: usize, _: usize, _: usize| COVERAGE_EMPTY);
        let upper: CoverageFn = Arc::new(|_: usize, y: usize, _: usize, _: usize| {
            if y < 500 {
                COVERAGE_DATA
            } else {
                COVERAGE_EMPTY
            }
        });
        let mut builder = Dataset::builder(2000, 1000);
        for (value, coverage) in [(5u8, empty), (6u8, upper)] {
            let band = RasterBand::builder(2000, 1000, DataType::U8)
                .block_size(2000, 1)
                .coverage(coverage)
                .build();
            band.write_slice(Window::new(0, 0, 2000, 1000), &vec![value; 2_000_000], 2000, 1000)
                .unwrap();
            builder = builder.band(band);
        }
        builder.build().unwrap()
    }

    fn row(ds: &Dataset, band: usize, y: usize) -> Vec<u8> {
        ds.band(band)
            .unwrap()
            .read_vec(Window::new(0, y, 2000, 1), 2000, 1, None)
            .unwrap()
    }

    #[test]
    fn test_skip_holes_band_sequential() {
        let src = holey_source();
        let dst = destination(2000, 1000, 2, DataType::U8);
        let options = CopyOptions::from_pairs(&[("SKIP_HOLES", "YES")]).unwrap();
        let config = Config {
            swath_size: Some(1_000_000),
            ..Config::default()
        };
        copy_whole_raster(&src, &dst, &options, &config, None).unwrap();

        assert_eq!(row(&dst, 0, 0), vec![0; 2000]);
        assert_eq!(row(&dst, 1, 0), vec![6; 2000]);
        assert_eq!(row(&dst, 1, 499), vec![6; 2000]);
        assert_eq!(row(&dst, 1, 500), vec![0; 2000]);
    }

    #[test]
    fn test_skip_holes_interleaved_needs_one_band_with_data() {
        let src = holey_source();
        let dst = destination(2000, 1000, 2, DataType::U8);
        let options = CopyOptions::from_pairs(&[("SKIP_HOLES", "YES"), ("INTERLEAVE", "PIXEL")]).unwrap();
        let config = Config {
            swath_size: Some(1_000_000),
            ..Config::default()
        };
        copy_whole_raster(&src, &dst, &options, &config, None).unwrap();

        assert_eq!(row(&dst, 0, 0), vec![5; 2000]);
        assert_eq!(row(&dst, 1, 0), vec![6; 2000]);
        assert_eq!(row(&dst, 0, 999), vec![0; 2000]);
        assert_eq!(row(&dst, 1, 999), vec![0; 2000]);
    }

    #[test]
    fn test_band_copy_converts_type() {
        let src = RasterBand::builder(6, 5, DataType::I16).block_size(6, 1).build();
        let data: Vec<i16> = (0..30).map(|i| i * 20 - 100).collect();
        src.write_slice(Window::new(0, 0, 6, 5), &data, 6, 5).unwrap();
        let dst = RasterBand::builder(6, 5, DataType::U8).block_size(3, 3).build();

        let seen = RefCell::new(Vec::new());
        let record = |fraction: f64, _: &str| {
            seen.borrow_mut().push(fraction);
            true
        };
        let record_ref: ProgressFn = &record;
        copy_band_raster(&src, &dst, &CopyOptions::default(), &small_swaths(), Some(record_ref)).unwrap();

        let out: Vec<u8> = dst.read_vec(Window::new(0, 0, 6, 5), 6, 5, None).unwrap();
        let expected: Vec<u8> = data.iter().map(|&v| v.clamp(0, 255) as u8).collect();
        assert_eq!(out, expected);
        assert_eq!(seen.borrow().last(), Some(&1.0));
    }

    #[test]
    fn test_tiles_cover_raster() {
        let windows: Vec<Window> = tiles(5, 3, 2, 2).collect();
        assert_eq!(windows.len(), 6);
        assert_eq!(windows[2], Window::new(4, 0, 1, 2));
        assert_eq!(windows[5], Window::new(4, 2, 1, 1));
    }
}
