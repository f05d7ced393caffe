//! Multi-band datasets

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use crate::band::RasterBand;
use crate::error::{Error, Result};
use crate::progress;
use crate::rasterio::{validate_request, BufferLayout, ExtraArg, IoBuffer, Window};

/// A set of equally sized bands sharing one interruption flag
pub struct Dataset {
    x_size: usize,
    y_size: usize,
    bands: Vec<RasterBand>,
    metadata: HashMap<String, String>,
    interrupt: Arc<AtomicBool>,
}

impl Dataset {
    /// Starts building a `width` x `height` dataset
    pub fn builder(width: usize, height: usize) -> DatasetBuilder {
        DatasetBuilder {
            width,
            height,
            bands: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band `index`, counting from 0
    pub fn band(&self, index: usize) -> Option<&RasterBand> {
        self.bands.get(index)
    }

    pub fn bands(&self) -> &[RasterBand] {
        &self.bands
    }

    /// Looks up a metadata item (keys are case-insensitive)
    pub fn metadata_item(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Asks pending I/O on every band to stop before its next block fetch
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Writes every dirty block of every band
    pub fn flush(&self) -> Result<()> {
        for band in &self.bands {
            band.flush()?;
        }
        Ok(())
    }

    /// Reads or writes `window` of the selected bands.
    ///
    /// # Arguments
    /// * `bands` - Band indices from 0; `None` selects every band
    /// * `band_space` - Byte distance between bands in `buf`; 0 means
    ///   `line_space * y_size`
    ///
    /// Requests that are 1:1 over bands of one block size go block by block
    /// across all bands; everything else is handled band by band.
    pub fn raster_io(
        &self,
        window: Window,
        mut buf: IoBuffer<'_>,
        layout: &BufferLayout,
        bands: Option<&[usize]>,
        band_space: usize,
        extra: Option<&ExtraArg<'_>>,
    ) -> Result<()> {
        let extra = extra.copied().unwrap_or_default();
        let all: Vec<usize> = (0..self.bands.len()).collect();
        let selected = bands.unwrap_or(&all);
        if selected.is_empty() {
            return Ok(());
        }
        if let Some(&bad) = selected.iter().find(|&&b| b >= self.bands.len()) {
            return Err(Error::InvalidArgument(format!(
                "Band {} does not exist (dataset has {})",
                bad,
                self.bands.len()
            )));
        }

        let layout = layout.resolve();
        let band_space = if band_space == 0 {
            layout.line_space * layout.y_size
        } else {
            band_space
        };
        let needed = (selected.len() - 1) * band_space + layout.required_len();
        if buf.len() < needed {
            return Err(Error::InvalidArgument(format!(
                "Buffer of {} bytes too small for {} bands (needs {})",
                buf.len(),
                selected.len(),
                needed
            )));
        }
        validate_request(self.x_size, self.y_size, &window, &buf, &layout, &extra)?;

        let same_size = window.x_size == layout.x_size && window.y_size == layout.y_size;
        let integer_coords = extra
            .floating
            .map_or(true, |floating| floating.is_integer_aligned(&window));
        let block_size = self.bands[selected[0]].block_size();
        let shared_blocks = selected.iter().all(|&b| self.bands[b].block_size() == block_size);

        if selected.len() > 1 && same_size && integer_coords && shared_blocks {
            return self.block_based_io(&window, &mut buf, &layout, selected, band_space, &extra);
        }
        if selected.len() > 1 {
            debug!(same_size, shared_blocks, "band-based dataset I/O");
        }

        let count = selected.len() as f64;
        for (i, &b) in selected.iter().enumerate() {
            let scaled = progress::scaled(i as f64 / count, (i + 1) as f64 / count, extra.progress);
            let band_extra = ExtraArg {
                progress: extra.progress.map(|_| &scaled as progress::ProgressFn<'_>),
                ..extra
            };
            self.bands[b].raster_io(window, buf.offset(i * band_space), &layout, Some(&band_extra))?;
        }
        Ok(())
    }

    /// Walks the window one block at a time, transferring every selected
    /// band before moving to the next block
    fn block_based_io(
        &self,
        window: &Window,
        buf: &mut IoBuffer<'_>,
        layout: &BufferLayout,
        selected: &[usize],
        band_space: usize,
        extra: &ExtraArg<'_>,
    ) -> Result<()> {
        let (bw, bh) = self.bands[selected[0]].block_size();
        if bw == 0 || bh == 0 {
            return Err(Error::InvalidBlockSize { width: bw, height: bh });
        }
        let chunk_extra = ExtraArg::default();
        let window_right = window.x_off + window.x_size;
        let window_bottom = window.y_off + window.y_size;

        let mut y = window.y_off;
        while y < window_bottom {
            let rows = ((y / bh + 1) * bh).min(window_bottom) - y;
            let mut x = window.x_off;
            while x < window_right {
                let cols = ((x / bw + 1) * bw).min(window_right) - x;
                let chunk = Window::new(x, y, cols, rows);
                let chunk_layout = BufferLayout::with_spacing(
                    cols,
                    rows,
                    layout.data_type,
                    layout.pixel_space,
                    layout.line_space,
                );
                let base = layout.offset(x - window.x_off, y - window.y_off);
                for (i, &b) in selected.iter().enumerate() {
                    self.bands[b].i_raster_io(
                        &chunk,
                        buf.offset(base + i * band_space),
                        &chunk_layout,
                        &chunk_extra,
                    )?;
                }
                x += cols;
            }
            y += rows;
            progress::check(
                extra.progress,
                (y - window.y_off) as f64 / window.y_size as f64,
                "User terminated RasterIO()",
            )?;
        }
        Ok(())
    }
}

/// Builder for [`Dataset`]
pub struct DatasetBuilder {
    width: usize,
    height: usize,
    bands: Vec<RasterBand>,
    metadata: HashMap<String, String>,
}

impl DatasetBuilder {
    pub fn band(mut self, band: RasterBand) -> Self {
        self.bands.push(band);
        self
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Fails with [`Error::Mismatch`] when a band differs in size
    pub fn build(self) -> Result<Dataset> {
        if let Some(band) = self
            .bands
            .iter()
            .find(|band| band.x_size() != self.width || band.y_size() != self.height)
        {
            return Err(Error::Mismatch(format!(
                "Band of {}x{} in a {}x{} dataset",
                band.x_size(),
                band.y_size(),
                self.width,
                self.height
            )));
        }

        let interrupt = Arc::new(AtomicBool::new(false));
        let mut bands = self.bands;
        for band in &mut bands {
            band.set_interrupt_flag(interrupt.clone());
        }
        Ok(Dataset {
            x_size: self.width,
            y_size: self.height,
            bands,
            metadata: self.metadata,
            interrupt,
        })
    }
}
