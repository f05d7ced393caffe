//! Windowed raster I/O
//!
//! Request types shared by band and dataset I/O, plus the block-aligned
//! engine, overview selection and the resampling path.

pub mod block;
pub mod kernels;
pub mod overview;
pub mod resample;
pub mod warp;

pub use overview::best_overview_level;
pub use resample::MemRasterView;
pub use warp::{PixelWarper, RasterIoTransformer, Warper};

use crate::error::{Error, Result};
use crate::progress::ProgressFn;
use crate::types::{DataType, ResampleAlg, RwFlag};

/// Integer pixel window of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub x_size: usize,
    pub y_size: usize,
}

impl Window {
    pub fn new(x_off: usize, y_off: usize, x_size: usize, y_size: usize) -> Self {
        Self {
            x_off,
            y_off,
            x_size,
            y_size,
        }
    }

    /// Whether the window lies inside a raster of `width` x `height`
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.x_off.checked_add(self.x_size).is_some_and(|end| end <= width)
            && self.y_off.checked_add(self.y_size).is_some_and(|end| end <= height)
    }
}

/// Sub-pixel window carried alongside an integer request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatWindow {
    pub x_off: f64,
    pub y_off: f64,
    pub x_size: f64,
    pub y_size: f64,
}

impl FloatWindow {
    pub fn new(x_off: f64, y_off: f64, x_size: f64, y_size: f64) -> Self {
        Self {
            x_off,
            y_off,
            x_size,
            y_size,
        }
    }

    /// True when this window is exactly `window`
    pub fn is_integer_aligned(&self, window: &Window) -> bool {
        self.x_off == window.x_off as f64
            && self.y_off == window.y_off as f64
            && self.x_size == window.x_size as f64
            && self.y_size == window.y_size as f64
    }

    fn is_valid(&self) -> bool {
        [self.x_off, self.y_off, self.x_size, self.y_size]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

impl From<Window> for FloatWindow {
    fn from(window: Window) -> Self {
        Self::new(
            window.x_off as f64,
            window.y_off as f64,
            window.x_size as f64,
            window.y_size as f64,
        )
    }
}

/// Geometry of a caller buffer
///
/// Spacings are in bytes; 0 means the natural packed spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub x_size: usize,
    pub y_size: usize,
    pub data_type: DataType,
    pub pixel_space: usize,
    pub line_space: usize,
}

impl BufferLayout {
    /// Packed buffer of `x_size` x `y_size` words
    pub fn packed(x_size: usize, y_size: usize, data_type: DataType) -> Self {
        Self {
            x_size,
            y_size,
            data_type,
            pixel_space: 0,
            line_space: 0,
        }
    }

    /// Buffer with explicit pixel and line spacing
    pub fn with_spacing(
        x_size: usize,
        y_size: usize,
        data_type: DataType,
        pixel_space: usize,
        line_space: usize,
    ) -> Self {
        Self {
            x_size,
            y_size,
            data_type,
            pixel_space,
            line_space,
        }
    }

    /// Replaces zero spacings with the packed defaults
    pub fn resolve(&self) -> Self {
        let pixel_space = if self.pixel_space == 0 {
            self.data_type.size()
        } else {
            self.pixel_space
        };
        let line_space = if self.line_space == 0 {
            pixel_space * self.x_size
        } else {
            self.line_space
        };
        Self {
            pixel_space,
            line_space,
            ..*self
        }
    }

    /// Minimum buffer length in bytes
    pub fn required_len(&self) -> usize {
        if self.x_size == 0 || self.y_size == 0 {
            return 0;
        }
        let resolved = self.resolve();
        (resolved.y_size - 1) * resolved.line_space
            + (resolved.x_size - 1) * resolved.pixel_space
            + resolved.data_type.size()
    }

    /// Whether words and lines are contiguous
    pub fn is_packed(&self) -> bool {
        let resolved = self.resolve();
        resolved.pixel_space == resolved.data_type.size()
            && resolved.line_space == resolved.pixel_space * resolved.x_size
    }

    /// Byte offset of buffer pixel (`x`, `y`)
    #[inline]
    pub(crate) fn offset(&self, x: usize, y: usize) -> usize {
        y * self.line_space + x * self.pixel_space
    }
}

/// Caller buffer of a request; the variant selects the direction
pub enum IoBuffer<'a> {
    /// Raster pixels are copied into the buffer
    Read(&'a mut [u8]),
    /// Buffer pixels are copied into the raster
    Write(&'a [u8]),
}

impl<'a> IoBuffer<'a> {
    pub fn rw(&self) -> RwFlag {
        match self {
            IoBuffer::Read(_) => RwFlag::Read,
            IoBuffer::Write(_) => RwFlag::Write,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IoBuffer::Read(buf) => buf.len(),
            IoBuffer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shorter-lived view of the same buffer
    pub fn reborrow(&mut self) -> IoBuffer<'_> {
        match self {
            IoBuffer::Read(buf) => IoBuffer::Read(&mut **buf),
            IoBuffer::Write(buf) => IoBuffer::Write(&**buf),
        }
    }

    /// View starting `offset` bytes in
    pub fn offset(&mut self, offset: usize) -> IoBuffer<'_> {
        match self {
            IoBuffer::Read(buf) => IoBuffer::Read(&mut buf[offset..]),
            IoBuffer::Write(buf) => IoBuffer::Write(&buf[offset..]),
        }
    }
}

/// Optional request parameters
#[derive(Clone, Copy, Default)]
pub struct ExtraArg<'a> {
    pub resample_alg: ResampleAlg,
    pub progress: Option<ProgressFn<'a>>,
    pub floating: Option<FloatWindow>,
}

impl<'a> ExtraArg<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of `other` that a nested request may modify
    pub fn copy_from(other: &ExtraArg<'a>) -> Self {
        Self {
            resample_alg: other.resample_alg,
            progress: other.progress,
            floating: other.floating,
        }
    }

    pub fn with_resample_alg(mut self, alg: ResampleAlg) -> Self {
        self.resample_alg = alg;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_floating(mut self, window: FloatWindow) -> Self {
        self.floating = Some(window);
        self
    }

    /// Window to sample from: the floating window when set, else `window`
    pub(crate) fn source_window(&self, window: &Window) -> FloatWindow {
        self.floating.unwrap_or_else(|| FloatWindow::from(*window))
    }
}

/// Checks a request against a raster of `width` x `height`
pub(crate) fn validate_request(
    width: usize,
    height: usize,
    window: &Window,
    buf: &IoBuffer<'_>,
    layout: &BufferLayout,
    extra: &ExtraArg<'_>,
) -> Result<()> {
    if window.x_size == 0 || window.y_size == 0 {
        return Err(Error::InvalidArgument(format!(
            "Illegal window size {}x{}",
            window.x_size, window.y_size
        )));
    }
    if layout.x_size == 0 || layout.y_size == 0 {
        return Err(Error::InvalidArgument(format!(
            "Illegal buffer size {}x{}",
            layout.x_size, layout.y_size
        )));
    }
    if !window.fits(width, height) {
        return Err(Error::OutOfBounds(format!(
            "Access window out of range in RasterIO(). Requested ({},{}) of size {}x{} on raster of {}x{}.",
            window.x_off, window.y_off, window.x_size, window.y_size, width, height
        )));
    }
    if let Some(floating) = &extra.floating {
        if !floating.is_valid()
            || floating.x_off + floating.x_size > width as f64 + 1e-10
            || floating.y_off + floating.y_size > height as f64 + 1e-10
        {
            return Err(Error::InvalidArgument(format!(
                "Invalid floating point window {:?}",
                floating
            )));
        }
    }
    if buf.len() < layout.required_len() {
        return Err(Error::InvalidArgument(format!(
            "Buffer of {} bytes too small for {}x{} {} words (needs {})",
            buf.len(),
            layout.x_size,
            layout.y_size,
            layout.data_type.name(),
            layout.required_len()
        )));
    }
    Ok(())
}
