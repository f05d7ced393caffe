//! skyforest-rasterio - Block-cached raster I/O for Rust
//!
//! skyforest-rasterio moves pixel windows between caller buffers and
//! block-organized raster bands. It converts between pixel types, resamples
//! on the fly, picks overviews for downsampled reads and copies whole rasters
//! in swaths.
//!
//! # Examples
//!
//! ## Writing and Reading a Window
//!
//! ```
//! use skyforest_rasterio::{DataType, RasterBand, Window};
//!
//! let band = RasterBand::builder(64, 64, DataType::U16)
//!     .block_size(16, 16)
//!     .build();
//!
//! let data: Vec<u16> = (0..64 * 64).map(|v| v as u16).collect();
//! band.write_slice(Window::new(0, 0, 64, 64), &data, 64, 64)?;
//!
//! // Every other pixel of the top-left quarter, as f32
//! let half: Vec<f32> = band.read_vec(Window::new(0, 0, 32, 32), 16, 16, None)?;
//! assert_eq!(half.len(), 256);
//! # Ok::<(), skyforest_rasterio::Error>(())
//! ```
//!
//! ## Resampled Reads
//!
//! ```
//! use skyforest_rasterio::{DataType, ExtraArg, RasterBand, ResampleAlg, Window};
//!
//! let band = RasterBand::builder(8, 8, DataType::F32).build();
//! band.write_slice(Window::new(0, 0, 8, 8), &[2.0f32; 64], 8, 8)?;
//!
//! let extra = ExtraArg::new().with_resample_alg(ResampleAlg::Average);
//! let out: Vec<f32> = band.read_vec(Window::new(0, 0, 8, 8), 2, 2, Some(&extra))?;
//! assert_eq!(out, vec![2.0; 4]);
//! # Ok::<(), skyforest_rasterio::Error>(())
//! ```

pub mod band;
pub mod cache;
pub mod config;
pub mod convert;
pub mod copy;
pub mod dataset;
pub mod error;
pub mod io;
pub mod progress;
pub mod rasterio;
pub mod store;
pub mod types;

pub use band::{BandBuilder, MaskSource, RasterBand};
pub use cache::{BlockCache, BlockGuard, CacheStats};
pub use config::{Config, CopyOptions, Interleave};
pub use convert::{convert_word, copy_bits, copy_words, Word};
pub use copy::{copy_band_raster, copy_many, copy_whole_raster, swath_size, Swath};
pub use dataset::{Dataset, DatasetBuilder};
pub use error::{Error, Result};
pub use io::{swap_words, ByteOrder};
pub use progress::{term_progress, ProgressFn};
pub use rasterio::{
    best_overview_level, BufferLayout, ExtraArg, FloatWindow, IoBuffer, MemRasterView,
    PixelWarper, RasterIoTransformer, Warper, Window,
};
pub use store::{BlockStore, MemBlockStore, RawBlockStore, RawLayout};
pub use types::{DataType, ResampleAlg, RwFlag};
