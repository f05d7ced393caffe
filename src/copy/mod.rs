//! Whole-raster copy orchestration

pub mod parallel;
pub mod swath;
pub mod whole;

pub use parallel::copy_many;
pub use swath::{swath_size, Swath};
pub use whole::{copy_band_raster, copy_whole_raster};
