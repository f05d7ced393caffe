//! I/O utilities for skyforest-rasterio
//!
//! Provides byte order handling for raw pixel storage.

pub mod byte_order;

pub use byte_order::{swap_data_type_words, swap_words, swap_words_ex, ByteOrder};
