//! Block storage backends
//!
//! A [`BlockStore`] persists whole blocks of a band in the band's native
//! data type. Decoding compressed formats lives behind this trait; the crate
//! ships an in-memory store and a raw memory-mapped file store.

pub mod memory;
pub mod raw;

pub use memory::{MemBlockStore, StoreFailure};
pub use raw::{RawBlockStore, RawLayout};

use crate::error::Result;

/// Storage for the blocks of one band, addressed by block column and row
pub trait BlockStore: Send + Sync {
    /// Fills `buf` with the block at (`x`, `y`); `buf` holds one full block
    fn read_block(&self, x: usize, y: usize, buf: &mut [u8]) -> Result<()>;

    /// Persists one full block
    fn write_block(&self, x: usize, y: usize, buf: &[u8]) -> Result<()>;
}
