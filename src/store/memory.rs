//! In-memory block store

use std::sync::atomic::{AtomicUsize, Ordering};
use dashmap::DashMap;
use crate::error::{Error, Result};
use super::BlockStore;

/// Failure a [`MemBlockStore`] reports for one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFailure {
    /// A plain I/O failure, which the cache wraps with the block position
    Io(String),
    /// A failure that already names the block
    ReadBlock(String),
}

impl StoreFailure {
    fn to_error(&self, x: usize, y: usize) -> Error {
        match self {
            StoreFailure::Io(message) => {
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, message.clone()))
            }
            StoreFailure::ReadBlock(message) => Error::ReadBlock {
                x,
                y,
                message: message.clone(),
            },
        }
    }
}

/// Keeps blocks in a concurrent map; blocks never written read as zeros
pub struct MemBlockStore {
    blocks: DashMap<(usize, usize), Vec<u8>>,
    read_failures: DashMap<(usize, usize), StoreFailure>,
    write_failures: DashMap<(usize, usize), StoreFailure>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemBlockStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            read_failures: DashMap::new(),
            write_failures: DashMap::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes every read of block (`x`, `y`) fail
    pub fn fail_reads_at(&self, x: usize, y: usize, failure: StoreFailure) {
        self.read_failures.insert((x, y), failure);
    }

    /// Makes every write of block (`x`, `y`) fail
    pub fn fail_writes_at(&self, x: usize, y: usize, failure: StoreFailure) {
        self.write_failures.insert((x, y), failure);
    }

    /// Removes all injected failures
    pub fn clear_failures(&self) {
        self.read_failures.clear();
        self.write_failures.clear();
    }

    /// Returns a copy of a stored block
    pub fn block(&self, x: usize, y: usize) -> Option<Vec<u8>> {
        self.blocks.get(&(x, y)).map(|entry| entry.value().clone())
    }

    /// Number of successful and failed block reads
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful block writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemBlockStore {
    fn read_block(&self, x: usize, y: usize, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(failure) = self.read_failures.get(&(x, y)) {
            return Err(failure.to_error(x, y));
        }
        match self.blocks.get(&(x, y)) {
            Some(block) => {
                let n = buf.len().min(block.len());
                buf[..n].copy_from_slice(&block[..n]);
                buf[n..].fill(0);
            }
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, x: usize, y: usize, buf: &[u8]) -> Result<()> {
        if let Some(failure) = self.write_failures.get(&(x, y)) {
            return Err(match failure.value() {
                StoreFailure::Io(message) => Error::WriteBlock {
                    x,
                    y,
                    message: message.clone(),
                },
                other => other.to_error(x, y),
            });
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.blocks.insert((x, y), buf.to_vec());
        Ok(())
    }
}
