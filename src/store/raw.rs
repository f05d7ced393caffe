//! Raw, uncompressed block file backed by a memory map
//!
//! Blocks are laid out one after another in row-major block order, each
//! holding `block_bytes` bytes of words in the declared byte order.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use memmap2::MmapMut;
use crate::error::{Error, Result};
use crate::io::{swap_data_type_words, ByteOrder};
use crate::types::DataType;
use super::BlockStore;

/// Geometry of a raw block file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub blocks_per_row: usize,
    pub blocks_per_column: usize,
    pub block_bytes: usize,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
}

impl RawLayout {
    /// Layout for a raster of `width` x `height` pixels in blocks of
    /// `block_width` x `block_height`
    pub fn for_raster(
        width: usize,
        height: usize,
        block_width: usize,
        block_height: usize,
        data_type: DataType,
        byte_order: ByteOrder,
    ) -> Result<Self> {
        if block_width == 0 || block_height == 0 {
            return Err(Error::InvalidBlockSize {
                width: block_width,
                height: block_height,
            });
        }
        Ok(Self {
            blocks_per_row: width.div_ceil(block_width),
            blocks_per_column: height.div_ceil(block_height),
            block_bytes: block_width * block_height * data_type.size(),
            data_type,
            byte_order,
        })
    }

    /// Total file length in bytes
    pub fn file_len(&self) -> usize {
        self.blocks_per_row * self.blocks_per_column * self.block_bytes
    }

    fn block_offset(&self, x: usize, y: usize) -> Result<usize> {
        if x >= self.blocks_per_row || y >= self.blocks_per_column {
            return Err(Error::OutOfBounds(format!(
                "block ({}, {}) outside {} x {} block grid",
                x, y, self.blocks_per_row, self.blocks_per_column
            )));
        }
        Ok((y * self.blocks_per_row + x) * self.block_bytes)
    }
}

/// Block store over a memory-mapped raw file
pub struct RawBlockStore {
    mmap: Mutex<MmapMut>,
    layout: RawLayout,
}

impl RawBlockStore {
    /// Creates (or truncates) a zero-filled file sized for `layout`
    pub fn create<P: AsRef<Path>>(path: P, layout: RawLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(layout.file_len() as u64)?;
        Self::map(file, layout)
    }

    /// Opens an existing file, which must be at least `layout.file_len()` long
    pub fn open<P: AsRef<Path>>(path: P, layout: RawLayout) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < layout.file_len() {
            return Err(Error::Mismatch(format!(
                "raw file holds {} bytes, layout needs {}",
                len,
                layout.file_len()
            )));
        }
        Self::map(file, layout)
    }

    fn map(file: File, layout: RawLayout) -> Result<Self> {
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        // Blocks are visited in request order, not file order
        #[cfg(unix)]
        if !mmap.is_empty() {
            unsafe {
                libc::madvise(
                    mmap.as_ptr() as *mut libc::c_void,
                    mmap.len(),
                    libc::MADV_RANDOM,
                );
            }
        }

        Ok(Self {
            mmap: Mutex::new(mmap),
            layout,
        })
    }

    /// Returns the file layout
    pub fn layout(&self) -> &RawLayout {
        &self.layout
    }

    /// Flushes mapped pages to disk
    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush()?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MmapMut>> {
        self.mmap
            .lock()
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "raw store lock poisoned")))
    }

    fn words_in(&self, len: usize) -> usize {
        len / self.layout.data_type.size()
    }
}

impl BlockStore for RawBlockStore {
    fn read_block(&self, x: usize, y: usize, buf: &mut [u8]) -> Result<()> {
        let offset = self.layout.block_offset(x, y)?;
        let n = buf.len().min(self.layout.block_bytes);
        {
            let mmap = self.lock()?;
            buf[..n].copy_from_slice(&mmap[offset..offset + n]);
        }
        buf[n..].fill(0);
        if self.layout.byte_order.needs_swap() {
            swap_data_type_words(&mut buf[..n], self.layout.data_type, self.words_in(n));
        }
        Ok(())
    }

    fn write_block(&self, x: usize, y: usize, buf: &[u8]) -> Result<()> {
        let offset = self.layout.block_offset(x, y)?;
        let n = buf.len().min(self.layout.block_bytes);
        let mut mmap = self.lock()?;
        let target = &mut mmap[offset..offset + n];
        target.copy_from_slice(&buf[..n]);
        if self.layout.byte_order.needs_swap() {
            swap_data_type_words(target, self.layout.data_type, n / self.layout.data_type.size());
        }
        Ok(())
    }
}
