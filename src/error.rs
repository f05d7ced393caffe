//! Error types for skyforest-rasterio

use std::io;
use thiserror::Error;

/// Result type for raster I/O operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during raster I/O
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Block dimensions are not usable
    #[error("Invalid block size: {width} x {height}")]
    InvalidBlockSize { width: usize, height: usize },

    /// Source and destination do not describe compatible rasters
    #[error("Mismatch: {0}")]
    Mismatch(String),

    /// Request parameters are inconsistent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// The storage layer failed to produce a block
    #[error("IReadBlock failed at X offset {x}, Y offset {y}: {message}")]
    ReadBlock { x: usize, y: usize, message: String },

    /// The storage layer failed to persist a block
    #[error("IWriteBlock failed at X offset {x}, Y offset {y}: {message}")]
    WriteBlock { x: usize, y: usize, message: String },

    /// A block could not be obtained from the cache
    #[error("GetBlockRef failed at X block offset {x}, Y block offset {y}: {message}")]
    BlockFetch { x: usize, y: usize, message: String },

    /// The owning dataset was asked to stop
    #[error("Operation interrupted")]
    Interrupted,

    /// The progress callback asked to stop
    #[error("{0}")]
    UserCancelled(String),

    /// A dirty block failed to flush during an earlier operation
    #[error("An error occurred while writing a dirty block: {0}")]
    DeferredFlush(Box<Error>),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the distinct interruption status
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    /// True when the error already describes a block-level read failure
    pub fn is_block_read_failure(&self) -> bool {
        match self {
            Error::ReadBlock { .. } => true,
            Error::DeferredFlush(inner) => inner.is_block_read_failure(),
            _ => false,
        }
    }

    /// Wraps a lock failure with the coordinates of the block, unless the
    /// underlying error already reports a block read failure.
    pub(crate) fn block_fetch(x: usize, y: usize, source: Error) -> Error {
        if source.is_block_read_failure() || source.is_interrupted() {
            return source;
        }
        Error::BlockFetch {
            x,
            y,
            message: source.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Config(error.to_string())
    }
}
