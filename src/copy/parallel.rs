//! Concurrent copies of independent dataset pairs

use rayon::prelude::*;
use tracing::debug;
use crate::config::{Config, CopyOptions};
use crate::copy::whole::copy_whole_raster;
use crate::dataset::Dataset;
use crate::error::Result;

/// Copies each `(src, dst)` pair on the rayon pool.
///
/// Every pair runs the single-threaded [`copy_whole_raster`]; pairs must not
/// share destination datasets. All pairs are attempted and the first
/// failure, in pair order, is returned.
pub fn copy_many(pairs: &[(&Dataset, &Dataset)], options: &CopyOptions, config: &Config) -> Result<()> {
    debug!(pairs = pairs.len(), "parallel whole-raster copy");
    let results: Vec<Result<()>> = pairs
        .par_iter()
        .map(|(src, dst)| copy_whole_raster(src, dst, options, config, None))
        .collect();
    results.into_iter().collect()
}
