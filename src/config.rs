//! Engine configuration and copy options
//!
//! Settings come from defaults, from `SKYFOREST_*` environment variables or
//! from JSON. Copy options also accept the `NAME=VALUE` pairs used by
//! dataset creation tooling.

use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Default block cache budget in bytes
pub const DEFAULT_CACHE_MAX: usize = 64 * 1024 * 1024;

/// Default number of blocks each band keeps cached
pub const DEFAULT_BLOCK_CACHE_BLOCKS: usize = 256;

/// Engine-wide tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Block cache budget, used to size copy swaths
    pub cache_max_bytes: usize,
    /// Explicit swath size in bytes for whole-raster copies
    pub swath_size: Option<usize>,
    /// Zero-fill heavily decimated reads instead of computing them
    pub no_costly_overview: bool,
    /// Blocks each band cache holds before evicting
    pub block_cache_blocks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_max_bytes: DEFAULT_CACHE_MAX,
            swath_size: None,
            no_costly_overview: false,
            block_cache_blocks: DEFAULT_BLOCK_CACHE_BLOCKS,
        }
    }
}

impl Config {
    /// Reads overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("SKYFOREST_CACHEMAX") {
            config.cache_max_bytes = parse_size("SKYFOREST_CACHEMAX", &value)?;
        }
        if let Some(value) = lookup("SKYFOREST_SWATH_SIZE") {
            config.swath_size = Some(parse_size("SKYFOREST_SWATH_SIZE", &value)?);
        }
        if let Some(value) = lookup("SKYFOREST_NO_COSTLY_OVERVIEW") {
            config.no_costly_overview = parse_bool(&value);
        }

        Ok(config)
    }

    /// Parses a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Parses a byte count, accepting an `MB` suffix
fn parse_size(name: &str, value: &str) -> Result<usize> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (digits, scale) = match upper.strip_suffix("MB") {
        Some(rest) => (rest.trim(), 1024 * 1024),
        None => (trimmed, 1),
    };
    digits
        .parse::<usize>()
        .map(|n| n * scale)
        .map_err(|_| Error::Config(format!("{} is not a valid size: {}", name, value)))
}

/// YES, TRUE, ON and 1 are true; anything else is false
pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "YES" | "TRUE" | "ON" | "1"
    )
}

/// Layout of multi-band output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interleave {
    Pixel,
    Line,
    Band,
}

impl Interleave {
    /// Parses `PIXEL`, `LINE` or `BAND` (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PIXEL" => Some(Interleave::Pixel),
            "LINE" => Some(Interleave::Line),
            "BAND" => Some(Interleave::Band),
            _ => None,
        }
    }

    /// Whether all bands of a tile are copied together
    pub fn is_interleaved(&self) -> bool {
        !matches!(self, Interleave::Band)
    }
}

/// Options of a whole-raster copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    /// Forced layout; when absent the datasets' `INTERLEAVE` metadata decides
    pub interleave: Option<Interleave>,
    /// The destination compresses blocks, so swaths align to whole blocks
    pub compressed: bool,
    /// Skip source tiles whose coverage reports no data
    pub skip_holes: bool,
}

impl CopyOptions {
    /// Builds options from `INTERLEAVE`, `COMPRESSED` and `SKIP_HOLES` pairs.
    /// Unknown keys are ignored.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut options = Self::default();
        for (key, value) in pairs {
            match key.to_ascii_uppercase().as_str() {
                "INTERLEAVE" => {
                    options.interleave = Some(Interleave::parse(value).ok_or_else(|| {
                        Error::Config(format!("Unknown INTERLEAVE value: {}", value))
                    })?);
                }
                "COMPRESSED" => options.compressed = parse_bool(value),
                "SKIP_HOLES" => options.skip_holes = parse_bool(value),
                _ => {}
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_max_bytes, 64 * 1024 * 1024);
        assert_eq!(config.swath_size, None);
        assert!(!config.no_costly_overview);
        assert_eq!(config.block_cache_blocks, 256);
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("SKYFOREST_CACHEMAX", "32MB"),
            ("SKYFOREST_SWATH_SIZE", "2000000"),
            ("SKYFOREST_NO_COSTLY_OVERVIEW", "yes"),
        ]))
        .unwrap();
        assert_eq!(config.cache_max_bytes, 32 * 1024 * 1024);
        assert_eq!(config.swath_size, Some(2_000_000));
        assert!(config.no_costly_overview);
    }

    #[test]
    fn test_from_lookup_rejects_bad_size() {
        let err = Config::from_lookup(lookup(&[("SKYFOREST_SWATH_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json(r#"{"swath_size": 1048576}"#).unwrap();
        assert_eq!(config.swath_size, Some(1_048_576));
        assert_eq!(config.block_cache_blocks, DEFAULT_BLOCK_CACHE_BLOCKS);
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_copy_options_from_pairs() {
        let options = CopyOptions::from_pairs(&[
            ("INTERLEAVE", "pixel"),
            ("COMPRESSED", "TRUE"),
            ("SKIP_HOLES", "NO"),
            ("BLOCKXSIZE", "256"),
        ])
        .unwrap();
        assert_eq!(options.interleave, Some(Interleave::Pixel));
        assert!(options.compressed);
        assert!(!options.skip_holes);

        assert!(CopyOptions::from_pairs(&[("INTERLEAVE", "DIAGONAL")]).is_err());
    }

    #[test]
    fn test_interleave_flags() {
        assert!(Interleave::Pixel.is_interleaved());
        assert!(Interleave::Line.is_interleaved());
        assert!(!Interleave::Band.is_interleaved());
    }
}
