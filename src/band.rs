//! Raster bands
//!
//! A band is a 2-D grid of one data type, stored as blocks behind a
//! [`BlockCache`]. Bands optionally carry overviews, a mask, a nodata value,
//! a data coverage predicate and a warper for complex resampling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use bytemuck::Zeroable;
use crate::cache::BlockCache;
use crate::config::Config;
use crate::convert::Word;
use crate::error::Result;
use crate::rasterio::{validate_request, BufferLayout, ExtraArg, IoBuffer, Warper, Window};
use crate::store::{BlockStore, MemBlockStore};
use crate::types::DataType;

/// The band cannot tell whether a region holds data
pub const COVERAGE_UNIMPLEMENTED: u32 = 0x01;
/// The region holds at least some data
pub const COVERAGE_DATA: u32 = 0x02;
/// The region holds at least some empty area
pub const COVERAGE_EMPTY: u32 = 0x04;

/// Coverage predicate: `(x_off, y_off, x_size, y_size) -> COVERAGE_*` bits
pub type CoverageFn = Arc<dyn Fn(usize, usize, usize, usize) -> u32 + Send + Sync>;

/// Where a band's validity mask comes from
pub enum MaskSource {
    /// Every pixel is valid
    AllValid,
    /// Pixels equal to the nodata value are invalid
    Nodata,
    /// An explicit Byte band; nonzero means valid
    Band(Box<RasterBand>),
}

/// A single raster band
pub struct RasterBand {
    pub(crate) x_size: usize,
    pub(crate) y_size: usize,
    pub(crate) block_x_size: usize,
    pub(crate) block_y_size: usize,
    pub(crate) data_type: DataType,
    pub(crate) cache: BlockCache,
    pub(crate) overviews: Vec<RasterBand>,
    pub(crate) mask: MaskSource,
    pub(crate) nodata: Option<f64>,
    pub(crate) metadata: HashMap<String, String>,
    pub(crate) coverage: Option<CoverageFn>,
    pub(crate) warper: Option<Arc<dyn Warper>>,
    pub(crate) interrupt: Arc<AtomicBool>,
    pub(crate) config: Config,
}

impl RasterBand {
    /// Starts building a `width` x `height` band of `data_type`
    pub fn builder(width: usize, height: usize, data_type: DataType) -> BandBuilder {
        BandBuilder::new(width, height, data_type)
    }

    /// Raster width in pixels
    pub fn x_size(&self) -> usize {
        self.x_size
    }

    /// Raster height in pixels
    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Natural block size as (width, height)
    pub fn block_size(&self) -> (usize, usize) {
        (self.block_x_size, self.block_y_size)
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn mask(&self) -> &MaskSource {
        &self.mask
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    pub fn overview(&self, index: usize) -> Option<&RasterBand> {
        self.overviews.get(index)
    }

    /// Looks up a metadata item (keys are case-insensitive)
    pub fn metadata_item(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn warper(&self) -> Option<&Arc<dyn Warper>> {
        self.warper.as_ref()
    }

    /// Whether the band's blocks are full-width strips
    pub fn is_stripped(&self) -> bool {
        self.block_x_size == self.x_size
    }

    /// Coverage bits for a region; bands without a predicate report
    /// `COVERAGE_UNIMPLEMENTED | COVERAGE_DATA`
    pub fn data_coverage_status(&self, x_off: usize, y_off: usize, x_size: usize, y_size: usize) -> u32 {
        match &self.coverage {
            Some(coverage) => coverage(x_off, y_off, x_size, y_size),
            None => COVERAGE_UNIMPLEMENTED | COVERAGE_DATA,
        }
    }

    /// Whether the owning dataset asked pending I/O to stop
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Shares `flag` with this band, its overviews and its mask band
    pub(crate) fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        for overview in &mut self.overviews {
            overview.set_interrupt_flag(flag.clone());
        }
        if let MaskSource::Band(mask) = &mut self.mask {
            mask.set_interrupt_flag(flag.clone());
        }
        self.interrupt = flag;
    }

    /// Reads or writes a window through a buffer of arbitrary layout.
    ///
    /// The request is validated, zero spacings are resolved, and the work
    /// is handed to the block-aligned engine.
    pub fn raster_io(
        &self,
        window: Window,
        buf: IoBuffer<'_>,
        layout: &BufferLayout,
        extra: Option<&ExtraArg<'_>>,
    ) -> Result<()> {
        let extra = extra.copied().unwrap_or_default();
        validate_request(self.x_size, self.y_size, &window, &buf, layout, &extra)?;
        self.i_raster_io(&window, buf, &layout.resolve(), &extra)
    }

    /// Reads `window` into `buf` laid out as `layout`
    pub fn read(&self, window: Window, buf: &mut [u8], layout: &BufferLayout) -> Result<()> {
        self.raster_io(window, IoBuffer::Read(buf), layout, None)
    }

    /// Writes `buf` laid out as `layout` into `window`
    pub fn write(&self, window: Window, buf: &[u8], layout: &BufferLayout) -> Result<()> {
        self.raster_io(window, IoBuffer::Write(buf), layout, None)
    }

    /// Reads `window` into a packed vector of `buf_x` x `buf_y` words
    pub fn read_vec<T: Word>(
        &self,
        window: Window,
        buf_x: usize,
        buf_y: usize,
        extra: Option<&ExtraArg<'_>>,
    ) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); buf_x * buf_y];
        let layout = BufferLayout::packed(buf_x, buf_y, T::TYPE);
        self.raster_io(
            window,
            IoBuffer::Read(bytemuck::cast_slice_mut(&mut out)),
            &layout,
            extra,
        )?;
        Ok(out)
    }

    /// Writes packed words of `buf_x` x `buf_y` into `window`
    pub fn write_slice<T: Word>(&self, window: Window, data: &[T], buf_x: usize, buf_y: usize) -> Result<()> {
        let layout = BufferLayout::packed(buf_x, buf_y, T::TYPE);
        self.raster_io(window, IoBuffer::Write(bytemuck::cast_slice(data)), &layout, None)
    }

    /// Writes every dirty block of this band, its overviews and its mask band
    pub fn flush(&self) -> Result<()> {
        self.cache.flush()?;
        for overview in &self.overviews {
            overview.flush()?;
        }
        if let MaskSource::Band(mask) = &self.mask {
            mask.flush()?;
        }
        Ok(())
    }
}

/// Builder for [`RasterBand`]
pub struct BandBuilder {
    width: usize,
    height: usize,
    data_type: DataType,
    block_width: usize,
    block_height: usize,
    store: Option<Arc<dyn BlockStore>>,
    nodata: Option<f64>,
    metadata: HashMap<String, String>,
    overviews: Vec<RasterBand>,
    mask_band: Option<RasterBand>,
    coverage: Option<CoverageFn>,
    warper: Option<Arc<dyn Warper>>,
    config: Config,
}

impl BandBuilder {
    fn new(width: usize, height: usize, data_type: DataType) -> Self {
        Self {
            width,
            height,
            data_type,
            block_width: width,
            block_height: 1,
            store: None,
            nodata: None,
            metadata: HashMap::new(),
            overviews: Vec::new(),
            mask_band: None,
            coverage: None,
            warper: None,
            config: Config::default(),
        }
    }

    /// Block dimensions; defaults to one-line strips
    pub fn block_size(mut self, width: usize, height: usize) -> Self {
        self.block_width = width;
        self.block_height = height;
        self
    }

    /// Backing store; defaults to an empty [`MemBlockStore`]
    pub fn store(mut self, store: Arc<dyn BlockStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn nodata(mut self, value: f64) -> Self {
        self.nodata = Some(value);
        self
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds a reduced-resolution version of the band
    pub fn overview(mut self, overview: RasterBand) -> Self {
        self.overviews.push(overview);
        self
    }

    /// Uses an explicit Byte mask band
    pub fn mask_band(mut self, mask: RasterBand) -> Self {
        self.mask_band = Some(mask);
        self
    }

    pub fn coverage(mut self, coverage: CoverageFn) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn warper(mut self, warper: Arc<dyn Warper>) -> Self {
        self.warper = Some(warper);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RasterBand {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemBlockStore::new()) as Arc<dyn BlockStore>);
        let block_bytes = self.block_width * self.block_height * self.data_type.size();
        let cache = BlockCache::new(store, block_bytes, self.config.block_cache_blocks);

        let mask = match (self.mask_band, self.nodata) {
            (Some(band), _) => MaskSource::Band(Box::new(band)),
            (None, Some(_)) => MaskSource::Nodata,
            (None, None) => MaskSource::AllValid,
        };

        let interrupt = Arc::new(AtomicBool::new(false));
        let mut band = RasterBand {
            x_size: self.width,
            y_size: self.height,
            block_x_size: self.block_width,
            block_y_size: self.block_height,
            data_type: self.data_type,
            cache,
            overviews: self.overviews,
            mask,
            nodata: self.nodata,
            metadata: self.metadata,
            coverage: self.coverage,
            warper: self.warper,
            interrupt: interrupt.clone(),
            config: self.config,
        };
        band.set_interrupt_flag(interrupt);
        band
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let band = RasterBand::builder(10, 4, DataType::U16).build();
        assert_eq!(band.block_size(), (10, 1));
        assert!(band.is_stripped());
        assert!(matches!(band.mask(), MaskSource::AllValid));
        assert_eq!(band.cache().block_bytes(), 20);
        assert_eq!(
            band.data_coverage_status(0, 0, 10, 4),
            COVERAGE_UNIMPLEMENTED | COVERAGE_DATA
        );
    }

    #[test]
    fn test_nodata_mask_and_metadata() {
        let band = RasterBand::builder(4, 4, DataType::F32)
            .nodata(-9999.0)
            .metadata("RESAMPLING", "AVERAGE_BIT2GRAYSCALE")
            .build();
        assert!(matches!(band.mask(), MaskSource::Nodata));
        assert_eq!(band.metadata_item("resampling"), Some("AVERAGE_BIT2GRAYSCALE"));
        assert_eq!(band.metadata_item("COMPRESSION"), None);
    }

    #[test]
    fn test_interrupt_flag_reaches_overviews() {
        let overview = RasterBand::builder(2, 2, DataType::U8).build();
        let mut band = RasterBand::builder(4, 4, DataType::U8).overview(overview).build();
        let flag = Arc::new(AtomicBool::new(false));
        band.set_interrupt_flag(flag.clone());
        flag.store(true, Ordering::Relaxed);
        assert!(band.is_interrupted());
        assert!(band.overview(0).unwrap().is_interrupted());
    }

    #[test]
    fn test_coverage_predicate() {
        let band = RasterBand::builder(8, 8, DataType::U8)
            .coverage(Arc::new(|x: usize, _: usize, _: usize, _: usize| {
                if x < 4 {
                    COVERAGE_DATA
                } else {
                    COVERAGE_EMPTY
                }
            }))
            .build();
        assert_eq!(band.data_coverage_status(0, 0, 4, 4), COVERAGE_DATA);
        assert_eq!(band.data_coverage_status(4, 0, 4, 4), COVERAGE_EMPTY);
    }
}
