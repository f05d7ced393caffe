/// Block cache with lock-by-checkout semantics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use tracing::trace;
use crate::error::{Error, Result};
use crate::store::BlockStore;

/// One cached block in the band's native type
#[derive(Debug)]
struct Block {
    data: Vec<u8>,
    dirty: bool,
    /// Matches the block's live entry in the recency queue
    generation: u64,
}

/// Approximate-LRU cache of the blocks of one band
///
/// A locked block is removed from the map while its [`BlockGuard`] lives, so
/// eviction never sees it. Dirty blocks are written back to the store when
/// evicted or flushed. A failed write-back during eviction is kept and
/// handed out through [`BlockCache::take_flush_error`].
///
/// The recency queue holds `(key, generation)` pairs. Only the pair whose
/// generation matches the cached block is live; older pairs are skipped at
/// eviction and dropped when the queue outgrows the cache.
pub struct BlockCache {
    blocks: DashMap<(usize, usize), Block>,
    lru: SegQueue<((usize, usize), u64)>,
    next_generation: AtomicU64,
    max_blocks: usize,
    block_bytes: usize,
    store: Arc<dyn BlockStore>,
    flush_error: Mutex<Option<Error>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl BlockCache {
    /// Creates a cache for blocks of `block_bytes` bytes
    ///
    /// # Arguments
    /// * `store` - Backing storage for misses and write-back
    /// * `block_bytes` - Size of one full block
    /// * `max_blocks` - Number of unlocked blocks kept before evicting
    pub fn new(store: Arc<dyn BlockStore>, block_bytes: usize, max_blocks: usize) -> Self {
        Self {
            blocks: DashMap::new(),
            lru: SegQueue::new(),
            next_generation: AtomicU64::new(0),
            max_blocks: max_blocks.max(1),
            block_bytes,
            store,
            flush_error: Mutex::new(None),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Locks block (`x`, `y`), loading it from the store on a miss.
    ///
    /// With `just_initialize` a missing block is allocated zero-filled
    /// without reading the store, because the caller overwrites all of it.
    pub fn lock_block(&self, x: usize, y: usize, just_initialize: bool) -> Result<BlockGuard<'_>> {
        let key = (x, y);

        if let Some((_, block)) = self.blocks.remove(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(x, y, "block cache hit");
            return Ok(BlockGuard {
                cache: self,
                key,
                block: Some(block),
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut data = vec![0u8; self.block_bytes];
        if !just_initialize {
            trace!(x, y, "reading block from store");
            self.store.read_block(x, y, &mut data)?;
        }

        Ok(BlockGuard {
            cache: self,
            key,
            block: Some(Block {
                data,
                dirty: false,
                generation: 0,
            }),
        })
    }

    /// Returns a checked-out block, evicting older blocks to make room
    fn release(&self, key: (usize, usize), mut block: Block) {
        while self.blocks.len() >= self.max_blocks {
            let Some((old_key, generation)) = self.lru.pop() else {
                break;
            };
            let evicted = self
                .blocks
                .remove_if(&old_key, |_, old| old.generation == generation);
            if let Some((_, old)) = evicted {
                trace!(x = old_key.0, y = old_key.1, dirty = old.dirty, "evicting block");
                if old.dirty {
                    if let Err(err) = self.store.write_block(old_key.0, old_key.1, &old.data) {
                        self.record_flush_error(err);
                    }
                }
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        block.generation = generation;
        self.blocks.insert(key, block);
        self.lru.push((key, generation));

        if self.lru.len() > self.max_blocks {
            self.compact_queue();
        }
    }

    /// Drops stale queue pairs, keeping live ones in recency order
    fn compact_queue(&self) {
        for _ in 0..self.lru.len() {
            let Some((key, generation)) = self.lru.pop() else {
                break;
            };
            if self.blocks.get(&key).is_some_and(|block| block.generation == generation) {
                self.lru.push((key, generation));
            }
        }
    }

    fn record_flush_error(&self, err: Error) {
        if let Ok(mut slot) = self.flush_error.lock() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    /// Takes the pending write-back error, if any, clearing it
    pub fn take_flush_error(&self) -> Option<Error> {
        self.flush_error.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Whether a write-back error is pending
    pub fn has_flush_error(&self) -> bool {
        self.flush_error.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Writes every dirty cached block to the store.
    ///
    /// All blocks are attempted; the first failure is returned.
    pub fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for mut entry in self.blocks.iter_mut() {
            if !entry.dirty {
                continue;
            }
            let (x, y) = *entry.key();
            match self.store.write_block(x, y, &entry.data) {
                Ok(()) => entry.dirty = false,
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Size in bytes of one block
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Returns the current number of cached (unlocked) blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            block_count: self.blocks.len(),
            dirty_count: self.blocks.iter().filter(|entry| entry.dirty).count(),
            total_bytes: self.blocks.len() * self.block_bytes,
            max_blocks: self.max_blocks,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive hold on one block; dropping it returns the block to the cache
pub struct BlockGuard<'a> {
    cache: &'a BlockCache,
    key: (usize, usize),
    block: Option<Block>,
}

impl BlockGuard<'_> {
    /// Block column
    pub fn x(&self) -> usize {
        self.key.0
    }

    /// Block row
    pub fn y(&self) -> usize {
        self.key.1
    }

    /// Block contents
    pub fn data(&self) -> &[u8] {
        match &self.block {
            Some(block) => &block.data,
            None => &[],
        }
    }

    /// Mutable block contents; call [`BlockGuard::mark_dirty`] after writing
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.block {
            Some(block) => &mut block.data,
            None => &mut [],
        }
    }

    /// Schedules the block for write-back
    pub fn mark_dirty(&mut self) {
        if let Some(block) = &mut self.block {
            block.dirty = true;
        }
    }

    /// Whether the block has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.block.as_ref().is_some_and(|block| block.dirty)
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.cache.release(self.key, block);
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of blocks currently in cache
    pub block_count: usize,
    /// Number of cached blocks awaiting write-back
    pub dirty_count: usize,
    /// Total bytes used by cache
    pub total_bytes: usize,
    /// Maximum number of blocks
    pub max_blocks: usize,
    /// Locks served from the cache
    pub hits: usize,
    /// Locks that had to allocate or read
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemBlockStore, StoreFailure};

    fn cache_with(max_blocks: usize) -> (Arc<MemBlockStore>, BlockCache) {
        let store = Arc::new(MemBlockStore::new());
        let cache = BlockCache::new(store.clone(), 4, max_blocks);
        (store, cache)
    }

    #[test]
    fn test_cache_hit_after_release() {
        let (store, cache) = cache_with(4);
        {
            let mut guard = cache.lock_block(0, 0, false).unwrap();
            guard.data_mut()[0] = 9;
            guard.mark_dirty();
        }
        assert_eq!(cache.len(), 1);

        let guard = cache.lock_block(0, 0, false).unwrap();
        assert_eq!(guard.data()[0], 9);
        assert!(guard.is_dirty());
        assert_eq!(cache.len(), 0);
        drop(guard);

        assert_eq!(store.read_count(), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.dirty_count, 1);
    }

    #[test]
    fn test_just_initialize_skips_store() {
        let (store, cache) = cache_with(4);
        let guard = cache.lock_block(2, 3, true).unwrap();
        assert_eq!(guard.data(), &[0, 0, 0, 0]);
        assert_eq!((guard.x(), guard.y()), (2, 3));
        assert_eq!(store.read_count(), 0);
    }

    #[test]
    fn test_cache_lru_eviction_writes_dirty() {
        let (store, cache) = cache_with(2);
        for x in 0..3 {
            let mut guard = cache.lock_block(x, 0, true).unwrap();
            guard.data_mut().fill(x as u8 + 1);
            guard.mark_dirty();
        }
        assert!(cache.len() <= 2);
        assert_eq!(store.block(0, 0), Some(vec![1, 1, 1, 1]));
    }

    #[test]
    fn test_eviction_failure_is_deferred() {
        let (store, cache) = cache_with(1);
        store.fail_writes_at(0, 0, StoreFailure::Io("disk full".to_string()));
        {
            let mut guard = cache.lock_block(0, 0, true).unwrap();
            guard.mark_dirty();
        }
        drop(cache.lock_block(1, 0, true).unwrap());

        assert!(cache.has_flush_error());
        let err = cache.take_flush_error().unwrap();
        assert!(matches!(err, Error::WriteBlock { x: 0, y: 0, .. }));
        assert!(cache.take_flush_error().is_none());
    }

    #[test]
    fn test_flush_writes_all_dirty() {
        let (store, cache) = cache_with(8);
        for x in 0..3 {
            let mut guard = cache.lock_block(x, 1, true).unwrap();
            guard.data_mut()[1] = 5;
            guard.mark_dirty();
        }
        cache.flush().unwrap();
        assert_eq!(store.write_count(), 3);
        assert_eq!(cache.stats().dirty_count, 0);

        cache.flush().unwrap();
        assert_eq!(store.write_count(), 3);
    }

    #[test]
    fn test_recency_queue_stays_bounded() {
        let (_store, cache) = cache_with(8);
        for _ in 0..100_000 {
            drop(cache.lock_block(0, 0, false).unwrap());
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.lru.len() <= 8);

        for x in 0..20 {
            drop(cache.lock_block(x % 5, 1, true).unwrap());
        }
        assert!(cache.lru.len() <= 8);
    }

    #[test]
    fn test_eviction_skips_recently_used_block() {
        let (store, cache) = cache_with(2);
        drop(cache.lock_block(0, 0, false).unwrap());
        drop(cache.lock_block(1, 0, false).unwrap());
        drop(cache.lock_block(0, 0, false).unwrap());
        drop(cache.lock_block(2, 0, false).unwrap());

        assert!(cache.blocks.contains_key(&(0, 0)));
        assert!(!cache.blocks.contains_key(&(1, 0)));
        assert!(cache.blocks.contains_key(&(2, 0)));

        drop(cache.lock_block(0, 0, false).unwrap());
        assert_eq!(store.read_count(), 3);
    }

    #[test]
    fn test_read_failure_propagates() {
        let (store, cache) = cache_with(2);
        store.fail_reads_at(0, 0, StoreFailure::ReadBlock("bad".to_string()));
        assert!(cache.lock_block(0, 0, false).is_err());
        assert!(cache.is_empty());
    }
}
