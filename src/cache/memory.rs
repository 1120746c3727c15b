//! Memory cache layer
//!
//! [`CacheContext`] owns the four in-memory tables (listings, raw bytes, decoded images,
//! thumbnail sets) and the disk store behind them. Reads that miss memory but hit disk
//! promote the decoded value into memory so the next read never touches disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use image::DynamicImage;
use tracing::{debug, trace, warn};

use super::disk::DiskCacheStore;
use super::keyed::{KeyedCache, MokaCache};
use crate::config::WebDavConfig;
use crate::webdav::{AccountPath, FileEntry, ThumbnailProperties};

/// Cached directory listing, shared between the table and callers
pub type Listing = Arc<Vec<FileEntry>>;

/// Decoded image, cheap to clone
pub type Image = Arc<DynamicImage>;

/// Every cached thumbnail variant of one path
pub type ThumbnailSet = HashMap<ThumbnailProperties, Image>;

/// One of the four cache tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    Listings,
    Data,
    Images,
    Thumbnails,
}

/// All cache state of one client
pub struct CacheContext {
    pub(crate) listings: Box<dyn KeyedCache<AccountPath, Listing>>,
    pub(crate) data: Box<dyn KeyedCache<AccountPath, Bytes>>,
    pub(crate) images: Box<dyn KeyedCache<AccountPath, Image>>,
    pub(crate) thumbnails: Box<dyn KeyedCache<AccountPath, ThumbnailSet>>,
    pub(crate) disk: DiskCacheStore,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
    /// Held across snapshotting and writing the listing index
    index_lock: Mutex<()>,
}

impl CacheContext {
    /// Context with moka tables sized by `config`
    pub fn new(config: &WebDavConfig, disk: DiskCacheStore) -> Self {
        Self::with_tables(
            Box::new(MokaCache::<AccountPath, Listing>::with_capacity("listing_cache", config.listing_capacity)),
            Box::new(MokaCache::<AccountPath, Bytes>::weighted(
                "data_cache",
                config.data_capacity_bytes,
                |_, data: &Bytes| weight(data.len()),
            )),
            Box::new(MokaCache::<AccountPath, Image>::weighted(
                "image_cache",
                config.image_capacity_bytes,
                |_, image: &Image| weight(image.as_bytes().len()),
            )),
            Box::new(MokaCache::<AccountPath, ThumbnailSet>::with_capacity("thumbnail_cache", config.thumbnail_capacity)),
            disk,
        )
    }

    /// Context over caller-provided tables
    pub fn with_tables(
        listings: Box<dyn KeyedCache<AccountPath, Listing>>,
        data: Box<dyn KeyedCache<AccountPath, Bytes>>,
        images: Box<dyn KeyedCache<AccountPath, Image>>,
        thumbnails: Box<dyn KeyedCache<AccountPath, ThumbnailSet>>,
        disk: DiskCacheStore,
    ) -> Self {
        Self {
            listings,
            data,
            images,
            thumbnails,
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            index_lock: Mutex::new(()),
        }
    }

    pub fn disk(&self) -> &DiskCacheStore {
        &self.disk
    }

    pub(crate) fn lock_index(&self) -> MutexGuard<'_, ()> {
        // The guarded value is empty, so a poisoned lock is still usable
        self.index_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Straight memory lookup
    pub fn cached_value<V>(&self, table: &dyn KeyedCache<AccountPath, V>, key: &AccountPath) -> Option<V> {
        match table.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = %key.path, "Memory cache HIT");
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(path = %key.path, "Memory cache MISS");
                None
            }
        }
    }

    /// Memory lookup falling back to the file at `location`.
    ///
    /// A decoded disk value is written to memory before it is returned.
    /// Disk read failures are logged and treated as a miss.
    pub fn cached_value_or_load_from_disk<V: Clone>(
        &self,
        table: &dyn KeyedCache<AccountPath, V>,
        key: &AccountPath,
        location: &Path,
        decode: impl FnOnce(Bytes) -> Option<V>,
    ) -> Option<V> {
        if let Some(value) = self.cached_value(table, key) {
            return Some(value);
        }

        let value = self.load_from_disk(location).and_then(decode)?;
        table.set(key.clone(), value.clone());
        debug!(path = %key.path, "Promoted disk cache entry to memory");
        Some(value)
    }

    fn load_from_disk(&self, location: &Path) -> Option<Bytes> {
        match self.disk.read(location) {
            Ok(data) => data.map(Bytes::from),
            Err(e) => {
                warn!(local = %location.display(), error = %e, "Failed to read disk cache");
                None
            }
        }
    }

    /// Raw bytes for `key`, from memory or disk
    pub fn cached_data(&self, key: &AccountPath) -> Option<Bytes> {
        let location = self.disk.data_path(key);
        self.cached_value_or_load_from_disk(self.data.as_ref(), key, &location, Some)
    }

    /// Decoded image for `key`, from memory or disk
    pub fn cached_image(&self, key: &AccountPath) -> Option<Image> {
        let location = self.disk.data_path(key);
        self.cached_value_or_load_from_disk(self.images.as_ref(), key, &location, |data| decode_image(&data))
    }

    /// One thumbnail variant, memory only
    pub fn cached_thumbnail_in_memory(&self, key: &AccountPath, properties: &ThumbnailProperties) -> Option<Image> {
        self.cached_value(self.thumbnails.as_ref(), key)
            .and_then(|set| set.get(properties).cloned())
    }

    /// One thumbnail variant, from memory or disk
    pub fn cached_thumbnail(&self, key: &AccountPath, properties: &ThumbnailProperties) -> Option<Image> {
        if let Some(image) = self.cached_thumbnail_in_memory(key, properties) {
            return Some(image);
        }

        let location = self.disk.thumbnail_path(key, properties);
        let image = self.load_from_disk(&location).and_then(|data| decode_image(&data))?;
        self.set_thumbnail(key, *properties, image.clone());
        debug!(path = %key.path, "Promoted disk thumbnail to memory");
        Some(image)
    }

    pub fn set_thumbnail(&self, key: &AccountPath, properties: ThumbnailProperties, image: Image) {
        self.thumbnails.upsert(key.clone(), &mut |current| {
            let mut set = current.unwrap_or_default();
            set.insert(properties, image.clone());
            set
        });
    }

    pub fn remove_thumbnail(&self, key: &AccountPath, properties: &ThumbnailProperties) {
        self.thumbnails.compute(key.clone(), &mut |current| {
            let mut set = current?;
            set.remove(properties);
            (!set.is_empty()).then_some(set)
        });
    }

    /// Empty one memory table, or all of them
    pub fn clear_memory(&self, category: Option<CacheCategory>) {
        let clear = |c: CacheCategory| category.is_none() || category == Some(c);
        if clear(CacheCategory::Listings) {
            self.listings.remove_all();
        }
        if clear(CacheCategory::Data) {
            self.data.remove_all();
        }
        if clear(CacheCategory::Images) {
            self.images.remove_all();
        }
        if clear(CacheCategory::Thumbnails) {
            self.thumbnails.remove_all();
        }
        debug!(category = ?category, "Cleared memory cache");
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            listings = self.listings.keys().len(),
            "Cache metrics"
        );
    }
}

/// Decode image bytes; `None` for anything that is not a supported image
pub(crate) fn decode_image(data: &[u8]) -> Option<Image> {
    image::load_from_memory(data).ok().map(Arc::new)
}

fn weight(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
