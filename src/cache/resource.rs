//! Cache slots for the four kinds of cacheable requests
//!
//! Each slot knows how to find, drop, decode and store its value; the orchestrator
//! drives them all through the same state machine.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::memory::{decode_image, CacheContext, Image, Listing};
use crate::webdav::types::decode_listing;
use crate::webdav::{AccountPath, FileEntry, ListingView, ThumbnailPreview, ThumbnailProperties, WebDavError};

/// One cacheable value and the rules for moving it between the network and the cache
pub(crate) trait CachedResource: Send + Sync + 'static {
    /// What the cache holds
    type Value: Send + Sync + 'static;
    /// What the caller receives; compared for duplicate suppression
    type Output: Clone + PartialEq + Send + 'static;

    fn key(&self) -> &AccountPath;

    /// Cached value from memory, or disk where the slot has a disk tier
    fn lookup(&self, cache: &CacheContext) -> Option<Self::Value>;

    /// Remove the cached value from every tier
    fn purge(&self, cache: &CacheContext);

    fn decode(&self, body: &Bytes) -> Option<Self::Value>;

    /// Cache a fetched value. A disk failure does not undo the memory write.
    fn store(&self, cache: &CacheContext, value: &Self::Value, body: &Bytes) -> Result<(), WebDavError>;

    /// Hook run after every successful fetch, cached or not
    fn reconcile(&self, _cache: &CacheContext, _value: &Self::Value) {}

    fn present(&self, value: &Self::Value) -> Self::Output;

    /// Lower-fidelity stand-in offered while the real value is fetched
    fn placeholder(&self, _cache: &CacheContext) -> Option<Self::Output> {
        None
    }
}

fn purge_data_file(cache: &CacheContext, key: &AccountPath) {
    let location = cache.disk.data_path(key);
    if let Err(e) = cache.disk.delete(&location) {
        warn!(local = %location.display(), error = %e, "Failed to purge cached file");
    }
}

/// Raw file bytes
pub(crate) struct DataSlot {
    pub key: AccountPath,
}

impl CachedResource for DataSlot {
    type Value = Bytes;
    type Output = Bytes;

    fn key(&self) -> &AccountPath {
        &self.key
    }

    fn lookup(&self, cache: &CacheContext) -> Option<Bytes> {
        cache.cached_data(&self.key)
    }

    fn purge(&self, cache: &CacheContext) {
        cache.data.remove(&self.key);
        cache.images.remove(&self.key);
        purge_data_file(cache, &self.key);
    }

    fn decode(&self, body: &Bytes) -> Option<Bytes> {
        Some(body.clone())
    }

    fn store(&self, cache: &CacheContext, value: &Bytes, body: &Bytes) -> Result<(), WebDavError> {
        cache.data.set(self.key.clone(), value.clone());
        // Shares the disk file with the decoded image, which may now be stale
        cache.images.remove(&self.key);
        cache.disk.write(body, &cache.disk.data_path(&self.key))?;
        Ok(())
    }

    fn present(&self, value: &Bytes) -> Bytes {
        value.clone()
    }
}

/// Decoded full-size image, optionally previewed by a cached thumbnail
pub(crate) struct ImageSlot {
    pub key: AccountPath,
    pub preview: Option<ThumbnailPreview>,
}

impl CachedResource for ImageSlot {
    type Value = Image;
    type Output = Image;

    fn key(&self) -> &AccountPath {
        &self.key
    }

    fn lookup(&self, cache: &CacheContext) -> Option<Image> {
        cache.cached_image(&self.key)
    }

    fn purge(&self, cache: &CacheContext) {
        cache.images.remove(&self.key);
        cache.data.remove(&self.key);
        purge_data_file(cache, &self.key);
    }

    fn decode(&self, body: &Bytes) -> Option<Image> {
        decode_image(body)
    }

    fn store(&self, cache: &CacheContext, value: &Image, body: &Bytes) -> Result<(), WebDavError> {
        cache.images.set(self.key.clone(), value.clone());
        cache.data.remove(&self.key);
        cache.disk.write(body, &cache.disk.data_path(&self.key))?;
        Ok(())
    }

    fn present(&self, value: &Image) -> Image {
        value.clone()
    }

    fn placeholder(&self, cache: &CacheContext) -> Option<Image> {
        match self.preview? {
            ThumbnailPreview::MemoryOnly => cache
                .cached_value(cache.thumbnails.as_ref(), &self.key)
                .and_then(|set| set.values().next().cloned()),
            ThumbnailPreview::Specific(properties) => cache.cached_thumbnail(&self.key, &properties),
        }
    }
}

/// One server-rendered thumbnail variant
pub(crate) struct ThumbnailSlot {
    pub key: AccountPath,
    pub properties: ThumbnailProperties,
}

impl CachedResource for ThumbnailSlot {
    type Value = Image;
    type Output = Image;

    fn key(&self) -> &AccountPath {
        &self.key
    }

    fn lookup(&self, cache: &CacheContext) -> Option<Image> {
        cache.cached_thumbnail(&self.key, &self.properties)
    }

    fn purge(&self, cache: &CacheContext) {
        cache.remove_thumbnail(&self.key, &self.properties);
        let location = cache.disk.thumbnail_path(&self.key, &self.properties);
        if let Err(e) = cache.disk.delete(&location) {
            warn!(local = %location.display(), error = %e, "Failed to purge cached thumbnail");
        }
    }

    fn decode(&self, body: &Bytes) -> Option<Image> {
        decode_image(body)
    }

    fn store(&self, cache: &CacheContext, value: &Image, body: &Bytes) -> Result<(), WebDavError> {
        cache.set_thumbnail(&self.key, self.properties, value.clone());
        cache
            .disk
            .write(body, &cache.disk.thumbnail_path(&self.key, &self.properties))?;
        Ok(())
    }

    fn present(&self, value: &Image) -> Image {
        value.clone()
    }
}

/// Directory listing, presented through a [`ListingView`]
pub(crate) struct ListingSlot {
    pub key: AccountPath,
    pub view: ListingView,
}

impl CachedResource for ListingSlot {
    type Value = Listing;
    type Output = Vec<FileEntry>;

    fn key(&self) -> &AccountPath {
        &self.key
    }

    fn lookup(&self, cache: &CacheContext) -> Option<Listing> {
        cache.cached_value(cache.listings.as_ref(), &self.key)
    }

    fn purge(&self, cache: &CacheContext) {
        cache.listings.remove(&self.key);
        cache.persist_listing_index_logged();
    }

    fn decode(&self, body: &Bytes) -> Option<Listing> {
        let files = decode_listing(body, &self.key.account.base_path());
        // A real listing always reports at least the directory itself
        if files.is_empty() {
            debug!(path = %self.key.path, "Listing response had no entries");
            return None;
        }
        Some(Arc::new(files))
    }

    fn store(&self, cache: &CacheContext, value: &Listing, _body: &Bytes) -> Result<(), WebDavError> {
        cache.listings.set(self.key.clone(), value.clone());
        cache
            .persist_listing_index()
            .map_err(|e| WebDavError::DiskIo(io::Error::other(format!("{:#}", e))))
    }

    fn reconcile(&self, cache: &CacheContext, value: &Listing) {
        cache.reconcile_listing(&self.key, value);
    }

    fn present(&self, value: &Listing) -> Vec<FileEntry> {
        self.view.apply(value)
    }
}
