//! Two-tier cache for listings, file bytes, images and thumbnails
//!
//! Memory tables are bounded moka caches; the disk tier lives under one cache root.
//! Listings are mirrored to a single index file, everything else is stored per file.

pub mod disk;
pub mod index;
pub mod keyed;
pub mod memory;
pub mod options;
pub mod orchestrator;
pub mod reconcile;
pub(crate) mod resource;

pub use disk::{format_byte_count, DiskCacheStore, INDEX_FILE_NAME};
pub use keyed::{KeyedCache, MokaCache};
pub use memory::{CacheCategory, CacheContext, Image, Listing, ThumbnailSet};
pub use options::CacheOptions;
pub use orchestrator::RequestHandle;
