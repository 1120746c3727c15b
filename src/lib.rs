//! WebDAV / Nextcloud client with a two-tier cache
//!
//! Directory listings, file bytes, decoded images and server-rendered thumbnails are
//! cached in memory and on disk. Every cacheable request takes [`CacheOptions`]
//! deciding whether a cached value is returned, whether the network is asked anyway,
//! and whether the result is kept.
//!
//! ```no_run
//! use webdav_client::{CacheOptions, ListingView, SimpleAccount, WebDav, WebDavConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let webdav = WebDav::new(WebDavConfig::from_env())?;
//! let account = SimpleAccount::new("alice", "cloud.example.com/remote.php/dav/files/alice");
//!
//! webdav.list_files(
//!     "Photos",
//!     &account,
//!     "app-password",
//!     ListingView::default(),
//!     CacheOptions::REQUEST_EVEN_IF_CACHED,
//!     |files, error| println!("{:?} {:?}", files.map(|f| f.len()), error),
//! );
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod webdav;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheCategory, CacheOptions, RequestHandle};
pub use config::WebDavConfig;
pub use webdav::{
    Account, AccountIdentity, AccountPath, ContentMode, FileEntry, ListingView, OcsTheme, SimpleAccount,
    ThumbnailPreview, ThumbnailProperties, WebDav, WebDavError,
};
