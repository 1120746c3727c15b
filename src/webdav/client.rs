//! WebDAV client facade
//!
//! [`WebDav`] owns the cache and the transport. Cacheable operations (listings,
//! downloads, thumbnails) take a [`CacheOptions`] and a completion that may be called
//! twice: once synchronously with a cached value and once more from a background task
//! with the fetched value, if it differs. Everything else completes exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::account::{normalize_account, Account, AccountIdentity, AccountPath};
use super::errors::WebDavError;
use super::ocs::{OcsTheme, CAPABILITIES_PATH};
use super::transport::{basic_auth_header, DavRequest, HttpMethod, ReqwestTransport, Transport, TransportResponse};
use super::types::{FileEntry, ListingView, ThumbnailPreview, ThumbnailProperties, PROPFIND_BODY};
use crate::cache::disk::{format_byte_count, is_thumbnail_file_name, DiskCacheStore};
use crate::cache::memory::{CacheCategory, CacheContext, Image, ThumbnailSet};
use crate::cache::options::CacheOptions;
use crate::cache::orchestrator::{Orchestrator, RequestHandle};
use crate::cache::resource::{DataSlot, ImageSlot, ListingSlot, ThumbnailSlot};
use crate::config::WebDavConfig;

/// WebDAV client with a two-tier cache
pub struct WebDav {
    cache: Arc<CacheContext>,
    transport: Arc<dyn Transport>,
    runtime: Handle,
}

impl WebDav {
    /// Client using reqwest. Must be called from within a tokio runtime.
    pub fn new(config: WebDavConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Client over any [`Transport`]. Must be called from within a tokio runtime.
    pub fn with_transport(config: WebDavConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let runtime = Handle::try_current().context("WebDav client requires a tokio runtime")?;
        let disk = DiskCacheStore::new(config.cache_root.clone())?;
        let cache = Arc::new(CacheContext::new(&config, disk));

        if let Err(e) = cache.load_listing_index() {
            warn!(error = %e, "Ignoring unreadable listing index");
        }

        info!(cache_root = %config.cache_root.display(), "WebDAV client ready");
        Ok(Self {
            cache,
            transport,
            runtime,
        })
    }

    /// The cache shared by every request of this client
    pub fn cache(&self) -> &CacheContext {
        &self.cache
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator {
            cache: &self.cache,
            transport: &self.transport,
            runtime: &self.runtime,
        }
    }

    fn spawn_request<F>(&self, request: DavRequest, settle: F) -> RequestHandle
    where
        F: FnOnce(TransportResponse) + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        RequestHandle::new(self.runtime.spawn(async move {
            let response = transport.perform(request).await;
            settle(response);
        }))
    }

    /// List the directory at `path`.
    ///
    /// The fetched listing prunes cached listings and files below `path` that the
    /// server no longer reports.
    pub fn list_files<A, F>(
        &self,
        path: &str,
        account: &A,
        password: &str,
        view: ListingView,
        options: CacheOptions,
        mut completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnMut(Option<Vec<FileEntry>>, Option<WebDavError>) + Send + 'static,
    {
        let identity = resolve_account(account, &mut completion)?;
        let request = authorized_request(&identity, password, HttpMethod::Propfind, identity.url_for_path(path))
            .map(|request| {
                request
                    .header("Depth", "1")
                    .header("Content-Type", "application/xml; charset=utf-8")
                    .body(PROPFIND_BODY)
            });
        let key = AccountPath::new(identity, path);

        debug!(path = %key.path, options = options.bits(), "list_files");
        self.orchestrator()
            .run(ListingSlot { key, view }, request, options, completion)
    }

    /// Download the raw bytes of the file at `path`
    pub fn download_data<A, F>(
        &self,
        path: &str,
        account: &A,
        password: &str,
        options: CacheOptions,
        mut completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnMut(Option<Bytes>, Option<WebDavError>) + Send + 'static,
    {
        let identity = resolve_account(account, &mut completion)?;
        let request = authorized_request(&identity, password, HttpMethod::Get, identity.url_for_path(path));
        let key = AccountPath::new(identity, path);

        debug!(path = %key.path, options = options.bits(), "download_data");
        self.orchestrator().run(DataSlot { key }, request, options, completion)
    }

    /// Download and decode the image at `path`.
    ///
    /// With a `preview`, a cached thumbnail is delivered first together with
    /// [`WebDavError::Placeholder`] when the full image is not cached yet.
    pub fn download_image<A, F>(
        &self,
        path: &str,
        account: &A,
        password: &str,
        preview: Option<ThumbnailPreview>,
        options: CacheOptions,
        mut completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnMut(Option<Image>, Option<WebDavError>) + Send + 'static,
    {
        let identity = resolve_account(account, &mut completion)?;
        let request = authorized_request(&identity, password, HttpMethod::Get, identity.url_for_path(path));
        let key = AccountPath::new(identity, path);

        debug!(path = %key.path, options = options.bits(), "download_image");
        self.orchestrator()
            .run(ImageSlot { key, preview }, request, options, completion)
    }

    /// Download a server-rendered thumbnail of the image at `path`.
    ///
    /// Needs a Nextcloud base URL; other servers get [`WebDavError::Unsupported`]
    /// unless the thumbnail is already cached.
    pub fn download_thumbnail<A, F>(
        &self,
        path: &str,
        account: &A,
        password: &str,
        properties: ThumbnailProperties,
        options: CacheOptions,
        mut completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnMut(Option<Image>, Option<WebDavError>) + Send + 'static,
    {
        let identity = resolve_account(account, &mut completion)?;
        let request = preview_url(&identity, path, &properties)
            .ok_or(WebDavError::Unsupported)
            .and_then(|url| authorized_request(&identity, password, HttpMethod::Get, url));
        let key = AccountPath::new(identity, path);

        debug!(path = %key.path, query = %properties.query(), "download_thumbnail");
        self.orchestrator()
            .run(ThumbnailSlot { key, properties }, request, options, completion)
    }

    /// Upload `data` to `path`, replacing any existing file
    pub fn upload<A, F>(
        &self,
        data: impl Into<Bytes>,
        path: &str,
        account: &A,
        password: &str,
        completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        let data = data.into();
        debug!(path = %path, size = data.len(), "upload");
        self.simple_request(path, account, password, HttpMethod::Put, completion, |_, request| {
            request.body(data)
        })
    }

    pub fn delete_file<A, F>(&self, path: &str, account: &A, password: &str, completion: F) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        debug!(path = %path, "delete_file");
        self.simple_request(path, account, password, HttpMethod::Delete, completion, |_, request| request)
    }

    pub fn create_folder<A, F>(&self, path: &str, account: &A, password: &str, completion: F) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        debug!(path = %path, "create_folder");
        self.simple_request(path, account, password, HttpMethod::Mkcol, completion, |_, request| request)
    }

    /// Move `from` to `to`. Without `overwrite` an existing destination makes the request fail.
    pub fn move_file<A, F>(
        &self,
        from: &str,
        to: &str,
        overwrite: bool,
        account: &A,
        password: &str,
        completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        debug!(from = %from, to = %to, "move_file");
        self.transfer(HttpMethod::Move, from, to, overwrite, account, password, completion)
    }

    /// Copy `from` to `to`. Without `overwrite` an existing destination makes the request fail.
    pub fn copy_file<A, F>(
        &self,
        from: &str,
        to: &str,
        overwrite: bool,
        account: &A,
        password: &str,
        completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        debug!(from = %from, to = %to, "copy_file");
        self.transfer(HttpMethod::Copy, from, to, overwrite, account, password, completion)
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer<A, F>(
        &self,
        method: HttpMethod,
        from: &str,
        to: &str,
        overwrite: bool,
        account: &A,
        password: &str,
        completion: F,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        self.simple_request(from, account, password, method, completion, |identity, request| {
            request
                .header("Destination", identity.url_for_path(to))
                .header("Overwrite", if overwrite { "T" } else { "F" })
        })
    }

    fn simple_request<A, F>(
        &self,
        path: &str,
        account: &A,
        password: &str,
        method: HttpMethod,
        completion: F,
        configure: impl FnOnce(&AccountIdentity, DavRequest) -> DavRequest,
    ) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<WebDavError>) + Send + 'static,
    {
        let request = normalize_account(account).and_then(|identity| {
            let request = authorized_request(&identity, password, method, identity.url_for_path(path))?;
            Ok(configure(&identity, request))
        });
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                completion(Some(e));
                return None;
            }
        };

        Some(self.spawn_request(request, move |response| {
            let error = WebDavError::from_response(response.status, response.error.as_deref());
            if let Some(error) = &error {
                debug!(method = method.as_str(), error = %error, "Request failed");
            }
            completion(error);
        }))
    }

    /// Fetch the theming block of a Nextcloud server's capabilities
    pub fn get_nextcloud_theme<A, F>(&self, account: &A, password: &str, completion: F) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<OcsTheme>, Option<WebDavError>) + Send + 'static,
    {
        let identity = match normalize_account(account) {
            Ok(identity) => identity,
            Err(e) => {
                completion(None, Some(e));
                return None;
            }
        };
        let Some(base) = identity.nextcloud_base_url() else {
            completion(None, Some(WebDavError::Unsupported));
            return None;
        };
        let url = format!("{}/{}", base, CAPABILITIES_PATH);
        let request = match authorized_request(&identity, password, HttpMethod::Get, url) {
            Ok(request) => request.header("OCS-APIRequest", "true"),
            Err(e) => {
                completion(None, Some(e));
                return None;
            }
        };

        Some(self.spawn_request(request, move |response| {
            if let Some(error) = WebDavError::from_response(response.status, response.error.as_deref()) {
                return completion(None, Some(error));
            }
            let theme = response.body.as_deref().and_then(OcsTheme::from_xml);
            completion(theme, None)
        }))
    }

    /// Theme color of a Nextcloud server as a `#`-prefixed hex code
    pub fn get_nextcloud_color_hex<A, F>(&self, account: &A, password: &str, completion: F) -> Option<RequestHandle>
    where
        A: Account + ?Sized,
        F: FnOnce(Option<String>, Option<WebDavError>) + Send + 'static,
    {
        self.get_nextcloud_theme(account, password, move |theme, error| {
            completion(theme.and_then(|theme| theme.color_hex), error)
        })
    }

    /// Cached listing of `path`, from memory only
    pub fn get_cached_files<A: Account + ?Sized>(
        &self,
        path: &str,
        account: &A,
        view: ListingView,
    ) -> Option<Vec<FileEntry>> {
        let key = AccountPath::for_account(account, path)?;
        self.cache
            .cached_value(self.cache.listings.as_ref(), &key)
            .map(|files| view.apply(&files))
    }

    pub fn get_cached_data<A: Account + ?Sized>(&self, path: &str, account: &A) -> Option<Bytes> {
        let key = AccountPath::for_account(account, path)?;
        self.cache.cached_data(&key)
    }

    pub fn get_cached_image<A: Account + ?Sized>(&self, path: &str, account: &A) -> Option<Image> {
        let key = AccountPath::for_account(account, path)?;
        self.cache.cached_image(&key)
    }

    pub fn get_cached_thumbnail<A: Account + ?Sized>(
        &self,
        path: &str,
        account: &A,
        properties: &ThumbnailProperties,
    ) -> Option<Image> {
        let key = AccountPath::for_account(account, path)?;
        self.cache.cached_thumbnail(&key, properties)
    }

    /// Every thumbnail variant of `path` currently in memory
    pub fn get_all_cached_thumbnails<A: Account + ?Sized>(&self, path: &str, account: &A) -> Option<ThumbnailSet> {
        let key = AccountPath::for_account(account, path)?;
        self.cache.cached_value(self.cache.thumbnails.as_ref(), &key)
    }

    /// Where the bytes of `path` are (or would be) cached
    pub fn cached_data_path<A: Account + ?Sized>(&self, path: &str, account: &A) -> Option<PathBuf> {
        let key = AccountPath::for_account(account, path)?;
        Some(self.cache.disk.data_path(&key))
    }

    pub fn cached_data_path_if_exists<A: Account + ?Sized>(&self, path: &str, account: &A) -> Option<PathBuf> {
        self.cached_data_path(path, account).filter(|local| local.is_file())
    }

    pub fn cached_thumbnail_path<A: Account + ?Sized>(
        &self,
        path: &str,
        account: &A,
        properties: &ThumbnailProperties,
    ) -> Option<PathBuf> {
        let key = AccountPath::for_account(account, path)?;
        Some(self.cache.disk.thumbnail_path(&key, properties))
    }

    /// Forget the cached listing of `path`, in memory and in the index file
    pub fn delete_cached_files<A: Account + ?Sized>(&self, path: &str, account: &A) -> Result<(), WebDavError> {
        let Some(key) = AccountPath::for_account(account, path) else {
            return Ok(());
        };
        self.cache.listings.remove(&key);
        self.cache.persist_listing_index_logged();
        Ok(())
    }

    /// Remove the cached bytes and decoded image of `path` from memory and disk
    pub fn delete_cached_data<A: Account + ?Sized>(&self, path: &str, account: &A) -> Result<(), WebDavError> {
        let Some(key) = AccountPath::for_account(account, path) else {
            return Ok(());
        };
        self.cache.data.remove(&key);
        self.cache.images.remove(&key);
        self.cache.disk.delete(&self.cache.disk.data_path(&key))?;
        Ok(())
    }

    pub fn delete_cached_thumbnail<A: Account + ?Sized>(
        &self,
        path: &str,
        account: &A,
        properties: &ThumbnailProperties,
    ) -> Result<(), WebDavError> {
        let Some(key) = AccountPath::for_account(account, path) else {
            return Ok(());
        };
        self.cache.remove_thumbnail(&key, properties);
        self.cache.disk.delete(&self.cache.disk.thumbnail_path(&key, properties))?;
        Ok(())
    }

    /// Remove every thumbnail variant of `path` from memory and disk
    pub fn delete_all_cached_thumbnails<A: Account + ?Sized>(&self, path: &str, account: &A) -> Result<(), WebDavError> {
        let Some(key) = AccountPath::for_account(account, path) else {
            return Ok(());
        };
        self.cache.thumbnails.remove(&key);
        let disk = &self.cache.disk;
        for variant in disk.thumbnail_variants(&disk.data_path(&key))? {
            disk.delete(&variant)?;
        }
        Ok(())
    }

    /// Empty one cache category, or everything, in memory and on disk
    pub fn delete_all_cached(&self, category: Option<CacheCategory>) -> Result<(), WebDavError> {
        let disk = &self.cache.disk;
        match category {
            None => {
                self.cache.clear_memory(None);
                disk.delete_all()?;
                self.delete_index()?;
            }
            Some(CacheCategory::Listings) => self.clear_listing_cache()?,
            // Raw bytes and decoded images share their disk files
            Some(CacheCategory::Data) | Some(CacheCategory::Images) => {
                self.cache.clear_memory(Some(CacheCategory::Data));
                self.cache.clear_memory(Some(CacheCategory::Images));
                disk.delete_files_where(&|name| !is_thumbnail_file_name(name))?;
            }
            Some(CacheCategory::Thumbnails) => {
                self.cache.clear_memory(Some(CacheCategory::Thumbnails));
                disk.delete_files_where(&is_thumbnail_file_name)?;
            }
        }
        info!(category = ?category, "Deleted cached content");
        Ok(())
    }

    /// Delete every cached file on disk, keeping the listing index
    pub fn delete_all_disk_cached_data(&self) -> Result<(), WebDavError> {
        self.cache.disk.delete_all()?;
        Ok(())
    }

    pub fn clear_memory_cache(&self, category: Option<CacheCategory>) {
        self.cache.clear_memory(category);
    }

    /// Forget every cached listing, in memory and in the index file
    pub fn clear_listing_cache(&self) -> Result<(), WebDavError> {
        self.cache.clear_memory(Some(CacheCategory::Listings));
        self.delete_index()
    }

    fn delete_index(&self) -> Result<(), WebDavError> {
        let _guard = self.cache.lock_index();
        self.cache.disk.delete(&self.cache.disk.index_path())?;
        Ok(())
    }

    /// Merge the persisted listing index into memory; returns how many listings were added
    pub fn load_listing_index_from_disk(&self) -> Result<usize> {
        self.cache.load_listing_index()
    }

    pub fn persist_listing_index_to_disk(&self) -> Result<()> {
        self.cache.persist_listing_index()
    }

    /// Bytes used by everything under the cache root
    pub fn cache_root_byte_count(&self) -> u64 {
        self.cache.disk.byte_count()
    }

    /// Human-readable size of the cache root, e.g. `12.3 MB`
    pub fn cache_root_size_description(&self) -> String {
        format_byte_count(self.cache_root_byte_count())
    }
}

/// Normalize `account`, reporting `InvalidCredentials` through `completion` on failure
fn resolve_account<A, T, F>(account: &A, completion: &mut F) -> Option<AccountIdentity>
where
    A: Account + ?Sized,
    F: FnMut(Option<T>, Option<WebDavError>),
{
    match normalize_account(account) {
        Ok(identity) => Some(identity),
        Err(e) => {
            completion(None, Some(e));
            None
        }
    }
}

fn authorized_request(
    identity: &AccountIdentity,
    password: &str,
    method: HttpMethod,
    url: String,
) -> Result<DavRequest, WebDavError> {
    let auth = basic_auth_header(identity.username(), password).ok_or(WebDavError::InvalidCredentials)?;
    Ok(DavRequest::new(method, url, auth))
}

/// Nextcloud preview endpoint URL for `path`; `None` for non-Nextcloud base URLs
fn preview_url(identity: &AccountIdentity, path: &str, properties: &ThumbnailProperties) -> Option<String> {
    let base = identity.nextcloud_base_url()?;
    let file = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Some(format!(
        "{}/index.php/core/preview.png?file={}&{}",
        base,
        file,
        properties.query()
    ))
}
