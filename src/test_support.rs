//! Shared test fixtures: a scripted transport, sample accounts, entries and images

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use crate::webdav::{
    normalize_account, AccountIdentity, AccountPath, DavRequest, FileEntry, SimpleAccount, Transport,
    TransportResponse,
};

pub const TEST_USER: &str = "user";
pub const TEST_BASE_URL: &str = "https://cloud.example.com/remote.php/dav/files/user";

pub fn test_account() -> SimpleAccount {
    SimpleAccount::new(TEST_USER, TEST_BASE_URL)
}

pub fn test_identity() -> AccountIdentity {
    normalize_account(&test_account()).unwrap()
}

pub fn test_key(path: &str) -> AccountPath {
    AccountPath::new(test_identity(), path)
}

fn entry(path: &str, is_directory: bool) -> FileEntry {
    FileEntry {
        path: path.to_string(),
        id: format!("id-{}", path),
        is_directory,
        last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        size: 42,
        etag: format!("etag-{}", path),
    }
}

pub fn file_entry(path: &str) -> FileEntry {
    entry(path, false)
}

pub fn directory_entry(path: &str) -> FileEntry {
    entry(path, true)
}

/// A 2x2 red PNG
pub fn png_bytes() -> Vec<u8> {
    let pixels = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// PROPFIND multistatus body for the given entries, hrefs below the test base URL
pub fn multistatus(entries: &[FileEntry]) -> String {
    multistatus_under("/remote.php/dav/files/user", entries)
}

/// PROPFIND multistatus body with hrefs below `href_base`, given as the server encodes it
pub fn multistatus_under(href_base: &str, entries: &[FileEntry]) -> String {
    let mut body = String::from(r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns">"#);
    for entry in entries {
        let content_type = if entry.is_directory {
            String::new()
        } else {
            "<d:getcontenttype>text/plain</d:getcontenttype>".to_string()
        };
        body.push_str(&format!(
            "<d:response><d:href>{href_base}/{path}{slash}</d:href>\
             <d:propstat><d:prop>\
             <d:getlastmodified>{modified}</d:getlastmodified>\
             <d:getetag>{etag}</d:getetag>{content_type}\
             <oc:fileid>{id}</oc:fileid><oc:size>{size}</oc:size>\
             </d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
            href_base = href_base,
            path = entry.path,
            slash = if entry.is_directory { "/" } else { "" },
            modified = entry.last_modified.to_rfc2822(),
            etag = entry.etag,
            content_type = content_type,
            id = entry.id,
            size = entry.size,
        ));
    }
    body.push_str("</d:multistatus>");
    body
}

/// Transport replaying canned responses and recording what it was asked
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<VecDeque<TransportResponse>>,
    fallback: Mutex<Option<TransportResponse>>,
    requests: Mutex<Vec<DavRequest>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every request with `response`
    pub fn always(response: TransportResponse) -> Arc<Self> {
        let transport = Self::default();
        *transport.fallback.lock().unwrap() = Some(response);
        Arc::new(transport)
    }

    /// Requests wait until the returned `Notify` is signalled
    pub fn gated(response: TransportResponse) -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Self {
            fallback: Mutex::new(Some(response)),
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (Arc::new(transport), gate)
    }

    /// Answer the next request with `response`, ahead of the fallback
    pub fn push(&self, response: TransportResponse) {
        self.queued.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<DavRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, request: DavRequest) -> TransportResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(response) = self.queued.lock().unwrap().pop_front() {
            return response;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| TransportResponse::failed("no canned response"))
    }
}
