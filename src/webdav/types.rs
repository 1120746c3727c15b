//! WebDAV types and PROPFIND decoding
//!
//! Defines the file entries reported by the server, the thumbnail rendering
//! properties used as cache sub-keys, and the views callers get of a listing.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// PROPFIND body requesting the properties a [`FileEntry`] is built from
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns" xmlns:nc="http://nextcloud.org/ns">
  <d:prop>
    <d:getlastmodified />
    <d:getetag />
    <d:getcontenttype />
    <oc:fileid />
    <oc:permissions />
    <oc:size />
    <nc:has-preview />
    <oc:favorite />
  </d:prop>
</d:propfind>"#;

/// A file or directory reported by a PROPFIND
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the account's base URL, percent-decoded, without surrounding slashes
    pub path: String,
    /// Server file ID
    pub id: String,
    /// Directories are the entries without a content type
    pub is_directory: bool,
    pub last_modified: DateTime<Utc>,
    /// Size in bytes (directories report the size of their contents)
    pub size: u64,
    /// Opaque change token
    pub etag: String,
}

impl FileEntry {
    /// Last path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lowercased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(pos) => Some(name[pos + 1..].to_lowercase()),
        }
    }
}

impl std::fmt::Display for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\tLast modified {}\tID: {}\tSize: {}",
            self.path,
            if self.is_directory { "Directory" } else { "File" },
            self.last_modified.to_rfc2822(),
            self.id,
            self.size
        )
    }
}

/// Properties collected from the first `propstat` of one `response`
#[derive(Default)]
struct RawEntry {
    href: Option<String>,
    last_modified: Option<String>,
    etag: Option<String>,
    content_type: Option<String>,
    file_id: Option<String>,
    size: Option<String>,
}

impl RawEntry {
    fn into_entry(self, base_path: &str) -> Option<FileEntry> {
        let href = self.href?;
        let last_modified = DateTime::parse_from_rfc2822(self.last_modified?.trim())
            .ok()?
            .with_timezone(&Utc);
        let size = self.size?.trim().parse::<u64>().ok()?;

        Some(FileEntry {
            path: relative_path(&href, base_path),
            id: self.file_id?,
            is_directory: self.content_type.is_none(),
            last_modified,
            size,
            etag: self.etag?,
        })
    }
}

/// Turn an `href` into a path relative to the account base path
fn relative_path(href: &str, base_path: &str) -> String {
    let decoded = urlencoding::decode(href)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string());

    // Some servers answer with absolute URLs
    let path = match decoded.find("://") {
        Some(pos) => {
            let after_scheme = &decoded[pos + 3..];
            after_scheme
                .find('/')
                .map(|slash| after_scheme[slash..].to_string())
                .unwrap_or_default()
        }
        None => decoded,
    };

    let path = path.trim_matches('/');
    let relative = if base_path.is_empty() {
        path
    } else if path == base_path {
        ""
    } else {
        path.strip_prefix(base_path)
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(path)
    };
    relative.trim_matches('/').to_string()
}

/// Decode a PROPFIND multistatus body into file entries.
///
/// Entries missing required properties are skipped; malformed XML yields whatever
/// was decoded before the error (usually nothing).
pub fn decode_listing(body: &[u8], base_path: &str) -> Vec<FileEntry> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut propstat_index = 0usize;
    let mut current_tag: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match local.as_str() {
                    "response" => {
                        current = Some(RawEntry::default());
                        propstat_index = 0;
                    }
                    "href" | "getlastmodified" | "getetag" | "getcontenttype" | "fileid"
                    | "size" => current_tag = Some(local),
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(tag), Some(raw)) = (current_tag.as_deref(), current.as_mut()) {
                    let text = e.unescape().map(|t| t.into_owned()).unwrap_or_default();
                    // Only the first propstat carries the properties that were found
                    let in_first_propstat = propstat_index == 0;
                    match tag {
                        "href" => raw.href = Some(text),
                        "getlastmodified" if in_first_propstat => raw.last_modified = Some(text),
                        "getetag" if in_first_propstat => raw.etag = Some(text),
                        "getcontenttype" if in_first_propstat => raw.content_type = Some(text),
                        "fileid" if in_first_propstat => raw.file_id = Some(text),
                        "size" if in_first_propstat => raw.size = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match local.as_str() {
                    "response" => {
                        if let Some(entry) = current.take().and_then(|raw| raw.into_entry(base_path)) {
                            entries.push(entry);
                        }
                    }
                    "propstat" => propstat_index += 1,
                    _ => {
                        if current_tag.as_deref() == Some(local.as_str()) {
                            current_tag = None;
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "Malformed PROPFIND response");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    debug!(count = entries.len(), "Decoded PROPFIND listing");
    entries
}

/// How a thumbnail fills the requested dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentMode {
    #[default]
    Fill,
    Fit,
}

/// Thumbnail rendering properties; also a cache sub-key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThumbnailProperties {
    /// Width and height in pixels. `None` uses the server's default.
    pub dimensions: Option<(u32, u32)>,
    pub content_mode: ContentMode,
}

impl ThumbnailProperties {
    /// Content fill with the server's default dimensions
    pub const FILL: ThumbnailProperties = ThumbnailProperties {
        dimensions: None,
        content_mode: ContentMode::Fill,
    };

    /// Content fit with the server's default dimensions
    pub const FIT: ThumbnailProperties = ThumbnailProperties {
        dimensions: None,
        content_mode: ContentMode::Fit,
    };

    pub fn new(width: u32, height: u32, content_mode: ContentMode) -> Self {
        Self {
            dimensions: Some((width, height)),
            content_mode,
        }
    }

    /// Preview query parameters, e.g. `mode=cover&x=64&y=64&a=1`
    pub fn query(&self) -> String {
        let mut query = String::from("mode=cover");
        if let Some((width, height)) = self.dimensions {
            query.push_str(&format!("&x={}&y={}", width, height));
        }
        if self.content_mode == ContentMode::Fill {
            query.push_str("&a=1");
        }
        query
    }
}

/// Which thumbnail to show while a full image is downloading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailPreview {
    /// Any thumbnail variant already in memory
    MemoryOnly,
    /// This variant, from memory or disk
    Specific(ThumbnailProperties),
}

/// Shape of a listing handed back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingView {
    /// Keep index 0, the directory's own entry
    pub include_self: bool,
    /// Move directories before files, keeping relative order within each group
    pub folders_first: bool,
}

impl Default for ListingView {
    fn default() -> Self {
        Self {
            include_self: false,
            folders_first: true,
        }
    }
}

impl ListingView {
    pub fn apply(&self, files: &[FileEntry]) -> Vec<FileEntry> {
        let files = if self.include_self || files.is_empty() {
            files
        } else {
            &files[1..]
        };

        if !self.folders_first {
            return files.to_vec();
        }

        let (mut directories, regular): (Vec<FileEntry>, Vec<FileEntry>) =
            files.iter().cloned().partition(|file| file.is_directory);
        directories.extend(regular);
        directories
    }
}
