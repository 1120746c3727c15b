//! Accounts and cache keys
//!
//! Callers bring their own account type; everything inside the crate works on the
//! normalized [`AccountIdentity`] and the [`AccountPath`] cache key built from it.

use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::WebDavError;

/// Anything that can describe a WebDAV account.
pub trait Account {
    fn username(&self) -> Option<&str>;
    fn base_url(&self) -> Option<&str>;
}

/// Plain account value for callers without their own account type
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SimpleAccount {
    pub username: Option<String>,
    pub base_url: Option<String>,
}

impl SimpleAccount {
    pub fn new(username: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            base_url: Some(base_url.into()),
        }
    }
}

impl Account for SimpleAccount {
    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}

/// Normalized (username, https base URL) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountIdentity {
    username: String,
    base_url: Url,
}

impl AccountIdentity {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Percent-decoded path component of the base URL without surrounding slashes
    pub(crate) fn base_path(&self) -> String {
        let path = self.base_url.path();
        let decoded = urlencoding::decode(path)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| path.to_string());
        decoded.trim_matches('/').to_string()
    }

    /// Directory name used for this account in the disk cache.
    ///
    /// `username@` followed by the percent-encoded base URL, with encoded
    /// slashes turned into colons so the name stays readable.
    pub fn encoded_description(&self) -> String {
        let encoded = urlencoding::encode(self.base_url.as_str()).replace("%2F", ":");
        format!("{}@{}", self.username, encoded)
    }

    /// Absolute URL for a path below the base URL, each segment percent-encoded
    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let encoded = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if encoded.is_empty() {
            format!("{}/", base)
        } else {
            format!("{}/{}", base, encoded)
        }
    }

    /// Nextcloud server root, derived from a `…/remote.php/dav/files/<user>` base URL
    pub fn nextcloud_base_url(&self) -> Option<String> {
        let url = self.base_url.as_str();
        let index = url.to_lowercase().find("/remote.php/dav/files/")?;
        Some(url[..index].trim_end_matches('/').to_string())
    }
}

impl std::fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.base_url)
    }
}

/// Normalize an account into its identity.
///
/// A missing scheme becomes `https://`, any other scheme is replaced by `https`.
pub fn normalize_account<A: Account + ?Sized>(account: &A) -> Result<AccountIdentity, WebDavError> {
    let username = account.username().ok_or(WebDavError::InvalidCredentials)?;
    let raw = account
        .base_url()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WebDavError::InvalidCredentials)?;
    if username.is_empty() {
        return Err(WebDavError::InvalidCredentials);
    }

    let base_url = match Url::parse(raw) {
        Ok(url) if url.scheme() == "https" => url,
        // "host.com:8080" parses with "host.com" as the scheme
        Ok(url) if url.cannot_be_a_base() => parse_with_https(raw)?,
        Ok(mut url) => {
            if url.set_scheme("https").is_err() {
                let rest = &raw[url.scheme().len()..];
                let rest = rest.trim_start_matches(':').trim_start_matches('/');
                url = parse_with_https(rest)?;
            }
            url
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => parse_with_https(raw)?,
        Err(_) => return Err(WebDavError::InvalidCredentials),
    };

    Ok(AccountIdentity {
        username: username.to_string(),
        base_url,
    })
}

fn parse_with_https(raw: &str) -> Result<Url, WebDavError> {
    Url::parse(&format!("https://{}", raw)).map_err(|_| WebDavError::InvalidCredentials)
}

/// Universal cache key: account identity plus a path trimmed of slashes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountPath {
    pub account: AccountIdentity,
    pub path: String,
}

impl AccountPath {
    pub fn new(account: AccountIdentity, path: &str) -> Self {
        Self {
            account,
            path: path.trim_matches('/').to_string(),
        }
    }

    /// Key for a caller-defined account; `None` when the account is invalid
    pub fn for_account<A: Account + ?Sized>(account: &A, path: &str) -> Option<Self> {
        normalize_account(account)
            .ok()
            .map(|identity| Self::new(identity, path))
    }

    /// Same account, path strictly below `ancestor` (segment-wise, not substring)
    pub fn is_strict_descendant_of(&self, ancestor: &AccountPath) -> bool {
        self.account == ancestor.account && is_descendant_path(&self.path, &ancestor.path)
    }
}

/// `true` when `path` lies strictly below `ancestor`. Both are slash-trimmed.
pub(crate) fn is_descendant_path(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.strip_prefix(ancestor)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_normalization() {
        let bare = normalize_account(&SimpleAccount::new("u", "host.com")).unwrap();
        let full = normalize_account(&SimpleAccount::new("u", "https://host.com/")).unwrap();
        let http = normalize_account(&SimpleAccount::new("u", "http://host.com")).unwrap();
        assert_eq!(bare, full);
        assert_eq!(bare, http);
        assert_eq!(bare.base_url().as_str(), "https://host.com/");
    }

    #[test]
    fn test_host_with_port_without_scheme() {
        let identity = normalize_account(&SimpleAccount::new("u", "host.com:8443/dav")).unwrap();
        assert_eq!(identity.base_url().as_str(), "https://host.com:8443/dav");
    }

    #[test]
    fn test_invalid_accounts() {
        let missing_user = SimpleAccount {
            username: None,
            base_url: Some("host.com".to_string()),
        };
        assert!(matches!(
            normalize_account(&missing_user),
            Err(WebDavError::InvalidCredentials)
        ));

        let missing_url = SimpleAccount {
            username: Some("u".to_string()),
            base_url: None,
        };
        assert!(normalize_account(&missing_url).is_err());
        assert!(normalize_account(&SimpleAccount::new("u", "https://")).is_err());
        assert!(AccountPath::for_account(&missing_url, "a").is_none());
    }

    #[test]
    fn test_account_path_trimming() {
        let account = SimpleAccount::new("u", "host.com");
        let a = AccountPath::for_account(&account, "/a/b/").unwrap();
        let b = AccountPath::for_account(&account, "a/b").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.path, "a/b");
    }

    #[test]
    fn test_descendant_is_segment_based() {
        assert!(is_descendant_path("A/B", "A"));
        assert!(is_descendant_path("A/B/C", "A"));
        assert!(!is_descendant_path("AB", "A"));
        assert!(!is_descendant_path("A", "A"));
        assert!(is_descendant_path("A", ""));
        assert!(!is_descendant_path("", ""));
    }

    #[test]
    fn test_encoded_description() {
        let identity =
            normalize_account(&SimpleAccount::new("alice", "https://cloud.example.com/remote.php/dav/files/alice"))
                .unwrap();
        let encoded = identity.encoded_description();
        assert!(encoded.starts_with("alice@https%3A::cloud.example.com:remote.php"));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_url_for_path_encodes_segments() {
        let identity = normalize_account(&SimpleAccount::new("u", "https://host.com/dav/")).unwrap();
        assert_eq!(identity.url_for_path("/My Docs/a b.txt"), "https://host.com/dav/My%20Docs/a%20b.txt");
        assert_eq!(identity.url_for_path(""), "https://host.com/dav/");
    }

    #[test]
    fn test_base_path_is_decoded() {
        let identity =
            normalize_account(&SimpleAccount::new("john doe", "https://cloud.example.com/remote.php/dav/files/john doe/"))
                .unwrap();
        assert!(identity.base_url().path().contains("%20"));
        assert_eq!(identity.base_path(), "remote.php/dav/files/john doe");
    }

    #[test]
    fn test_nextcloud_base_url() {
        let nextcloud =
            normalize_account(&SimpleAccount::new("u", "https://cloud.example.com/nc/remote.php/dav/files/u"))
                .unwrap();
        assert_eq!(
            nextcloud.nextcloud_base_url().as_deref(),
            Some("https://cloud.example.com/nc")
        );

        let plain = normalize_account(&SimpleAccount::new("u", "https://dav.example.com/")).unwrap();
        assert!(plain.nextcloud_base_url().is_none());
    }
}
