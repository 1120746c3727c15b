//! WebDAV Error Types
//!
//! Structured error handling for WebDAV and Nextcloud operations.
//! Maps HTTP status codes and transport failures to the variants callers match on.

/// WebDAV error types
#[derive(Debug, thiserror::Error)]
pub enum WebDavError {
    /// The account was missing a username or base URL, or the credentials could not be
    /// encoded. No network request was made.
    #[error("Invalid credentials, no request was sent")]
    InvalidCredentials,

    #[error("Unauthorized: the server rejected the credentials")]
    Unauthorized,

    #[error("Insufficient storage on the server")]
    InsufficientStorage,

    /// The operation needs a server capability (such as Nextcloud previews)
    /// that this account's base URL does not provide.
    #[error("Unsupported by this server")]
    Unsupported,

    /// The delivered value is a lower-fidelity stand-in; the real value is still being fetched.
    #[error("Placeholder value, the full result is still loading")]
    Placeholder,

    #[error("Disk cache error: {0}")]
    DiskIo(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl WebDavError {
    /// Classify a finished request.
    ///
    /// Returns `None` for a 2xx status. A known status wins over a transport error;
    /// otherwise the transport error is wrapped.
    pub fn from_response(status: Option<u16>, transport_error: Option<&str>) -> Option<Self> {
        if let Some(status) = status {
            match status {
                200..=299 => return None,
                401..=403 => return Some(WebDavError::Unauthorized),
                507 => return Some(WebDavError::InsufficientStorage),
                _ => {}
            }
        }

        match (transport_error, status) {
            (Some(error), _) => Some(WebDavError::Transport(error.to_string())),
            (None, Some(status)) => Some(WebDavError::Transport(format!("HTTP {}", status))),
            (None, None) => Some(WebDavError::Transport("no response".to_string())),
        }
    }

    /// Whether the error came from the local disk cache rather than the server
    pub fn is_cache_error(&self) -> bool {
        matches!(self, WebDavError::DiskIo(_))
    }
}
