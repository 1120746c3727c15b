//! WebDAV and Nextcloud client

pub mod account;
pub mod client;
pub mod errors;
pub mod ocs;
pub mod transport;
pub mod types;

pub use account::{normalize_account, Account, AccountIdentity, AccountPath, SimpleAccount};
pub use client::WebDav;
pub use errors::WebDavError;
pub use ocs::OcsTheme;
pub use transport::{basic_auth_header, DavRequest, HttpMethod, ReqwestTransport, Transport, TransportResponse};
pub use types::*;
