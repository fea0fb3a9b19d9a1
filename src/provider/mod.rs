//! Cloud-drive provider adapters.
//!
//! Each provider turns an authenticated, semi-structured web listing into a
//! uniform [`RemoteItem`] list and resolves single items into direct download
//! URLs. The three concrete adapters cover the three response styles found in
//! the wild: an HTML page scraped by attribute ([`XuanfengProvider`]), a
//! JSONP-wrapped API ([`XunleiProvider`]), and an almost-JSON API that needs a
//! repair pass before parsing ([`Yun360Provider`]).
//!
//! # Object Safety
//!
//! [`DriveProvider`] uses `async_trait` to support dynamic dispatch via
//! `Box<dyn DriveProvider>`. Rust 2024 native async traits are not
//! object-safe, so `async_trait` is required for the per-module dispatch.

mod http;
mod xuanfeng;
mod xunlei;
mod yun360;

pub use http::WebClient;
pub use xuanfeng::XuanfengProvider;
pub use xunlei::XunleiProvider;
pub use yun360::Yun360Provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::CookieSession;

/// Errors from a provider adapter. Every operation returns either data or an
/// error, never both; nothing here aborts the process.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The fetch itself failed before a response arrived.
    #[error("request to '{url}' failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The site answered with a non-2xx status.
    #[error("'{url}' answered HTTP {status}")]
    Status { url: String, status: u16 },
    /// The site answered with an application-level error code.
    #[error("{provider} rejected the request: {message}")]
    Remote {
        provider: &'static str,
        message: String,
    },
    /// The response decoded but did not match the expected shape. Upstream
    /// formats are unversioned and drift silently, so the context always
    /// names the field that failed.
    #[error("unexpected {provider} response shape at '{context}'")]
    Shape {
        provider: &'static str,
        context: String,
    },
}

impl ProviderError {
    pub(crate) fn remote(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            provider,
            message: message.into(),
        }
    }

    pub(crate) fn shape(provider: &'static str, context: impl Into<String>) -> Self {
        Self::Shape {
            provider,
            context: context.into(),
        }
    }
}

/// Provider-neutral listing entry.
///
/// Only items whose cloud-side transfer is complete are ever emitted; partial
/// or failed transfers are filtered out before reaching the frontend. `size`
/// carries a readable figure with a byte-unit suffix (empty for directories),
/// and `path` carries whatever cursor a hierarchical provider needs to list
/// or resolve below this item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteItem {
    pub id: String,
    pub title: String,
    pub size: String,
    pub isdir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// One entry of a download request, as sent by the frontend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Listing cursor the item came from (folder path or parent task id);
    /// empty for items of the top-level listing.
    #[serde(default)]
    pub path: String,
}

/// A resolved direct-download URL plus the header line the downloader must
/// send when fetching it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDownload {
    pub url: String,
    pub header: Option<String>,
}

/// Common contract of the three cloud-drive adapters.
#[async_trait]
pub trait DriveProvider: Send + Sync {
    /// Provider kind. Doubles as the action module name and the cookie-file
    /// key (`cookies_<kind>*.json`).
    fn kind(&self) -> &'static str;

    /// Fetches the listing behind `cursor` (empty cursor = top level),
    /// filtered to items that are ready to download.
    async fn list_items(
        &self,
        session: &mut CookieSession,
        cursor: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError>;

    /// Resolves one item into a direct download URL. Any session token the
    /// site rotates during resolution is folded into `session` before this
    /// returns, so the returned header always reflects the freshest cookies.
    async fn resolve_download(
        &self,
        session: &mut CookieSession,
        item: &DownloadItem,
    ) -> Result<ResolvedDownload, ProviderError>;
}
