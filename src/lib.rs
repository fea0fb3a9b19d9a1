//! pan-relay Core Library
//!
//! This library implements a local relay between a browser frontend, several
//! cookie-authenticated cloud-drive accounts, and a remote aria2 daemon:
//! listings are pulled out of the drives, filtered to ready-to-download
//! items, and handed to aria2 over JSON-RPC.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Per-account cookie sessions and the file-backed registry
//! - [`rpc`] - JSON-RPC 2.0 transport over HTTP POST
//! - [`aria2`] - aria2 method set, batched status aggregation, endpoint config
//! - [`provider`] - Cloud-drive adapters (HTML-scrape / JSONP / repaired JSON)
//! - [`app`] - Application context and the per-provider orchestration facade
//! - [`server`] - Action-protocol endpoint and static frontend serving
//! - [`format`] - Readable-size rendering shared by the above

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod aria2;
pub mod auth;
pub mod format;
pub mod provider;
pub mod rpc;
pub mod server;

// Re-export commonly used types
pub use app::{AppContext, DriveError, DriveService};
pub use aria2::{
    Aria2Client, Aria2Config, Aria2Error, DEFAULT_ENDPOINT, DownloadTask, StatusSnapshot,
};
pub use auth::{Account, CookieSession, RegistryError, SessionCookie, load_account_list};
pub use format::readable_size;
pub use provider::{
    DownloadItem, DriveProvider, ProviderError, RemoteItem, ResolvedDownload, WebClient,
    XuanfengProvider, XunleiProvider, Yun360Provider,
};
pub use rpc::{RpcClient, RpcRequest, RpcResponse, TransportError};
pub use server::{ActionRequest, ActionResponse, dispatch};
