//! Application context shared by the request-handling layer.

mod drive;

pub use drive::{DriveError, DriveService};

use std::path::{Path, PathBuf};

use crate::aria2::Aria2Client;
use crate::provider::{XuanfengProvider, XunleiProvider, Yun360Provider};

/// Everything a request handler needs, built once at startup and passed by
/// handle. Replaces any notion of process-wide module singletons.
pub struct AppContext {
    aria2: Aria2Client,
    drives: Vec<DriveService>,
    config_dir: PathBuf,
}

impl AppContext {
    /// Builds the context with the stock provider set.
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        let drives = vec![
            DriveService::new(Box::new(XunleiProvider::new()), config_dir.to_path_buf()),
            DriveService::new(Box::new(Yun360Provider::new()), config_dir.to_path_buf()),
            DriveService::new(Box::new(XuanfengProvider::new()), config_dir.to_path_buf()),
        ];
        Self::with_drives(Aria2Client::new(config_dir), drives, config_dir.to_path_buf())
    }

    /// Builds the context from explicit parts. Lets tests and embedders wire
    /// adapters against non-default endpoints.
    #[must_use]
    pub fn with_drives(aria2: Aria2Client, drives: Vec<DriveService>, config_dir: PathBuf) -> Self {
        Self {
            aria2,
            drives,
            config_dir,
        }
    }

    /// The aria2 client.
    #[must_use]
    pub fn aria2(&self) -> &Aria2Client {
        &self.aria2
    }

    /// The drive facade registered under `kind`, if any.
    #[must_use]
    pub fn drive(&self, kind: &str) -> Option<&DriveService> {
        self.drives.iter().find(|d| d.kind() == kind)
    }

    /// All registered drive facades.
    #[must_use]
    pub fn drives(&self) -> &[DriveService] {
        &self.drives
    }

    /// Directory holding the aria2 config and the account cookie files.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}
