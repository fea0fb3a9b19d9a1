//! Per-provider orchestration facade.
//!
//! A [`DriveService`] fronts one provider adapter: it owns the cached account
//! list, resolves account names to sessions, and mediates between the adapter
//! and the aria2 client for downloads. Batch downloads never stop at the
//! first failure; the last error is reported while earlier successes stay
//! enqueued.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::aria2::{Aria2Client, Aria2Error};
use crate::auth::{Account, CookieSession, RegistryError, load_account_list};
use crate::provider::{DownloadItem, DriveProvider, ProviderError, RemoteItem};

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum DriveError {
    /// The account name is not in the registry. User-facing, not a bug.
    #[error("no account named '{name}'")]
    AccountNotFound { name: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Downloader(#[from] Aria2Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Facade over one provider adapter and its accounts.
pub struct DriveService {
    provider: Box<dyn DriveProvider>,
    config_dir: PathBuf,
    /// `None` until first use or after an explicit reload; the loaded list is
    /// kept for the service lifetime rather than re-read per call.
    accounts: Mutex<Option<Vec<Arc<Account>>>>,
}

impl DriveService {
    /// Creates a facade whose accounts live in `config_dir`.
    #[must_use]
    pub fn new(provider: Box<dyn DriveProvider>, config_dir: PathBuf) -> Self {
        Self {
            provider,
            config_dir,
            accounts: Mutex::new(None),
        }
    }

    /// Provider kind, used as the action module name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.provider.kind()
    }

    /// Returns the account names, loading the registry on first use.
    ///
    /// # Errors
    ///
    /// Returns a registry error when the cookie files cannot be loaded.
    pub async fn account_names(&self) -> Result<Vec<String>, DriveError> {
        let mut guard = self.accounts.lock().await;
        let accounts = self.loaded(&mut guard)?;
        Ok(accounts.iter().map(|a| a.name().to_string()).collect())
    }

    /// Drops the cached account list; the next call re-reads the registry.
    /// This is the only invalidation trigger besides service teardown.
    pub async fn invalidate_accounts(&self) {
        *self.accounts.lock().await = None;
        debug!(kind = self.kind(), "account cache invalidated");
    }

    /// Lists the items behind `cursor` for the named account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for unknown names, otherwise whatever the
    /// adapter reports.
    pub async fn list_items(
        &self,
        account_name: &str,
        cursor: &str,
    ) -> Result<Vec<RemoteItem>, DriveError> {
        let account = self.account(account_name).await?;
        let mut session = account.session().lock().await;
        let result = self.provider.list_items(&mut session, cursor).await;
        // Token rotation may have happened even when parsing failed later.
        self.persist_rotated(&account, &mut session);
        Ok(result?)
    }

    /// Resolves and enqueues every item. One failed item never stops the
    /// others; the overall result is ok only when every item succeeded, and
    /// otherwise carries the last error seen while earlier successes remain
    /// enqueued (no rollback).
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for unknown names, else the last per-item
    /// resolution or enqueue error.
    pub async fn enqueue_downloads(
        &self,
        account_name: &str,
        items: &[DownloadItem],
        aria2: &Aria2Client,
    ) -> Result<(), DriveError> {
        let account = self.account(account_name).await?;
        let mut session = account.session().lock().await;

        let mut last_error: Option<DriveError> = None;
        for item in items {
            let resolved = match self.provider.resolve_download(&mut session, item).await {
                Ok(resolved) => resolved,
                Err(error) => {
                    warn!(kind = self.kind(), item = %item.id, error = %error, "resolve failed");
                    last_error = Some(error.into());
                    continue;
                }
            };
            match aria2
                .add_download(&resolved.url, &item.title, resolved.header.as_deref())
                .await
            {
                Ok(gid) => debug!(kind = self.kind(), item = %item.id, gid = %gid, "enqueued"),
                Err(error) => {
                    warn!(kind = self.kind(), item = %item.id, error = %error, "enqueue failed");
                    last_error = Some(error.into());
                }
            }
        }

        self.persist_rotated(&account, &mut session);
        match last_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Looks up an account by name, loading the registry if needed. The
    /// returned handle outlives the registry lock so per-account sessions
    /// can be held without serializing unrelated accounts.
    async fn account(&self, name: &str) -> Result<Arc<Account>, DriveError> {
        let mut guard = self.accounts.lock().await;
        let accounts = self.loaded(&mut guard)?;
        accounts
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| DriveError::AccountNotFound {
                name: name.to_string(),
            })
    }

    fn loaded<'a>(
        &self,
        guard: &'a mut Option<Vec<Arc<Account>>>,
    ) -> Result<&'a [Arc<Account>], DriveError> {
        if guard.is_none() {
            let loaded = load_account_list(&self.config_dir, self.kind())?
                .into_iter()
                .map(Arc::new)
                .collect();
            *guard = Some(loaded);
        }
        Ok(guard.as_deref().unwrap_or_default())
    }

    /// Writes a rotated session back to its cookie file. Persistence is best
    /// effort: a failed write costs a token on the next restart, not this
    /// request.
    fn persist_rotated(&self, account: &Account, session: &mut CookieSession) {
        if !session.is_dirty() {
            return;
        }
        if let Err(error) = account.store(session) {
            warn!(kind = self.kind(), account = account.name(), error = %error,
                "could not persist rotated cookies");
        }
    }
}
