//! File-backed account registry.
//!
//! Accounts for a provider kind live as JSON cookie files in the config
//! directory: `cookies_<kind>.json` is the `default` account and
//! `cookies_<kind>_<name>.json` is the account `<name>`. Sessions are loaded
//! once per registry read and written back when token rotation dirtied them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

use super::session::CookieSession;

const COOKIE_FILE_PREFIX: &str = "cookies_";
const COOKIE_FILE_SUFFIX: &str = ".json";

/// Errors raised while loading or persisting account cookie files.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The config directory could not be listed.
    #[error("cannot list account directory '{path}': {source}")]
    ReadDir {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A cookie file could not be read.
    #[error("cannot read cookie file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A cookie file was not a JSON array of name/value objects.
    #[error("cannot parse cookie file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// A rotated session could not be written back.
    #[error("cannot write cookie file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// One provider account: a name plus the session loaded from its cookie file.
///
/// The session sits behind an async mutex; the facade holds the lock for the
/// whole request, which is what enforces the one-in-flight-request-per-account
/// rule the providers rely on.
#[derive(Debug)]
pub struct Account {
    name: String,
    path: PathBuf,
    session: Mutex<CookieSession>,
}

impl Account {
    /// Creates an account backed by the given cookie file.
    #[must_use]
    pub fn new(name: impl Into<String>, path: PathBuf, session: CookieSession) -> Self {
        Self {
            name: name.into(),
            path,
            session: Mutex::new(session),
        }
    }

    /// The account name shown to the frontend.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session lock. Callers lock it once per request.
    #[must_use]
    pub fn session(&self) -> &Mutex<CookieSession> {
        &self.session
    }

    /// Writes the (already locked) session back to its cookie file and clears
    /// the dirty flag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::WriteFile`] when the file cannot be written.
    pub fn store(&self, session: &mut CookieSession) -> Result<(), RegistryError> {
        let content = session
            .to_json()
            .map_err(|source| RegistryError::Parse {
                path: self.path.display().to_string(),
                source,
            })?;
        fs::write(&self.path, content).map_err(|source| RegistryError::WriteFile {
            path: self.path.display().to_string(),
            source,
        })?;
        session.mark_clean();
        Ok(())
    }
}

/// Loads every account of one provider kind from the config directory.
///
/// File order is made deterministic by sorting on file name, so account lists
/// are stable across calls.
///
/// # Errors
///
/// Returns an error when the directory cannot be listed or any matching
/// cookie file cannot be read or parsed. A missing config directory yields an
/// empty list rather than an error: no directory simply means no accounts yet.
pub fn load_account_list(config_dir: &Path, kind: &str) -> Result<Vec<Account>, RegistryError> {
    let entries = match fs::read_dir(config_dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RegistryError::ReadDir {
                path: config_dir.display().to_string(),
                source,
            });
        }
    };

    let prefix = format!("{COOKIE_FILE_PREFIX}{kind}");
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut accounts = Vec::new();
    for file_name in names {
        let Some(account_name) = account_name_for(&file_name, &prefix) else {
            continue;
        };
        let path = config_dir.join(&file_name);
        let content = fs::read_to_string(&path).map_err(|source| RegistryError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        let session =
            CookieSession::from_json(&content).map_err(|source| RegistryError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        debug!(kind, account = %account_name, file = %file_name, "loaded account");
        accounts.push(Account::new(account_name, path, session));
    }
    Ok(accounts)
}

/// Maps a cookie file name onto an account name, or `None` when the file does
/// not belong to this provider kind.
fn account_name_for(file_name: &str, prefix: &str) -> Option<String> {
    let rest = file_name.strip_prefix(prefix)?;
    if rest == COOKIE_FILE_SUFFIX {
        return Some("default".to_string());
    }
    let named = rest.strip_prefix('_')?.strip_suffix(COOKIE_FILE_SUFFIX)?;
    if named.is_empty() {
        Some("empty".to_string())
    } else {
        Some(named.to_string())
    }
}
