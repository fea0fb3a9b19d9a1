//! 360 cloud-drive adapter (malformed-JSON variant).
//!
//! The file-list endpoint answers something that is almost JSON: single
//! quotes, unquoted keys, and occasionally more than one key:value pair per
//! comma segment. [`repair_json`] patches it into parseable JSON before the
//! regular pipeline takes over. The download endpoint, by contrast, answers
//! well-formed JSON.

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::CookieSession;
use crate::format::readable_size;

use super::http::WebClient;
use super::{DownloadItem, DriveProvider, ProviderError, RemoteItem, ResolvedDownload};

const PROVIDER: &str = "yun360";
const DEFAULT_BASE: &str = "http://c69.yunpan.360.cn";
const REFERER_PATH: &str = "/my";

/// Adapter for 360 cloud-drive folders.
#[derive(Debug, Clone)]
pub struct Yun360Provider {
    web: WebClient,
    base: String,
}

impl Default for Yun360Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Yun360Provider {
    /// Creates an adapter against the production endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE)
    }

    /// Creates an adapter against a custom endpoint (tests, proxies).
    #[must_use]
    pub fn with_base_url(base: impl Into<String>) -> Self {
        Self {
            web: WebClient::new(),
            base: base.into(),
        }
    }

    fn referer(&self) -> String {
        format!("{}{REFERER_PATH}", self.base)
    }
}

#[async_trait]
impl DriveProvider for Yun360Provider {
    fn kind(&self) -> &'static str {
        PROVIDER
    }

    /// Lists one folder; the cursor is the folder path, empty meaning the
    /// drive root.
    async fn list_items(
        &self,
        session: &mut CookieSession,
        cursor: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        let path = if cursor.is_empty() { "/" } else { cursor };
        let url = format!("{}/file/list", self.base);
        let body = format!(
            "type=2&t=0.01148906020119389&order=asc&field=file_name&path={}&page=0&page_size=300&ajax=1",
            urlencoding::encode(path)
        );
        let raw = self
            .web
            .post_form(&url, body, &self.referer(), session)
            .await?;

        let repaired = repair_json(&raw);
        let payload: Value = serde_json::from_str(&repaired)
            .map_err(|_| ProviderError::shape(PROVIDER, "file/list body after repair"))?;
        parse_list(&payload)
    }

    async fn resolve_download(
        &self,
        session: &mut CookieSession,
        item: &DownloadItem,
    ) -> Result<ResolvedDownload, ProviderError> {
        let url = format!("{}/file/download", self.base);
        let body = format!(
            "nid={}&fname={}&ajax=1",
            item.id,
            urlencoding::encode(&item.path)
        );
        let raw = self
            .web
            .post_form(&url, body, &self.referer(), session)
            .await?;

        let payload: Value = serde_json::from_str(&raw)
            .map_err(|_| ProviderError::shape(PROVIDER, "file/download body"))?;
        if !errno_is_zero(payload.get("errno")) {
            let errno = payload.get("errno").cloned().unwrap_or(Value::Null);
            let message = payload
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("download rejected");
            return Err(ProviderError::remote(
                PROVIDER,
                format!("{message} (errno {errno})"),
            ));
        }
        let download_url = payload
            .get("data")
            .and_then(|d| d.get("download_url"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::shape(PROVIDER, "data.download_url"))?
            .to_string();
        // Rendered after both fetches, so any rotated token is included.
        Ok(ResolvedDownload {
            url: download_url,
            header: Some(session.header_line()),
        })
    }
}

/// The repaired listing quotes the error code while the download endpoint
/// sends a bare number; both spellings of zero mean success.
fn errno_is_zero(errno: Option<&Value>) -> bool {
    matches!(errno, Some(Value::String(s)) if s == "0")
        || matches!(errno.and_then(Value::as_i64), Some(0))
}

fn parse_list(payload: &Value) -> Result<Vec<RemoteItem>, ProviderError> {
    if !errno_is_zero(payload.get("errno")) {
        let message = payload
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("listing rejected");
        return Err(ProviderError::remote(PROVIDER, message));
    }
    let entries = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::shape(PROVIDER, "data"))?;

    let mut items = Vec::new();
    for entry in entries.iter().filter_map(Value::as_object) {
        // Entries without a node id are navigation noise, not files.
        let id = match entry.get("nid") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        let isdir = entry.get("isDir").and_then(Value::as_i64) == Some(1)
            || entry.get("isDir").and_then(Value::as_str) == Some("1");
        let size = if isdir {
            String::new()
        } else {
            let raw = entry
                .get("oriSize")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("{}B", readable_size(raw))
        };
        items.push(RemoteItem {
            id,
            title: entry
                .get("oriName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            size,
            isdir,
            path: entry
                .get("path")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    Ok(items)
}

/// Best-effort repair of the not-quite-JSON the file-list endpoint serves:
/// single quotes become double quotes, then each comma segment gets its key
/// tokens quoted.
///
/// This is a heuristic transform, not a general relaxed-JSON parser: URLs
/// containing literal commas or colons in unexpected positions can still
/// mis-split. Known limitation.
pub(crate) fn repair_json(raw: &str) -> String {
    let replaced = raw.replace('\'', "\"");
    replaced
        .split(',')
        .map(|segment| quote_keys(segment.to_string(), 0))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quotes the key token before the first colon at or after `start`, then
/// recurses past that colon for segments carrying more than one key:value
/// pair. `http`/`https` tokens are skipped so URL values are never mistaken
/// for keys.
fn quote_keys(segment: String, start: usize) -> String {
    if start >= segment.len() || !segment.is_char_boundary(start) {
        return segment;
    }
    let Some(colon) = segment[start..].find(':').map(|i| i + start) else {
        return segment;
    };
    let Some(key_start) = segment[start..]
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map(|(i, _)| i + start)
    else {
        return segment;
    };
    if key_start >= colon {
        // The colon belongs to a value (e.g. a URL scheme already handled);
        // look for the next pair.
        return quote_keys(segment, colon + 3);
    }
    let key = segment[key_start..colon].trim().to_string();
    let next = if key.is_empty() || key == "http" || key == "https" {
        segment
    } else {
        segment.replacen(&key, &format!("\"{key}\""), 1)
    };
    // +3 skips the colon plus the two quotes just inserted, landing on the
    // value side in the rewritten string.
    quote_keys(next, colon + 3)
}
