//! Xunlei offline-download adapter (JSONP variant).
//!
//! Listings come back wrapped in a JSONP callback: the literal
//! `callback(`/`)` shell is stripped and the interior parsed as JSON. The top
//! level lists offline tasks; a BT task is a directory whose children are
//! fetched with the task id as cursor. Download URLs are already present in
//! the listing payloads, so resolution re-fetches the item's listing and
//! matches it by id.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::CookieSession;
use crate::format::readable_size;

use super::http::WebClient;
use super::{DownloadItem, DriveProvider, ProviderError, RemoteItem, ResolvedDownload};

const PROVIDER: &str = "xunlei";
const DEFAULT_BASE: &str = "http://dynamic.cloud.vip.xunlei.com";
const BT_CALLBACK: &str = "fill_bt_list";
/// `download_status` value meaning the cloud-side transfer finished.
const STATUS_COMPLETE: &str = "2";

/// A listed task together with the download URL the listing carried; the URL
/// stays internal and is only handed out through `resolve_download`.
#[derive(Debug)]
struct ListedTask {
    item: RemoteItem,
    url: String,
}

/// JSONP-based adapter for Xunlei offline tasks.
#[derive(Debug, Clone)]
pub struct XunleiProvider {
    web: WebClient,
    base: String,
}

impl Default for XunleiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl XunleiProvider {
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

    async fn listing(
        &self,
        session: &mut CookieSession,
        cursor: &str,
    ) -> Result<Vec<ListedTask>, ProviderError> {
        if cursor.is_empty() {
            self.main_list(session).await
        } else {
            self.bt_list(session, cursor).await
        }
    }

    /// Top-level offline task listing.
    async fn main_list(
        &self,
        session: &mut CookieSession,
    ) -> Result<Vec<ListedTask>, ProviderError> {
        // The callback doubles as a cache buster, mirroring what the web
        // frontend sends.
        let callback = format!("jsonp{}", timestamp_nanos());
        let url = format!(
            "{}/interface/showtask_unfresh?callback={callback}&type_id=4&page=1&tasknum=300&p=1&interfrom=task",
            self.base
        );
        let body = self.web.get(&url, session).await?;
        let payload = parse_jsonp(&body, &callback)?;
        parse_main_list(&payload)
    }

    /// Children of one BT task.
    async fn bt_list(
        &self,
        session: &mut CookieSession,
        task_id: &str,
    ) -> Result<Vec<ListedTask>, ProviderError> {
        let userid = session.value_of("userid").to_string();
        let url = format!(
            "{}/interface/fill_bt_list?tid={task_id}&g_net=1&p=1&uid={userid}&callback={BT_CALLBACK}",
            self.base
        );
        let body = self.web.get(&url, session).await?;
        let payload = parse_jsonp(&body, BT_CALLBACK)?;
        parse_bt_list(&payload, task_id)
    }
}

#[async_trait]
impl DriveProvider for XunleiProvider {
    fn kind(&self) -> &'static str {
        PROVIDER
    }

    async fn list_items(
        &self,
        session: &mut CookieSession,
        cursor: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        let tasks = self.listing(session, cursor).await?;
        Ok(tasks.into_iter().map(|t| t.item).collect())
    }

    async fn resolve_download(
        &self,
        session: &mut CookieSession,
        item: &DownloadItem,
    ) -> Result<ResolvedDownload, ProviderError> {
        let tasks = self.listing(session, &item.path).await?;
        let task = tasks
            .into_iter()
            .find(|t| t.item.id == item.id && !t.url.is_empty())
            .ok_or_else(|| {
                ProviderError::remote(
                    PROVIDER,
                    format!("no download url for task '{}'", item.id),
                )
            })?;
        // The lixian CDN authenticates aria2's fetch by this single cookie.
        let header = format!("Cookie: gdriveid={}", session.value_of("gdriveid"));
        Ok(ResolvedDownload {
            url: task.url,
            header: Some(header),
        })
    }
}

fn timestamp_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

/// Strips the `callback(`/`)` shell and parses the interior as JSON.
fn parse_jsonp(body: &str, callback: &str) -> Result<Value, ProviderError> {
    let inner = strip_jsonp(body, callback)
        .ok_or_else(|| ProviderError::shape(PROVIDER, format!("jsonp envelope '{callback}'")))?;
    serde_json::from_str(inner)
        .map_err(|_| ProviderError::shape(PROVIDER, format!("jsonp body of '{callback}'")))
}

fn strip_jsonp<'a>(body: &'a str, callback: &str) -> Option<&'a str> {
    let rest = body.trim().strip_prefix(callback)?.strip_prefix('(')?;
    let rest = rest.trim_end();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
    rest.strip_suffix(')')
}

fn parse_main_list(payload: &Value) -> Result<Vec<ListedTask>, ProviderError> {
    let rtcode = payload
        .get("rtcode")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProviderError::shape(PROVIDER, "rtcode"))?;
    if rtcode != 0 {
        return Err(ProviderError::remote(PROVIDER, format!("rtcode {rtcode}")));
    }
    let tasks = payload
        .get("info")
        .and_then(|info| info.get("tasks"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::shape(PROVIDER, "info.tasks"))?;

    let mut listed = Vec::new();
    for task in tasks.iter().filter_map(Value::as_object) {
        let mut url = task
            .get("lixian_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut isdir = false;
        if url.starts_with("bt:") {
            // A BT folder: listed as a directory, children fetched by cursor.
            url.clear();
            isdir = true;
        }
        let status = task
            .get("download_status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if status != STATUS_COMPLETE && !isdir {
            // Still transferring into the cloud account; not downloadable.
            continue;
        }
        let size_raw = task
            .get("file_size")
            .and_then(Value::as_str)
            .unwrap_or_default();
        listed.push(ListedTask {
            item: RemoteItem {
                id: id_string(task.get("id")),
                title: str_value(task.get("taskname")),
                size: format!("{}B", readable_size(size_raw)),
                isdir,
                path: None,
            },
            url,
        });
    }
    Ok(listed)
}

fn parse_bt_list(payload: &Value, cursor: &str) -> Result<Vec<ListedTask>, ProviderError> {
    let records = payload
        .get("Result")
        .and_then(|r| r.get("Record"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::shape(PROVIDER, "Result.Record"))?;

    let mut listed = Vec::new();
    for record in records.iter().filter_map(Value::as_object) {
        let status = record
            .get("download_status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if status != STATUS_COMPLETE {
            continue;
        }
        // Child ids are only unique within their task, so they are prefixed
        // with the parent task id.
        let taskid = str_value(record.get("taskid"));
        let id = format!("{taskid}{}", id_string(record.get("id")));
        let url = str_value(record.get("downurl"));
        let size_raw = record
            .get("filesize")
            .and_then(Value::as_str)
            .unwrap_or_default();
        listed.push(ListedTask {
            item: RemoteItem {
                id,
                title: str_value(record.get("title")),
                size: format!("{}B", readable_size(size_raw)),
                isdir: url.is_empty(),
                path: Some(cursor.to_string()),
            },
            url,
        });
    }
    Ok(listed)
}

/// Ids arrive as strings in some records and bare numbers in others.
fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn str_value(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::SessionCookie;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    #[test]
    fn strip_jsonp_requires_literal_shell() {
        assert_eq!(strip_jsonp("cb({\"a\":1})", "cb"), Some("{\"a\":1}"));
        assert_eq!(strip_jsonp("cb({\"a\":1});\n", "cb"), Some("{\"a\":1}"));
        assert_eq!(strip_jsonp("other({})", "cb"), None);
        assert_eq!(strip_jsonp("cb{}", "cb"), None);
    }

    #[test]
    fn main_list_filters_incomplete_and_marks_bt_dirs() {
        let payload = json!({
            "rtcode": 0,
            "info": {"tasks": [
                {"id": "t1", "taskname": "ready.mkv", "lixian_url": "http://gdl/a",
                 "download_status": "2", "file_size": "1536"},
                {"id": "t2", "taskname": "pending.mkv", "lixian_url": "http://gdl/b",
                 "download_status": "1", "file_size": "10"},
                {"id": "t3", "taskname": "folder", "lixian_url": "bt://xyz",
                 "download_status": "1", "file_size": "0"}
            ]}
        });
        let listed = parse_main_list(&payload).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].item.id, "t1");
        assert_eq!(listed[0].item.size, "1.50KB");
        assert_eq!(listed[0].url, "http://gdl/a");
        assert!(listed[1].item.isdir);
        assert!(listed[1].url.is_empty());
    }

    #[test]
    fn main_list_surfaces_rtcode_as_remote_error() {
        let err = parse_main_list(&json!({"rtcode": 403})).unwrap_err();
        assert!(matches!(err, ProviderError::Remote { .. }));
        assert!(err.to_string().contains("rtcode 403"));

        let err = parse_main_list(&json!({"nope": true})).unwrap_err();
        assert!(matches!(err, ProviderError::Shape { .. }));
    }

    #[test]
    fn bt_list_prefixes_child_ids_and_keeps_cursor() {
        let payload = json!({
            "Result": {"Record": [
                {"id": 7, "taskid": "t9", "title": "part1.bin", "filesize": "512",
                 "downurl": "http://gdl/p1", "download_status": "2"},
                {"id": 8, "taskid": "t9", "title": "part2.bin", "filesize": "512",
                 "downurl": "http://gdl/p2", "download_status": "0"}
            ]}
        });
        let listed = parse_bt_list(&payload, "t9").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].item.id, "t97");
        assert_eq!(listed[0].item.path.as_deref(), Some("t9"));
        assert_eq!(listed[0].item.size, "512B");
    }

    /// Echoes the caller's `callback` query parameter around a fixed payload,
    /// the way the real endpoint does.
    struct JsonpEcho(Value);

    impl Respond for JsonpEcho {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let callback = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "callback")
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();
            ResponseTemplate::new(200).set_body_string(format!("{callback}({})", self.0))
        }
    }

    fn session() -> CookieSession {
        CookieSession::new(vec![
            SessionCookie {
                name: "userid".into(),
                value: "u1".into(),
            },
            SessionCookie {
                name: "gdriveid".into(),
                value: "g-token".into(),
            },
        ])
    }

    #[tokio::test]
    async fn list_items_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/interface/showtask_unfresh"))
            .respond_with(JsonpEcho(json!({
                "rtcode": 0,
                "info": {"tasks": [
                    {"id": "t1", "taskname": "a.iso", "lixian_url": "http://gdl/a",
                     "download_status": "2", "file_size": "2048"}
                ]}
            })))
            .mount(&server)
            .await;

        let provider = XunleiProvider::with_base_url(server.uri());
        let mut session = session();
        let items = provider.list_items(&mut session, "").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "a.iso");
        assert_eq!(items[0].size, "2.00KB");
    }

    #[tokio::test]
    async fn resolve_download_re_derives_url_and_builds_gdriveid_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/interface/fill_bt_list"))
            .and(query_param("tid", "t9"))
            .and(query_param("uid", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "{BT_CALLBACK}({})",
                json!({"Result": {"Record": [
                    {"id": 7, "taskid": "t9", "title": "part1.bin", "filesize": "512",
                     "downurl": "http://gdl/p1", "download_status": "2"}
                ]}})
            )))
            .mount(&server)
            .await;

        let provider = XunleiProvider::with_base_url(server.uri());
        let mut session = session();
        let resolved = provider
            .resolve_download(
                &mut session,
                &DownloadItem {
                    id: "t97".into(),
                    title: "part1.bin".into(),
                    path: "t9".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.url, "http://gdl/p1");
        assert_eq!(resolved.header.as_deref(), Some("Cookie: gdriveid=g-token"));
    }

    #[tokio::test]
    async fn resolve_download_fails_for_unknown_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/interface/showtask_unfresh"))
            .respond_with(JsonpEcho(json!({"rtcode": 0, "info": {"tasks": []}})))
            .mount(&server)
            .await;

        let provider = XunleiProvider::with_base_url(server.uri());
        let mut session = session();
        let err = provider
            .resolve_download(&mut session, &DownloadItem::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Remote { .. }));
    }
}
