//! Xuanfeng offline-download adapter (HTML-scrape variant).
//!
//! The task page carries no API: finished tasks are embedded as families of
//! hidden `<input>` nodes. One marker node per task
//! (`<input name="lixian_item" id="lixian_item_<n>">`) announces the task's
//! numeric suffix, and four sibling nodes keyed by the same suffix hold its
//! fields: `task_status_<n>`, `task_title_<n>`, `task_size_<n>`,
//! `task_url_<n>`. Only groups whose status equals the complete sentinel are
//! emitted.
//!
//! The page is small and lookups are few, so a single pass over the document
//! building an id→value map is all the indexing this needs.

use std::collections::HashMap;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::auth::CookieSession;
use crate::format::readable_size;

use super::http::WebClient;
use super::{DownloadItem, DriveProvider, ProviderError, RemoteItem, ResolvedDownload};

const PROVIDER: &str = "xuanfeng";
const DEFAULT_BASE: &str = "http://lixian.qq.com";
const PAGE_PATH: &str = "/main.html";
const MARKER_NAME: &str = "lixian_item";
const MARKER_ID_PREFIX: &str = "lixian_item_";
/// Status value meaning the cloud-side transfer finished.
const STATUS_COMPLETE: &str = "2";

/// One suffix group pulled off the page.
#[derive(Debug)]
struct TaskGroup {
    suffix: String,
    status: String,
    title: String,
    size: String,
    url: String,
}

/// HTML-scraping adapter for Xuanfeng offline tasks.
#[derive(Debug, Clone)]
pub struct XuanfengProvider {
    web: WebClient,
    base: String,
}

impl Default for XuanfengProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl XuanfengProvider {
    /// Creates an adapter against the production page.
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

    /// Fetches the task page and scrapes the complete task groups off it.
    async fn fetch_groups(
        &self,
        session: &mut CookieSession,
    ) -> Result<Vec<TaskGroup>, ProviderError> {
        let url = format!("{}{PAGE_PATH}", self.base);
        let body = self.web.get(&url, session).await?;
        scrape_groups(&body)
    }
}

#[async_trait]
impl DriveProvider for XuanfengProvider {
    fn kind(&self) -> &'static str {
        PROVIDER
    }

    /// The task page is a flat listing; the cursor is ignored.
    async fn list_items(
        &self,
        session: &mut CookieSession,
        _cursor: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        let groups = self.fetch_groups(session).await?;
        Ok(groups
            .into_iter()
            .map(|g| RemoteItem {
                id: g.suffix,
                title: g.title,
                size: format!("{}B", readable_size(&g.size)),
                isdir: false,
                path: None,
            })
            .collect())
    }

    async fn resolve_download(
        &self,
        session: &mut CookieSession,
        item: &DownloadItem,
    ) -> Result<ResolvedDownload, ProviderError> {
        let groups = self.fetch_groups(session).await?;
        let group = groups
            .into_iter()
            .find(|g| g.suffix == item.id && !g.url.is_empty())
            .ok_or_else(|| {
                ProviderError::remote(
                    PROVIDER,
                    format!("no download url for task '{}'", item.id),
                )
            })?;
        // The header line is rendered after the fetch above, so it carries
        // whatever token the page rotated via Set-Cookie.
        Ok(ResolvedDownload {
            url: group.url,
            header: Some(session.header_line()),
        })
    }
}

/// Parses the page and collects the complete task groups.
///
/// Kept synchronous on purpose: `scraper::Html` is not `Send` and must never
/// live across an await point.
fn scrape_groups(body: &str) -> Result<Vec<TaskGroup>, ProviderError> {
    let document = Html::parse_document(body);
    let inputs = Selector::parse("input")
        .map_err(|_| ProviderError::shape(PROVIDER, "input selector"))?;

    // One pass: value by id, plus the marker suffixes in page order.
    let mut values: HashMap<String, String> = HashMap::new();
    let mut suffixes: Vec<String> = Vec::new();
    for element in document.select(&inputs) {
        let node = element.value();
        let Some(id) = node.attr("id") else {
            continue;
        };
        values.insert(id.to_string(), node.attr("value").unwrap_or("").to_string());
        if node.attr("name") == Some(MARKER_NAME)
            && let Some(suffix) = id.strip_prefix(MARKER_ID_PREFIX)
        {
            suffixes.push(suffix.to_string());
        }
    }
    if suffixes.is_empty() && values.is_empty() {
        return Err(ProviderError::shape(PROVIDER, "task page markup"));
    }

    let field = |name: &str, suffix: &str| -> String {
        values
            .get(&format!("{name}_{suffix}"))
            .cloned()
            .unwrap_or_default()
    };

    Ok(suffixes
        .into_iter()
        .map(|suffix| TaskGroup {
            status: field("task_status", &suffix),
            title: field("task_title", &suffix),
            size: field("task_size", &suffix),
            url: field("task_url", &suffix),
            suffix,
        })
        .filter(|g| g.status == STATUS_COMPLETE)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::SessionCookie;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task_markup(suffix: &str, status: &str, title: &str, size: &str, url: &str) -> String {
        format!(
            concat!(
                r#"<input type="hidden" name="lixian_item" id="lixian_item_{s}">"#,
                r#"<input type="hidden" id="task_status_{s}" value="{status}">"#,
                r#"<input type="hidden" id="task_title_{s}" value="{title}">"#,
                r#"<input type="hidden" id="task_size_{s}" value="{size}">"#,
                r#"<input type="hidden" id="task_url_{s}" value="{url}">"#,
            ),
            s = suffix,
            status = status,
            title = title,
            size = size,
            url = url
        )
    }

    fn page(tasks: &[String]) -> String {
        format!(
            "<html><body><div id=\"tasks\">{}</div></body></html>",
            tasks.join("")
        )
    }

    #[test]
    fn scrape_emits_only_complete_groups() {
        let body = page(&[
            task_markup("101", "2", "done.zip", "1536", "http://dl/a"),
            task_markup("102", "1", "pending.zip", "99", "http://dl/b"),
            task_markup("103", "2", "also-done.zip", "512", "http://dl/c"),
        ]);
        let groups = scrape_groups(&body).unwrap();
        let suffixes: Vec<&str> = groups.iter().map(|g| g.suffix.as_str()).collect();
        assert_eq!(suffixes, ["101", "103"]);
        assert_eq!(groups[0].title, "done.zip");
        assert_eq!(groups[0].url, "http://dl/a");
    }

    #[test]
    fn scrape_tolerates_missing_sibling_fields() {
        let body = page(&[
            r#"<input name="lixian_item" id="lixian_item_7"><input id="task_status_7" value="2">"#
                .to_string(),
        ]);
        let groups = scrape_groups(&body).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title, "");
        assert_eq!(groups[0].url, "");
    }

    #[test]
    fn scrape_rejects_markup_without_inputs() {
        let err = scrape_groups("<html><body>login please</body></html>").unwrap_err();
        assert!(matches!(err, ProviderError::Shape { .. }));
    }

    #[tokio::test]
    async fn list_items_renders_readable_sizes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/main.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(&[task_markup(
                "101",
                "2",
                "done.zip",
                "1536",
                "http://dl/a",
            )])))
            .mount(&server)
            .await;

        let provider = XuanfengProvider::with_base_url(server.uri());
        let mut session = CookieSession::default();
        let items = provider.list_items(&mut session, "").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "101");
        assert_eq!(items[0].size, "1.50KB");
        assert!(!items[0].isdir);
    }

    #[tokio::test]
    async fn resolve_download_reflects_rotated_token_in_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/main.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "FTN5K=rotated; Path=/")
                    .set_body_string(page(&[task_markup(
                        "101",
                        "2",
                        "done.zip",
                        "1536",
                        "http://dl/a",
                    )])),
            )
            .mount(&server)
            .await;

        let provider = XuanfengProvider::with_base_url(server.uri());
        let mut session = CookieSession::new(vec![SessionCookie {
            name: "FTN5K".into(),
            value: "stale".into(),
        }]);
        let resolved = provider
            .resolve_download(
                &mut session,
                &DownloadItem {
                    id: "101".into(),
                    title: "done.zip".into(),
                    path: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.url, "http://dl/a");
        // Resolving and updating the session are one step: the returned
        // header already carries the rotated token.
        assert_eq!(resolved.header.as_deref(), Some("Cookie: FTN5K=rotated"));
        assert!(session.is_dirty());
    }

    #[tokio::test]
    async fn resolve_download_unknown_suffix_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/main.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(&[task_markup(
                "101",
                "2",
                "done.zip",
                "1536",
                "http://dl/a",
            )])))
            .mount(&server)
            .await;

        let provider = XuanfengProvider::with_base_url(server.uri());
        let mut session = CookieSession::default();
        let err = provider
            .resolve_download(
                &mut session,
                &DownloadItem {
                    id: "999".into(),
                    ..DownloadItem::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Remote { .. }));
    }
}
