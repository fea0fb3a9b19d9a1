//! Session-aware HTTP fetches shared by the provider adapters.
//!
//! Every provider call goes through [`WebClient`]: the account's cookies are
//! attached on the way out and, on a successful response, any `Set-Cookie`
//! values are folded back into the session before the body is handed to the
//! caller. Token rotation therefore needs no per-provider code.

use reqwest::header;

use crate::auth::CookieSession;

use super::ProviderError;

/// Matches what the provider sites serve to a desktop browser; some of them
/// answer login redirects to unknown agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// HTTP client wrapper that pairs every request with a [`CookieSession`].
#[derive(Debug, Clone)]
pub struct WebClient {
    http: reqwest::Client,
}

impl WebClient {
    /// Creates a client with the shared browser user agent. No explicit
    /// timeout is configured; callers inherit the reqwest default.
    #[must_use]
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    /// GETs `url` with the session's cookies attached.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] / [`ProviderError::Status`] for
    /// wire and HTTP failures.
    pub async fn get(
        &self,
        url: &str,
        session: &mut CookieSession,
    ) -> Result<String, ProviderError> {
        self.execute(self.http.get(url), url, session).await
    }

    /// POSTs a form-encoded body with the session's cookies attached. The
    /// provider APIs insist on an explicit content type and referer.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] / [`ProviderError::Status`] for
    /// wire and HTTP failures.
    pub async fn post_form(
        &self,
        url: &str,
        body: String,
        referer: &str,
        session: &mut CookieSession,
    ) -> Result<String, ProviderError> {
        let builder = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::REFERER, referer)
            .body(body);
        self.execute(builder, url, session).await
    }

    async fn execute(
        &self,
        mut builder: reqwest::RequestBuilder,
        url: &str,
        session: &mut CookieSession,
    ) -> Result<String, ProviderError> {
        if !session.is_empty() {
            builder = builder.header(header::COOKIE, session.header_value());
        }

        let response = builder
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Required side effect of every successful fetch: the sites rotate
        // per-request tokens and later calls must see the new values.
        let rotated: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        session.update_from_set_cookie(rotated.iter().map(String::as_str));

        response
            .text()
            .await
            .map_err(|source| ProviderError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

impl Default for WebClient {
    fn default() -> Self {
        Self::new()
    }
}
