//! Cookie session held for one cloud-drive account.
//!
//! A session is loaded once from the account's cookie file and then mutated
//! only through `Set-Cookie` rotation: provider sites reissue per-request
//! tokens (e.g. `FTN5K`) and every later call for that account must see the
//! updated value, so folding response cookies back in is a required side
//! effect of a successful fetch, not an optimization.

use serde::{Deserialize, Serialize};

/// One cookie pair as stored in the account's cookie file.
///
/// Capitalized `Name`/`Value` keys are accepted on load for files exported by
/// older tooling; extra fields (path, domain, expiry) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Value")]
    pub value: String,
}

/// Ordered cookie set for one account.
#[derive(Debug, Clone, Default)]
pub struct CookieSession {
    cookies: Vec<SessionCookie>,
    dirty: bool,
}

impl CookieSession {
    /// Creates a session from already-parsed cookie pairs.
    #[must_use]
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies,
            dirty: false,
        }
    }

    /// Parses a session from the JSON cookie-file format (an array of
    /// name/value objects).
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the file is not a JSON
    /// array of cookie objects.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let cookies: Vec<SessionCookie> = serde_json::from_str(content)?;
        Ok(Self::new(cookies))
    }

    /// Serializes the session back into the cookie-file format.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error (not expected for this type).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.cookies)
    }

    /// Looks up a cookie value by name. A missing cookie is a valid
    /// "not present" state, so this returns an empty string, never an error.
    #[must_use]
    pub fn value_of(&self, name: &str) -> &str {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map_or("", |c| c.value.as_str())
    }

    /// Inserts or replaces a cookie, preserving insertion order.
    pub fn update(&mut self, name: &str, value: &str) {
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.name == name) {
            if existing.value != value {
                existing.value = value.to_string();
                self.dirty = true;
            }
        } else {
            self.cookies.push(SessionCookie {
                name: name.to_string(),
                value: value.to_string(),
            });
            self.dirty = true;
        }
    }

    /// Renders the cookie pairs as a request header value: `k1=v1; k2=v2`.
    #[must_use]
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Renders a full header line (`Cookie: k1=v1; k2=v2`) for callers that
    /// inject cookies into a transport outside this process, such as aria2's
    /// own outbound fetch.
    #[must_use]
    pub fn header_line(&self) -> String {
        format!("Cookie: {}", self.header_value())
    }

    /// Folds `Set-Cookie` header values from a successful response into the
    /// session. Only the leading `name=value` segment of each header matters;
    /// attributes after the first `;` are dropped.
    pub fn update_from_set_cookie<'a>(&mut self, headers: impl IntoIterator<Item = &'a str>) {
        for raw in headers {
            let pair = raw.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.update(name, value.trim());
                }
            }
        }
    }

    /// True when the session changed since load (or since the last
    /// [`CookieSession::mark_clean`]) and should be persisted.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag after the caller has persisted the session.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// True when the session holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}
