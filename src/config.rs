//! Connection settings for the movement store.

use std::time::Duration;

use crate::store::MOVEMENTS_TABLE;

/// How long to wait for the store before giving up on a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How many rows to ask for per request. Supabase answers with at most 1000
/// rows unless its `max_rows` setting is raised.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Where the movement store lives and how to authenticate with it.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// The project URL, e.g. "https://abc.supabase.co".
    pub base_url: String,
    /// The anonymous API key, sent both as `apikey` and as a bearer token.
    pub api_key: String,
    /// The table holding the movements.
    pub table: String,
    /// The per-request timeout.
    pub timeout: Duration,
    /// The rows fetched per request. Must not exceed the server's `max_rows`,
    /// since a page shorter than this ends the fetch.
    pub page_size: usize,
}

impl StoreConfig {
    /// Create a config for the default movements table.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Whether both the URL and the key are set.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            table: MOVEMENTS_TABLE.to_owned(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// The key is a credential, keep it out of the logs.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"********")
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .field("page_size", &self.page_size)
            .finish()
    }
}
