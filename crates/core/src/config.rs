use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::CrawlError;
use crate::ports::Result;
use crate::selectors::{Selector, SelectorName, SelectorTable};
use crate::utils::sanitize_filename;

pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com/";

/// Bounded waits and fixed settle delays used by the crawler, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Short poll used by convergence loops and optional reveals.
    pub control_wait_ms: u64,
    /// Wait for optional sub-fields of a content container.
    pub field_wait_ms: u64,
    /// Wait for the account header and the post content container.
    pub page_load_wait_ms: u64,
    pub login_wait_ms: u64,
    pub popup_wait_ms: u64,
    pub account_settle_ms: u64,
    pub scroll_settle_ms: u64,
    pub pagination_settle_ms: u64,
    pub reply_settle_ms: u64,
    /// Upper bound on iterations of any single convergence loop.
    pub max_rounds: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            control_wait_ms: 2_000,
            field_wait_ms: 500,
            page_load_wait_ms: 10_000,
            login_wait_ms: 15_000,
            popup_wait_ms: 10_000,
            account_settle_ms: 1_000,
            scroll_settle_ms: 3_000,
            pagination_settle_ms: 3_000,
            reply_settle_ms: 1_000,
            max_rounds: 1_000,
        }
    }
}

impl Timing {
    /// No waits and no sleeps. Used with scripted drivers.
    pub fn immediate() -> Self {
        Self {
            control_wait_ms: 0,
            field_wait_ms: 0,
            page_load_wait_ms: 0,
            login_wait_ms: 0,
            popup_wait_ms: 0,
            account_settle_ms: 0,
            scroll_settle_ms: 0,
            pagination_settle_ms: 0,
            reply_settle_ms: 0,
            max_rounds: 100,
        }
    }

    pub fn control_wait(&self) -> Duration {
        Duration::from_millis(self.control_wait_ms)
    }

    pub fn field_wait(&self) -> Duration {
        Duration::from_millis(self.field_wait_ms)
    }

    pub fn page_load_wait(&self) -> Duration {
        Duration::from_millis(self.page_load_wait_ms)
    }

    pub fn login_wait(&self) -> Duration {
        Duration::from_millis(self.login_wait_ms)
    }

    pub fn popup_wait(&self) -> Duration {
        Duration::from_millis(self.popup_wait_ms)
    }

    pub fn account_settle(&self) -> Duration {
        Duration::from_millis(self.account_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn pagination_settle(&self) -> Duration {
        Duration::from_millis(self.pagination_settle_ms)
    }

    pub fn reply_settle(&self) -> Duration {
        Duration::from_millis(self.reply_settle_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    base_url: Option<String>,
    timing: Timing,
    selectors: HashMap<String, Selector>,
}

/// Startup configuration: target site, timing and the selector table.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub timing: Timing,
    pub selectors: SelectorTable,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timing: Timing::default(),
            selectors: SelectorTable::default(),
        }
    }
}

impl CrawlerConfig {
    /// Loads the config file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    CrawlError::InvalidArguments(format!(
                        "cannot read config file {}: {e}",
                        path.display()
                    ))
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|e| CrawlError::InvalidArguments(format!("invalid config file: {e}")))?;

        let mut overrides = HashMap::new();
        for (key, selector) in file.selectors {
            let name: SelectorName = key.parse()?;
            overrides.insert(name, selector);
        }

        let mut base_url = file.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            base_url,
            timing: file.timing,
            selectors: SelectorTable::with_overrides(overrides),
        })
    }

    pub fn account_url(&self, account: &str) -> String {
        format!("{}{}", self.base_url, account)
    }
}

/// Login credentials for the crawled site.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Both values must be non-blank; otherwise there is nothing to log in with.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password))
                if !username.trim().is_empty() && !password.is_empty() =>
            {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `<data-dir>/<account>-post-urls.txt`
pub fn post_list_path(data_dir: &Path, account: &str) -> PathBuf {
    data_dir.join(format!("{}-post-urls.txt", sanitize_filename(account)))
}

/// `<data-dir>/tabular/<account>.sqlite`
pub fn record_table_path(data_dir: &Path, account: &str) -> PathBuf {
    data_dir
        .join("tabular")
        .join(format!("{}.sqlite", sanitize_filename(account)))
}
