use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "sectionwatch/0.1";
pub const DEFAULT_CATEGORY: &str = "Characters";
pub const DEFAULT_OLDEST_DAYS: i64 = 30;
pub const DEFAULT_MAX_PARALLELISM: usize = 4;
pub const DEFAULT_POOL_CAPACITY: usize = 5;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;
pub const DEFAULT_REPORT_SUMMARY: &str = "Bot: section change report";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WatchConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub watch: WatchSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchSection {
    pub category: String,
    pub oldest_days: i64,
    pub high_interest_markers: Vec<String>,
    pub max_parallelism: usize,
    pub pool_capacity: usize,
    pub flush_interval_secs: u64,
    pub flush_threshold: usize,
    pub report_page: Option<String>,
    pub report_summary: String,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            oldest_days: DEFAULT_OLDEST_DAYS,
            high_interest_markers: vec!["Trivia".to_string()],
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            report_page: None,
            report_summary: DEFAULT_REPORT_SUMMARY.to_string(),
        }
    }
}

impl WatchConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url(&self) -> Option<String> {
        env_override("WIKI_API_URL").or_else(|| self.wiki.api_url.clone())
    }

    /// Resolve the wiki base URL: env WIKI_URL > config > derived from api_url.
    pub fn wiki_url(&self) -> Option<String> {
        if let Some(value) = env_override("WIKI_URL") {
            return Some(value);
        }
        if let Some(ref url) = self.wiki.url {
            return Some(url.clone());
        }
        self.api_url().and_then(|api| derive_wiki_url(&api))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn report_page(&self) -> Option<&str> {
        self.watch
            .report_page
            .as_deref()
            .map(str::trim)
            .filter(|page| !page.is_empty())
    }
}

/// Load and parse a WatchConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WatchConfig> {
    if !config_path.exists() {
        return Ok(WatchConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WatchConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    let defaults = WatchSection::default();
    format!(
        "# sectionwatch configuration\n\n[wiki]\n# url = \"https://your-wiki.example.org\"\n# api_url = \"https://your-wiki.example.org/api.php\"\n# user_agent = \"{DEFAULT_USER_AGENT}\"\n\n[watch]\ncategory = \"{}\"\noldest_days = {}\nhigh_interest_markers = [\"Trivia\"]\nmax_parallelism = {}\npool_capacity = {}\nflush_interval_secs = {}\nflush_threshold = {}\n# report_page = \"Project:Section changes\"\nreport_summary = \"{}\"\n",
        defaults.category,
        defaults.oldest_days,
        defaults.max_parallelism,
        defaults.pool_capacity,
        defaults.flush_interval_secs,
        defaults.flush_threshold,
        defaults.report_summary,
    )
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn derive_wiki_url(api_url: &str) -> Option<String> {
    let trimmed = api_url.trim();
    let stripped = trimmed
        .strip_suffix("/api.php")
        .or_else(|| trimmed.strip_suffix("/w/api.php"))
        .unwrap_or(trimmed);
    let result = stripped.trim_end_matches('/').to_string();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}
