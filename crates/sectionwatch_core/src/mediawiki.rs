use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::config::WatchConfig;

const CATEGORY_PAGE_BATCH: usize = 50;

/// Listing entry for one page of the watched category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: String,
    pub is_redirect: bool,
    pub latest_revision_id: i64,
    pub latest_revision_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSnapshot {
    pub revision_id: i64,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

impl RevisionSnapshot {
    /// Stand-in for the older side when a page has no revision before the checkpoint.
    pub fn empty_baseline(timestamp: DateTime<Utc>) -> Self {
        Self {
            revision_id: 0,
            timestamp,
            content: String::new(),
        }
    }
}

pub trait PageSource: Sync {
    /// Lazily page through the members of `category`. An `Err` item ends the stream.
    fn category_pages<'a>(
        &'a self,
        category: &str,
    ) -> Box<dyn Iterator<Item = Result<PageMetadata>> + 'a>;
}

pub trait RevisionFetcher: Sync {
    /// Latest revision of `title`, or the latest one not newer than `at_or_before`.
    fn fetch_revision(
        &self,
        title: &str,
        at_or_before: Option<DateTime<Utc>>,
    ) -> Result<Option<RevisionSnapshot>>;
}

pub trait Publisher {
    fn update_content(
        &self,
        title: &str,
        text: &str,
        summary: &str,
        minor: bool,
        bot: bool,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &WatchConfig) -> Self {
        let api_default = config.api_url().unwrap_or_default();
        Self::from_env_with_defaults(&api_default, &config.user_agent())
    }

    fn from_env_with_defaults(api_url_default: &str, user_agent_default: &str) -> Self {
        Self {
            api_url: env_value("WIKI_API_URL", api_url_default),
            user_agent: env_value("WIKI_USER_AGENT", user_agent_default),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

#[derive(Debug, Default)]
struct ClientState {
    next_request_at: Option<Instant>,
    csrf_token: Option<String>,
}

/// Blocking MediaWiki API client shared by all scanner workers.
pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    state: Mutex<ClientState>,
    request_count: AtomicUsize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("WIKI_API_URL is not configured (set it in the environment or [wiki].api_url)");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            state: Mutex::new(ClientState::default()),
            request_count: AtomicUsize::new(0),
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.lock_state().csrf_token = None;
                log::info!("logged in to {} as {username}", self.config.api_url);
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn fetch_category_batch(
        &self,
        category_title: &str,
        continuation: &BTreeMap<String, String>,
    ) -> Result<(Vec<PageMetadata>, Option<BTreeMap<String, String>>)> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("generator", "categorymembers".to_string()),
            ("gcmtitle", category_title.to_string()),
            ("gcmtype", "page".to_string()),
            ("gcmlimit", CATEGORY_PAGE_BATCH.to_string()),
            ("prop", "info|revisions".to_string()),
            ("rvprop", "ids|timestamp".to_string()),
        ];
        for (key, value) in continuation {
            params.push((key.as_str(), value.clone()));
        }
        let response = self.request_json_get(&params)?;
        parse_category_batch(response)
    }

    fn request_json_get(&self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;
        let pairs = request_pairs(params);

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(false);
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, false);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    return check_api_error(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        log::debug!("retrying MediaWiki GET after error: {error}");
                        self.wait_before_retry(attempt, false);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn request_json_post(&self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };
        let pairs = request_pairs(params);

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let response = self
                .client
                .post(&self.config.api_url)
                .header("User-Agent", self.config.user_agent.clone())
                .form(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    return check_api_error(payload);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        log::debug!("retrying MediaWiki POST after error: {error}");
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    /// Reserve the next request slot under the lock, then sleep outside it.
    fn apply_rate_limit(&self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        let now = Instant::now();
        let start_at = {
            let mut state = self.lock_state();
            let start_at = match state.next_request_at {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            state.next_request_at = Some(start_at + delay);
            start_at
        };
        if start_at > now {
            sleep(start_at - now);
        }
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&self) -> Result<String> {
        if let Some(token) = self.lock_state().csrf_token.clone() {
            return Ok(token);
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.lock_state().csrf_token = Some(token.clone());
        Ok(token)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PageSource for MediaWikiClient {
    fn category_pages<'a>(
        &'a self,
        category: &str,
    ) -> Box<dyn Iterator<Item = Result<PageMetadata>> + 'a> {
        Box::new(CategoryPages {
            client: self,
            category_title: category_title(category),
            continuation: Some(BTreeMap::new()),
            buffer: VecDeque::new(),
        })
    }
}

impl RevisionFetcher for MediaWikiClient {
    fn fetch_revision(
        &self,
        title: &str,
        at_or_before: Option<DateTime<Utc>>,
    ) -> Result<Option<RevisionSnapshot>> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "ids|timestamp|content".to_string()),
            ("rvslots", "main".to_string()),
            ("rvlimit", "1".to_string()),
            ("rvdir", "older".to_string()),
        ];
        if let Some(bound) = at_or_before {
            params.push(("rvstart", format_api_timestamp(bound)));
        }
        let response = self.request_json_get(&params)?;
        parse_revision_response(title, response)
    }
}

impl Publisher for MediaWikiClient {
    fn update_content(
        &self,
        title: &str,
        text: &str,
        summary: &str,
        minor: bool,
        bot: bool,
    ) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let response = self.request_json_post(
            &[
                ("action", "edit".to_string()),
                ("title", title.to_string()),
                ("text", text.to_string()),
                ("summary", summary.to_string()),
                ("minor", flag_param(minor)),
                ("bot", flag_param(bot)),
                ("token", token),
            ],
            true,
        )?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }
}

/// Lazy, paginated walk over a category; fetches the next batch only when drained.
struct CategoryPages<'a> {
    client: &'a MediaWikiClient,
    category_title: String,
    continuation: Option<BTreeMap<String, String>>,
    buffer: VecDeque<PageMetadata>,
}

impl Iterator for CategoryPages<'_> {
    type Item = Result<PageMetadata>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(page) = self.buffer.pop_front() {
                return Some(Ok(page));
            }
            let continuation = self.continuation.take()?;
            match self
                .client
                .fetch_category_batch(&self.category_title, &continuation)
            {
                Ok((pages, next)) => {
                    log::debug!(
                        "{}: fetched {} category members",
                        self.category_title,
                        pages.len()
                    );
                    self.buffer.extend(pages);
                    self.continuation = next;
                }
                Err(error) => {
                    return Some(Err(error.context(format!(
                        "failed to enumerate {}",
                        self.category_title
                    ))));
                }
            }
        }
    }
}

fn parse_category_batch(
    response: Value,
) -> Result<(Vec<PageMetadata>, Option<BTreeMap<String, String>>)> {
    let parsed: QueryResponse = serde_json::from_value(response)
        .context("failed to decode categorymembers API response")?;

    let mut pages = Vec::with_capacity(parsed.query.pages.len());
    for page in parsed.query.pages {
        if page.missing.unwrap_or(false) {
            continue;
        }
        let Some(revision) = page.revisions.first() else {
            log::warn!("{}: listed without a revision, skipping", page.title);
            continue;
        };
        pages.push(PageMetadata {
            latest_revision_at: parse_api_timestamp(&revision.timestamp)?,
            latest_revision_id: revision.revid,
            is_redirect: page.redirect,
            title: page.title,
        });
    }

    let continuation = parsed.continuation.map(|entries| {
        entries
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(text) => Some((key, text)),
                Value::Number(number) => Some((key, number.to_string())),
                _ => None,
            })
            .collect::<BTreeMap<_, _>>()
    });
    Ok((pages, continuation.filter(|entries| !entries.is_empty())))
}

fn parse_revision_response(title: &str, response: Value) -> Result<Option<RevisionSnapshot>> {
    let parsed: QueryResponse = serde_json::from_value(response)
        .with_context(|| format!("failed to decode revision response for {title}"))?;
    let page = parsed
        .query
        .pages
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("revision response for {title} contained no page"))?;
    if page.missing.unwrap_or(false) {
        bail!("page {title} is missing on the wiki");
    }
    let Some(revision) = page.revisions.into_iter().next() else {
        return Ok(None);
    };
    let content = revision
        .slots
        .and_then(|slots| slots.main)
        .and_then(|slot| slot.content)
        .ok_or_else(|| {
            anyhow::anyhow!("revision {} of {title} has no readable content", revision.revid)
        })?;
    Ok(Some(RevisionSnapshot {
        revision_id: revision.revid,
        timestamp: parse_api_timestamp(&revision.timestamp)?,
        content,
    }))
}

fn check_api_error(payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(payload)
}

fn request_pairs(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        if !value.is_empty() {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn category_title(category: &str) -> String {
    if category.starts_with("Category:") {
        category.to_string()
    } else {
        format!("Category:{category}")
    }
}

fn flag_param(value: bool) -> String {
    if value { "1".to_string() } else { String::new() }
}

pub fn parse_api_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .with_context(|| format!("invalid MediaWiki timestamp: {value}"))
}

pub fn format_api_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    title: String,
    missing: Option<bool>,
    #[serde(default)]
    redirect: bool,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn category_batch_parses_redirects_and_continuation() {
        let response = json!({
            "batchcomplete": false,
            "continue": {"gcmcontinue": "page|4a|123", "continue": "gcmcontinue||"},
            "query": {"pages": [
                {"pageid": 1, "ns": 0, "title": "Firestar",
                 "revisions": [{"revid": 501, "parentid": 500, "timestamp": "2026-03-01T10:00:00Z"}]},
                {"pageid": 2, "ns": 0, "title": "Rusty", "redirect": true,
                 "revisions": [{"revid": 77, "timestamp": "2020-01-01T00:00:00Z"}]},
                {"pageid": 3, "ns": 0, "title": "Ghost"}
            ]}
        });

        let (pages, continuation) = parse_category_batch(response).expect("parse");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].title, "Firestar");
        assert!(!pages[0].is_redirect);
        assert_eq!(pages[0].latest_revision_id, 501);
        assert_eq!(
            pages[0].latest_revision_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single().expect("valid date")
        );
        assert!(pages[1].is_redirect);

        let continuation = continuation.expect("continuation");
        assert_eq!(
            continuation.get("gcmcontinue").map(String::as_str),
            Some("page|4a|123")
        );
        assert_eq!(
            continuation.get("continue").map(String::as_str),
            Some("gcmcontinue||")
        );
    }

    #[test]
    fn category_batch_without_continue_ends_stream() {
        let response = json!({"batchcomplete": true, "query": {"pages": []}});
        let (pages, continuation) = parse_category_batch(response).expect("parse");
        assert!(pages.is_empty());
        assert!(continuation.is_none());
    }

    #[test]
    fn revision_response_reads_main_slot() {
        let response = json!({"query": {"pages": [{
            "pageid": 1, "ns": 0, "title": "Firestar",
            "revisions": [{"revid": 501, "timestamp": "2026-03-01T10:00:00Z",
                "slots": {"main": {"contentmodel": "wikitext", "content": "Intro\n== Trivia ==\nFact"}}}]
        }]}});
        let snapshot = parse_revision_response("Firestar", response)
            .expect("parse")
            .expect("revision");
        assert_eq!(snapshot.revision_id, 501);
        assert!(snapshot.content.contains("== Trivia =="));
    }

    #[test]
    fn revision_response_without_revisions_is_none() {
        let response = json!({"query": {"pages": [{"pageid": 1, "ns": 0, "title": "Firestar"}]}});
        assert!(
            parse_revision_response("Firestar", response)
                .expect("parse")
                .is_none()
        );
    }

    #[test]
    fn revision_response_for_missing_page_fails() {
        let response =
            json!({"query": {"pages": [{"ns": 0, "title": "Nobody", "missing": true}]}});
        let error = parse_revision_response("Nobody", response).expect_err("must fail");
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn api_error_payload_is_reported() {
        let payload = json!({"error": {"code": "ratelimited", "info": "slow down"}});
        let error = check_api_error(payload).expect_err("must fail");
        assert!(error.to_string().contains("[ratelimited]"));
    }

    #[test]
    fn api_timestamps_round_trip_in_mediawiki_format() {
        let parsed = parse_api_timestamp("2026-02-19T00:00:00Z").expect("parse");
        assert_eq!(format_api_timestamp(parsed), "2026-02-19T00:00:00Z");
    }

    #[test]
    fn request_pairs_drop_empty_values() {
        let pairs = request_pairs(&[("minor", flag_param(false)), ("bot", flag_param(true))]);
        assert!(pairs.iter().all(|(key, _)| key != "minor"));
        assert!(pairs.contains(&("bot".to_string(), "1".to_string())));
        assert_eq!(pairs[0], ("format".to_string(), "json".to_string()));
    }

    #[test]
    fn category_title_adds_namespace_prefix_once() {
        assert_eq!(category_title("Characters"), "Category:Characters");
        assert_eq!(category_title("Category:Clans"), "Category:Clans");
    }
}
