//! Upstream fetch client: pulls warp history pages with a short-lived
//! authkey and flattens them into raw records for the validator.
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::codec::RawRecord;
use crate::error::LedgerError;
use crate::record::PoolType;

/// Upstream retcode for a malformed authkey. Terminal, no retry.
const RETCODE_INVALID_AUTHKEY: i32 = -100;
/// Upstream retcode for an expired authkey. Terminal but distinguished so
/// the caller can tell the user to regenerate the key.
const RETCODE_AUTHKEY_TIMEOUT: i32 = -101;

/// Seam for obtaining raw records from the upstream game service.
///
/// The engine only depends on this trait; tests substitute canned sources.
pub trait WarpSource {
    /// Fetch the full available history for one account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAuthkey`], [`LedgerError::AuthkeyTimeout`]
    /// or [`LedgerError::Fetch`] per the failure taxonomy.
    fn fetch(&self, uid: &str, authkey: &str) -> Result<Vec<RawRecord>, LedgerError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    retcode: i32,
    #[serde(default)]
    message: String,
    data: Option<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    list: Vec<RawRecord>,
}

/// Blocking HTTP client for the upstream history endpoint.
///
/// Pages through each pool with an `end_id` cursor; pages arrive reverse
/// chronological and are flattened as-is (the merge engine re-sorts).
/// Transport-level failures get a small bounded retry; authkey rejections
/// are terminal.
pub struct HttpWarpSource {
    agent: ureq::Agent,
    base_url: String,
    page_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpWarpSource {
    /// Build a client against the given history endpoint URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(15))
            .build();
        Self {
            agent,
            base_url: base_url.into(),
            page_size: 20,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Override the retry budget (count and backoff between attempts).
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    fn fetch_page(
        &self,
        authkey: &str,
        pool_type: PoolType,
        end_id: &str,
    ) -> Result<Vec<RawRecord>, LedgerError> {
        let mut attempt = 0;
        let envelope: Envelope = loop {
            let result = self
                .agent
                .get(&self.base_url)
                .query("authkey", authkey)
                .query("authkey_ver", "1")
                .query("gacha_type", pool_type.wire_token())
                .query("size", &self.page_size.to_string())
                .query("end_id", end_id)
                .call();
            match result {
                Ok(response) => {
                    break response
                        .into_json()
                        .map_err(|err| LedgerError::Fetch(format!("bad response body: {err}")))?;
                }
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    attempt += 1;
                    warn!(
                        "transient fetch failure for pool {} (attempt {attempt}): {err}",
                        pool_type.wire_token()
                    );
                    thread::sleep(self.retry_backoff);
                }
                Err(err) => return Err(LedgerError::Fetch(err.to_string())),
            }
        };

        match envelope.retcode {
            0 => Ok(envelope.data.map(|page| page.list).unwrap_or_default()),
            RETCODE_INVALID_AUTHKEY => Err(LedgerError::InvalidAuthkey),
            RETCODE_AUTHKEY_TIMEOUT => Err(LedgerError::AuthkeyTimeout),
            retcode => Err(LedgerError::Fetch(format!(
                "upstream retcode {retcode}: {}",
                envelope.message
            ))),
        }
    }
}

fn is_transient(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::Transport(_) => true,
        ureq::Error::Status(code, _) => *code >= 500,
    }
}

/// Upper bound on pages fetched per pool before giving up on the upstream.
const MAX_PAGES_PER_POOL: usize = 1000;

/// Cursor for the next page, or `None` when pagination is done: a short
/// page means the history is exhausted, and a cursor that does not advance
/// means the upstream is stuck repeating itself.
fn next_cursor(page: &[RawRecord], previous: &str, page_size: usize) -> Option<String> {
    let last = page.last()?;
    if page.len() < page_size || last.id == previous {
        return None;
    }
    Some(last.id.clone())
}

impl WarpSource for HttpWarpSource {
    fn fetch(&self, uid: &str, authkey: &str) -> Result<Vec<RawRecord>, LedgerError> {
        let mut records = Vec::new();
        for pool_type in PoolType::ALL {
            let mut end_id = "0".to_string();
            let mut pages = 0usize;
            loop {
                let page = self.fetch_page(authkey, pool_type, &end_id)?;
                let cursor = next_cursor(&page, &end_id, self.page_size);
                records.extend(page);
                let Some(next) = cursor else {
                    break;
                };
                end_id = next;
                pages += 1;
                if pages >= MAX_PAGES_PER_POOL {
                    warn!(
                        "pool {} exceeded {MAX_PAGES_PER_POOL} pages, stopping",
                        pool_type.wire_token()
                    );
                    break;
                }
            }
            debug!(
                "fetched pool {} for uid {uid}: {} records so far",
                pool_type.wire_token(),
                records.len()
            );
        }
        Ok(records)
    }
}

/// Pull the `authkey` query parameter out of a pasted URL (or return the
/// input unchanged when it does not look like a URL).
#[must_use]
pub fn authkey_from_url(text: &str) -> Option<String> {
    let text = text.trim();
    if !text.contains("authkey=") {
        return if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
    }
    let start = text.find("authkey=")? + "authkey=".len();
    let rest = &text[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    let raw = &rest[..end];
    if raw.is_empty() {
        return None;
    }
    Some(percent_decode(raw))
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let pair = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            );
            if let (Some(hi), Some(lo)) = pair {
                out.push(u8::try_from(hi * 16 + lo).unwrap_or(b'%'));
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
