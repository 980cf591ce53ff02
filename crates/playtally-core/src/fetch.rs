//! Fetching the current play count from the external source.
//!
//! The scheduler only needs [`MetricFetcher`]. [`HttpFetcher`] is the
//! production implementation: one GET per attempt with a fixed timeout,
//! bounded retries with linear backoff, then [`extract_play_count`] on the
//! page body.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::config::FetchSettings;
use crate::error::FetchError;

/// Capability to read the current value behind a locator.
#[async_trait]
pub trait MetricFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<u64, FetchError>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded retries; the delay before retry `n` is `backoff * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `op` receives the 1-based attempt number. Errors that are not
    /// [`FetchError::is_transient`] are returned immediately; exhausting the
    /// retries wraps the last error in [`FetchError::Exhausted`].
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let delay = self.delay_after(attempt);
                    log::warn!("attempt {attempt} failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() && attempt > 1 => {
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP fetcher
// ---------------------------------------------------------------------------

/// Scrapes the play count from a public song or album page.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                backoff: settings.backoff(),
            },
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<u64, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(request_error)?;
        extract_play_count(&body).ok_or_else(|| FetchError::PlayCountNotFound {
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl MetricFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<u64, FetchError> {
        log::debug!("fetching play count from {locator}");
        let count = self.retry.run(|_| self.fetch_once(locator)).await?;
        log::debug!("{locator}: {count} plays");
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Class lists of the `<p>` element carrying the count on song pages.
const SONG_P_CLASSES: &[&str] = &[
    "u-centi u-deci@lg u-color-js-gray u-ellipsis@lg u-margin-bottom-tiny@sm",
    "u-centi u-deci@lg u-color-js-gray",
];
/// Class list of the `<span>` carrying the count on album pages.
const ALBUM_SPAN_CLASS: &str = "u-centi u-hidden@lg";

static P_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<p\b[^>]*?\bclass\s*=\s*"([^"]*)"[^>]*>(.*?)</p\s*>"#).expect("valid regex")
});
static SPAN_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span\b[^>]*?\bclass\s*=\s*"([^"]*)"[^>]*>(.*?)</span\s*>"#)
        .expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static NON_TEXT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>").expect("valid regex")
});
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?[A-Za-z0-9]+;").expect("valid regex"));
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,.]*)\s*$").expect("valid regex"));

/// Find the play count in a song or album page.
///
/// Looks, in order, at the song-page `<p>` elements, the album-page `<span>`,
/// and finally every text node, taking the number right before the word
/// "Play" (`"1,234,567 Plays"` → `1234567`).
pub fn extract_play_count(html: &str) -> Option<u64> {
    let elements = |re: &Regex, classes: &[&str]| -> Option<u64> {
        re.captures_iter(html)
            .filter(|c| classes.contains(&normalize_class(&c[1]).as_str()))
            .find_map(|c| count_before_play(&text_of(&c[2])))
    };

    elements(&P_ELEMENT, SONG_P_CLASSES)
        .or_else(|| elements(&SPAN_ELEMENT, &[ALBUM_SPAN_CLASS]))
        .or_else(|| {
            let visible = NON_TEXT_BLOCK.replace_all(html, " ");
            TAG.split(&visible)
                .map(decode_entities)
                .find_map(|text| count_before_play(&text))
        })
}

fn normalize_class(class: &str) -> String {
    class.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of(fragment: &str) -> String {
    decode_entities(&TAG.replace_all(fragment, " "))
}

fn decode_entities(text: &str) -> String {
    ENTITY.replace_all(text, " ").into_owned()
}

/// Number immediately preceding the first "Play" in `text`.
fn count_before_play(text: &str) -> Option<u64> {
    let (before, _) = text.split_once("Play")?;
    let number = TRAILING_NUMBER.captures(before)?;
    let digits: String = number[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
