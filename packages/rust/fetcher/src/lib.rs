//! Profile page fetching and description extraction.
//!
//! Fetches one account's public profile page through the current proxy and
//! extracts the description element's text. Failures never escape
//! [`ProfileFetcher::fetch`]: they are folded into [`FetchOutcome`] so the
//! scheduler can apply its retry policy.

use std::time::Duration;

use scraper::{Html, Selector};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use saturator_shared::{Result, SaturatorError};

/// User-Agent string for profile requests.
const USER_AGENT: &str = concat!("Saturator/", env!("CARGO_PKG_VERSION"));

/// CSS selector for the profile description element.
const DESCRIPTION_SELECTOR: &str = ".tgme_page_description";

/// Sentinel phrase a profile page shows when the description is only an
/// external-app notice. A page whose extracted text contains this phrase
/// carries no real description and is treated as a soft failure.
///
/// The missing space is real: the markup nests the app name in a tag, so
/// the stripped text fragments join without one.
pub const EXTERNAL_NOTICE_SENTINEL: &str = "If you haveTelegram, you can";

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Classification of one profile fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A real description was extracted. Terminal.
    Described(String),
    /// The page parsed fine but has no description element. Terminal.
    NoDescription,
    /// Network error, non-2xx response, parse failure, or the
    /// external-notice sentinel. Eligible for retry.
    TransientFailure,
}

// ---------------------------------------------------------------------------
// ProfileFetcher
// ---------------------------------------------------------------------------

/// Fetches profile pages through a proxy.
///
/// The underlying HTTP client is rebuilt once per batch via
/// [`refresh_session`](Self::refresh_session) rather than held for the
/// run's lifetime.
pub struct ProfileFetcher {
    base: Url,
    proxy: String,
    timeout: Duration,
    client: RwLock<reqwest::Client>,
}

impl ProfileFetcher {
    /// Create a fetcher for profiles under `base_url`, routed through
    /// `proxy`. An empty proxy string disables proxying (used in tests).
    pub fn new(base_url: &str, proxy: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            SaturatorError::config(format!("invalid profile base URL {base_url}: {e}"))
        })?;
        let proxy = proxy.into();
        let client = build_client(&proxy, timeout)?;

        Ok(Self {
            base,
            proxy,
            timeout,
            client: RwLock::new(client),
        })
    }

    /// Replace the HTTP client, dropping any pooled connections from the
    /// previous batch.
    pub async fn refresh_session(&self) -> Result<()> {
        let client = build_client(&self.proxy, self.timeout)?;
        *self.client.write().await = client;
        Ok(())
    }

    /// Fetch `account`'s profile page and classify the result.
    ///
    /// Never returns an error: anything that goes wrong is a
    /// [`FetchOutcome::TransientFailure`].
    pub async fn fetch(&self, account: &str) -> FetchOutcome {
        match self.try_fetch(account).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(account, error = %e, "profile fetch failed");
                FetchOutcome::TransientFailure
            }
        }
    }

    async fn try_fetch(&self, account: &str) -> Result<FetchOutcome> {
        let url = self
            .base
            .join(account)
            .map_err(|e| SaturatorError::validation(format!("bad account name {account}: {e}")))?;

        let client = self.client.read().await.clone();
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SaturatorError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SaturatorError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SaturatorError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(classify(&body))
    }
}

/// Build a per-batch HTTP client.
///
/// Certificate validation is disabled: profile pages are served over a
/// best-effort public endpoint, often behind intercepting proxies.
fn build_client(proxy: &str, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(true)
        .timeout(timeout);

    if !proxy.is_empty() {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| SaturatorError::Network(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| SaturatorError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a fetched profile page body.
pub fn classify(html: &str) -> FetchOutcome {
    match extract_description(html) {
        Some(text) if text.contains(EXTERNAL_NOTICE_SENTINEL) => FetchOutcome::TransientFailure,
        Some(text) => FetchOutcome::Described(text),
        None => FetchOutcome::NoDescription,
    }
}

/// Extract the description element's text, with each fragment stripped of
/// surrounding whitespace and the fragments joined.
fn extract_description(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(DESCRIPTION_SELECTOR).unwrap();

    doc.select(&selector).next().map(|el| {
        el.text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .concat()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_with_description(text: &str) -> String {
        format!(
            r#"<html><body>
                <div class="tgme_page">
                    <div class="tgme_page_description">{text}</div>
                </div>
            </body></html>"#
        )
    }

    #[test]
    fn classify_extracts_description() {
        let html = page_with_description("A channel about rust.");
        assert_eq!(
            classify(&html),
            FetchOutcome::Described("A channel about rust.".into())
        );
    }

    #[test]
    fn classify_joins_stripped_fragments() {
        let html = page_with_description("  News and\n  <b>updates</b>  ");
        assert_eq!(
            classify(&html),
            FetchOutcome::Described("News andupdates".into())
        );
    }

    #[test]
    fn classify_missing_element_is_no_description() {
        let html = "<html><body><div class=\"tgme_page\">no desc here</div></body></html>";
        assert_eq!(classify(html), FetchOutcome::NoDescription);
    }

    #[test]
    fn classify_external_notice_is_transient() {
        let html = page_with_description(
            "If you have<i>Telegram</i>, you can contact @someone right away.",
        );
        assert_eq!(classify(&html), FetchOutcome::TransientFailure);
    }

    #[tokio::test]
    async fn fetch_classifies_served_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rustlings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(page_with_description("Learn Rust daily")),
            )
            .mount(&server)
            .await;

        let fetcher = ProfileFetcher::new(&server.uri(), "", Duration::from_secs(5)).unwrap();
        assert_eq!(
            fetcher.fetch("rustlings").await,
            FetchOutcome::Described("Learn Rust daily".into())
        );
    }

    #[tokio::test]
    async fn fetch_non_success_status_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ProfileFetcher::new(&server.uri(), "", Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.fetch("ghost").await, FetchOutcome::TransientFailure);
    }

    #[tokio::test]
    async fn fetch_connection_error_is_transient() {
        // Nothing is listening on this port.
        let fetcher =
            ProfileFetcher::new("http://127.0.0.1:9", "", Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.fetch("anyone").await, FetchOutcome::TransientFailure);
    }

    #[tokio::test]
    async fn refresh_session_keeps_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_with_description("still here")),
            )
            .mount(&server)
            .await;

        let fetcher = ProfileFetcher::new(&server.uri(), "", Duration::from_secs(5)).unwrap();
        fetcher.refresh_session().await.unwrap();
        assert_eq!(
            fetcher.fetch("abc").await,
            FetchOutcome::Described("still here".into())
        );
    }
}
