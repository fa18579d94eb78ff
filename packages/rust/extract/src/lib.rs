//! Clients for the two third-party article-extraction services.
//!
//! Given an article URL, drivedb asks a primary parser service (Mercury-style,
//! authenticated with an API key) and a secondary markdown-converter service
//! for the article's title, HTML content, lead image and byline. Both are
//! always queried, concurrently; deciding which answer wins per field is the
//! caller's job.

use std::time::Duration;

use drivedb_shared::{DriveDbError, ExtractionConfig, Result, secret_from_env};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Maximum number of redirects to follow per request.
const MAX_REDIRECTS: usize = 5;

/// Responses larger than this are rejected (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// User-Agent string for extraction requests.
const USER_AGENT: &str = concat!("drivedb/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ExtractedArticle
// ---------------------------------------------------------------------------

/// What one extraction service reported about an article.
///
/// Every field is optional; blank strings are normalized to `None` so that
/// "present" always means "non-blank".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExtractedArticle {
    #[serde(default, deserialize_with = "present_string")]
    pub title: Option<String>,
    /// Article body as HTML.
    #[serde(default, deserialize_with = "present_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "present_string")]
    pub lead_image_url: Option<String>,
    #[serde(default, deserialize_with = "present_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "present_string")]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "present_string")]
    pub excerpt: Option<String>,
    /// Publication timestamp as sent by the service (usually RFC 3339).
    #[serde(default, deserialize_with = "present_string")]
    pub date_published: Option<String>,
}

/// Accept any JSON value; keep only non-blank strings.
fn present_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

/// Answers from both services for one URL, in fixed primary/secondary order.
#[derive(Debug)]
pub struct SourcePair {
    pub primary: Result<ExtractedArticle>,
    pub secondary: Result<ExtractedArticle>,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// HTTP client bound to the configured extraction endpoints.
#[derive(Debug, Clone)]
pub struct Extractor {
    client: Client,
    primary_url: String,
    secondary_url: String,
    api_key: Option<String>,
}

impl Extractor {
    /// Build an extractor, reading the primary API key from the env var named
    /// in `config`.
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let api_key = secret_from_env(&config.primary_api_key_env);
        if api_key.is_none() {
            debug!(var = %config.primary_api_key_env, "primary extraction API key not set");
        }
        Self::with_api_key(config, api_key)
    }

    /// Build an extractor with an explicit API key.
    pub fn with_api_key(config: &ExtractionConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DriveDbError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            primary_url: config.primary_url.clone(),
            secondary_url: config.secondary_url.clone(),
            api_key,
        })
    }

    /// Query both services concurrently.
    ///
    /// Neither call short-circuits the other; each outcome is returned as-is.
    #[instrument(skip(self), fields(url = %article_url))]
    pub async fn fetch_both(&self, article_url: &str) -> SourcePair {
        let (primary, secondary) = tokio::join!(
            self.fetch_primary(article_url),
            self.fetch_secondary(article_url),
        );

        if let Err(e) = &primary {
            warn!(error = %e, "primary extraction failed");
        }
        if let Err(e) = &secondary {
            warn!(error = %e, "secondary extraction failed");
        }
        info!(
            primary_ok = primary.is_ok(),
            secondary_ok = secondary.is_ok(),
            "article extraction finished"
        );

        SourcePair { primary, secondary }
    }

    /// `GET {primary_url}?url=<article>` with the `X-Api-Key` header.
    pub async fn fetch_primary(&self, article_url: &str) -> Result<ExtractedArticle> {
        let endpoint = endpoint(&self.primary_url, &[("url", article_url)])?;
        let mut request = self.client.get(endpoint.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        fetch_json(request, endpoint.as_str()).await
    }

    /// `GET {secondary_url}?u=<article>&output=json`.
    pub async fn fetch_secondary(&self, article_url: &str) -> Result<ExtractedArticle> {
        let endpoint = endpoint(&self.secondary_url, &[("u", article_url), ("output", "json")])?;
        let request = self.client.get(endpoint.as_str());
        fetch_json(request, endpoint.as_str()).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append properly encoded query pairs to a service base URL.
fn endpoint(base: &str, pairs: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| DriveDbError::config(format!("invalid extraction endpoint '{base}': {e}")))?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url)
}

async fn fetch_json(request: reqwest::RequestBuilder, label: &str) -> Result<ExtractedArticle> {
    let response = request
        .send()
        .await
        .map_err(|e| DriveDbError::Network(format!("{label}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DriveDbError::Network(format!("{label}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(DriveDbError::parse(format!(
                "{label}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| DriveDbError::Network(format!("{label}: failed to read body: {e}")))?;

    serde_json::from_str(&body)
        .map_err(|e| DriveDbError::parse(format!("{label}: malformed JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = "https://blog.example.com/posts/civic-harness?ref=home";

    fn config_for(server: &MockServer) -> ExtractionConfig {
        ExtractionConfig {
            primary_url: format!("{}/parser", server.uri()),
            primary_api_key_env: "DRIVEDB_TEST_UNSET_KEY".into(),
            secondary_url: format!("{}/go/", server.uri()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn blank_fields_are_absent() {
        let parsed: ExtractedArticle = serde_json::from_str(
            r#"{"title": "  ", "content": "<p>x</p>", "author": null, "word_count": 12, "excerpt": 7}"#,
        )
        .unwrap();
        assert_eq!(parsed.title, None);
        assert_eq!(parsed.content.as_deref(), Some("<p>x</p>"));
        assert_eq!(parsed.author, None);
        assert_eq!(parsed.excerpt, None);
    }

    #[test]
    fn endpoint_encodes_article_url() {
        let url = endpoint("https://svc.test/go/", &[("u", ARTICLE), ("output", "json")]).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("u".into(), ARTICLE.into()));
        assert_eq!(pairs[1], ("output".into(), "json".into()));
        assert!(endpoint("not a url", &[]).is_err());
    }

    #[tokio::test]
    async fn primary_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/parser"))
            .and(query_param("url", ARTICLE))
            .and(header("X-Api-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"title":"Civic harness","content":"<p>Body</p>","domain":"blog.example.com","lead_image_url":"https://blog.example.com/h.jpg"}"#,
            ))
            .mount(&server)
            .await;

        let extractor = Extractor::with_api_key(&config_for(&server), Some("secret".into())).unwrap();
        let article = extractor.fetch_primary(ARTICLE).await.unwrap();
        assert_eq!(article.title.as_deref(), Some("Civic harness"));
        assert_eq!(article.domain.as_deref(), Some("blog.example.com"));
        assert_eq!(article.lead_image_url.as_deref(), Some("https://blog.example.com/h.jpg"));
    }

    #[tokio::test]
    async fn fetch_both_keeps_each_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/parser"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/go/"))
            .and(query_param("u", ARTICLE))
            .and(query_param("output", "json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"title":"From secondary","content":"<p>y</p>"}"#),
            )
            .mount(&server)
            .await;

        let extractor = Extractor::new(&config_for(&server)).unwrap();
        let pair = extractor.fetch_both(ARTICLE).await;

        assert!(matches!(pair.primary, Err(DriveDbError::Network(_))));
        let secondary = pair.secondary.unwrap();
        assert_eq!(secondary.title.as_deref(), Some("From secondary"));
        assert_eq!(secondary.content.as_deref(), Some("<p>y</p>"));
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let extractor = Extractor::new(&config_for(&server)).unwrap();
        let err = extractor.fetch_secondary(ARTICLE).await.unwrap_err();
        assert!(matches!(err, DriveDbError::Parse { .. }));
    }
}
