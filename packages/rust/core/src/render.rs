//! Markdown → HTML rendering for guides.
//!
//! With an API token configured, guides are rendered by a GitHub-compatible
//! `/markdown` endpoint so issue references and mentions resolve against the
//! configured repository. Without one, or when the remote call fails, the
//! local `pulldown-cmark` renderer is used.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use drivedb_markdown::render_html;
use drivedb_shared::{DriveDbError, RenderConfig, Result, secret_from_env};

const USER_AGENT: &str = concat!("drivedb/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    text: &'a str,
    mode: &'a str,
    context: &'a str,
}

/// Client for a GitHub-compatible markdown API.
#[derive(Debug, Clone)]
pub struct GithubRenderer {
    client: Client,
    endpoint: String,
    token: String,
    mode: String,
    context: String,
}

impl GithubRenderer {
    pub fn new(config: &RenderConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| DriveDbError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/markdown", config.api_url.trim_end_matches('/')),
            token,
            mode: config.mode.clone(),
            context: config.context.clone(),
        })
    }

    /// `POST {api_url}/markdown`; the response body is the HTML.
    pub async fn render(&self, markdown: &str) -> Result<String> {
        let body = RenderRequest {
            text: markdown,
            mode: &self.mode,
            context: &self.context,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DriveDbError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DriveDbError::Render(format!("{}: HTTP {status}", self.endpoint)));
        }
        response
            .text()
            .await
            .map_err(|e| DriveDbError::Network(format!("{}: failed to read body: {e}", self.endpoint)))
    }
}

/// Which renderer guides go through.
#[derive(Debug, Clone)]
pub enum MarkdownRenderer {
    Github(GithubRenderer),
    Local,
}

impl MarkdownRenderer {
    /// Remote rendering when the token env var is set, local otherwise.
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        match secret_from_env(&config.token_env) {
            Some(token) => Ok(Self::Github(GithubRenderer::new(config, token)?)),
            None => {
                debug!(var = %config.token_env, "render token not set, rendering locally");
                Ok(Self::Local)
            }
        }
    }

    /// Render `markdown`. Never fails: remote errors fall back to local output.
    #[instrument(skip_all, fields(len = markdown.len()))]
    pub async fn render(&self, markdown: &str) -> String {
        match self {
            Self::Local => render_html(markdown),
            Self::Github(remote) => match remote.render(markdown).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(error = %e, "remote markdown render failed, using local renderer");
                    render_html(markdown)
                }
            },
        }
    }
}
