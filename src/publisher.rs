//! WordPress publishing client with bounded exponential-backoff retries.
//!
//! Publishing never raises past this boundary: every outcome, including an
//! exhausted retry budget, comes back as a `PublishResult`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::model::ArticleDraft;
use crate::ports::{MarkdownRenderer, SiteAdapterPort};

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_SECS: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct PublishResult {
    pub success: bool,
    pub post_id: Option<i64>,
    pub url: Option<String>,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
}

/// Seam for the batch runner; the real client below talks HTTP.
#[async_trait]
pub trait DraftPublisher: Send + Sync {
    async fn create_draft(&self, draft: &ArticleDraft) -> PublishResult;
}

/// Lightweight markdown -> HTML conversion for the post body. Escapes the
/// text, wraps double-newline blocks in paragraphs and turns remaining
/// newlines into breaks.
pub struct DefaultMarkdownRenderer;

impl MarkdownRenderer for DefaultMarkdownRenderer {
    fn to_html(&self, markdown: &str) -> String {
        let escaped = escape_html(markdown);
        escaped
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("<p>{}</p>", p.replace('\n', "<br>")))
            .collect()
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Creates WordPress drafts through the REST API using an application
/// password (HTTP Basic auth).
pub struct WordPressClient {
    base_url: String,
    username: String,
    app_password: String,
    site_adapter: Arc<dyn SiteAdapterPort>,
    http: reqwest::Client,
    max_retries: u32,
    backoff_base_secs: f64,
    markdown_renderer: Arc<dyn MarkdownRenderer>,
    convert_markdown: bool,
}

impl WordPressClient {
    pub fn new(
        base_url: &str,
        username: &str,
        app_password: &str,
        site_adapter: Arc<dyn SiteAdapterPort>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("wp-draftbot/0.1")
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            app_password: app_password.to_string(),
            site_adapter,
            http,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            markdown_renderer: Arc::new(DefaultMarkdownRenderer),
            convert_markdown: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .user_agent("wp-draftbot/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base_secs: f64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_secs = backoff_base_secs;
        self
    }

    pub fn with_markdown_conversion(mut self, convert: bool) -> Self {
        self.convert_markdown = convert;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        self.markdown_renderer = renderer;
        self
    }

    fn build_payload(&self, draft: &ArticleDraft) -> Map<String, Value> {
        let content = if self.convert_markdown {
            self.markdown_renderer.to_html(&draft.markdown)
        } else {
            draft.markdown.clone()
        };

        let mut payload = Map::new();
        payload.insert("title".into(), json!(draft.title));
        payload.insert("content".into(), json!(content));
        payload.insert("excerpt".into(), json!(draft.meta_description));
        payload.insert("slug".into(), json!(draft.slug));
        payload.insert("status".into(), json!("draft"));
        // Categories/tags/custom fields are the site adapter's business.
        self.site_adapter.extend_wp_payload(draft, payload)
    }

    async fn format_error(response: reqwest::Response) -> String {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                let msg = body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| text.clone());
                match body.get("code").and_then(Value::as_str) {
                    Some(code) => format!("HTTP {} {}: {}", status, code, msg),
                    None => format!("HTTP {}: {}", status, msg),
                }
            }
            Err(_) => format!("HTTP {}: {}", status, text),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct CreatePostResponse {
    id: i64,
    link: Option<String>,
}

#[async_trait]
impl DraftPublisher for WordPressClient {
    async fn create_draft(&self, draft: &ArticleDraft) -> PublishResult {
        let url = format!("{}/wp-json/wp/v2/posts", self.base_url);
        let payload = self.build_payload(draft);
        let mut last_error: Option<String> = None;
        let mut last_status: Option<u16> = None;

        for attempt in 1..=self.max_retries {
            let sent = self
                .http
                .post(&url)
                .basic_auth(&self.username, Some(&self.app_password))
                .json(&payload)
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());
                    if status.is_success() {
                        match response.json::<CreatePostResponse>().await {
                            Ok(body) => {
                                info!(post_id = body.id, slug = %draft.slug, "WP draft created");
                                return PublishResult {
                                    success: true,
                                    post_id: Some(body.id),
                                    url: body.link,
                                    error_message: None,
                                    status_code: last_status,
                                };
                            }
                            Err(err) => {
                                last_error = Some(format!("invalid create response: {}", err));
                            }
                        }
                    } else {
                        last_error = Some(Self::format_error(response).await);
                    }
                }
                Err(err) => {
                    last_error = Some(err.to_string());
                }
            }
            if attempt < self.max_retries {
                let sleep_secs = self.backoff_base_secs * f64::powi(2.0, (attempt - 1) as i32);
                warn!(attempt, sleep_secs, "publish attempt failed; backing off");
                tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
            }
        }

        PublishResult {
            success: false,
            post_id: None,
            url: None,
            error_message: last_error,
            status_code: last_status,
        }
    }
}
