//! Browser tool backed by a scraper service
//!
//! The scraper renders the page and exposes `/markdown`, `/html`, `/links`
//! and `/screenshot` endpoints taking the target as a `url` query parameter.
//! Content and screenshot are fetched concurrently.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use super::super::tool::Tool;
use crate::config::ScraperConfig;
use crate::core::{ExecContext, FlowError, FlowResult};
use crate::store::{ScreenshotLog, ScreenshotProvider};

/// Pages shorter than this are reported instead of returned
const MIN_CONTENT_LENGTH: usize = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(65);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BrowserAction {
    Markdown,
    Html,
    Links,
}

impl BrowserAction {
    fn endpoint(&self) -> &'static str {
        match self {
            BrowserAction::Markdown => "markdown",
            BrowserAction::Html => "html",
            BrowserAction::Links => "links",
        }
    }
}

#[derive(Debug, Deserialize)]
struct BrowserInput {
    url: String,
    action: BrowserAction,
}

/// Whether `host` names a loopback, private or link-local address
fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost")
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
    {
        return true;
    }

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback()
                || ip.is_private()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
        }
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
                || ip.to_ipv4_mapped().map_or(false, |v4| v4.is_loopback() || v4.is_private())
        }
        Err(_) => false,
    }
}

/// Page reader for agents
pub struct BrowserTool {
    flow_id: i64,
    data_dir: PathBuf,
    scraper: ScraperConfig,
    client: Client,
    screenshots: Option<Arc<dyn ScreenshotProvider>>,
}

impl BrowserTool {
    pub fn new(flow_id: i64, data_dir: impl Into<PathBuf>, scraper: ScraperConfig) -> FlowResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            flow_id,
            data_dir: data_dir.into(),
            scraper,
            client,
            screenshots: None,
        })
    }

    pub fn with_screenshots(mut self, sink: Option<Arc<dyn ScreenshotProvider>>) -> Self {
        self.screenshots = sink;
        self
    }

    fn screenshot_dir(&self) -> PathBuf {
        self.data_dir
            .join(format!("flow-{}", self.flow_id))
            .join("screenshots")
    }

    /// Pick the scraper for `target`, or the text explaining the refusal
    fn scraper_for(&self, target: &Url) -> Result<&str, String> {
        let host = target.host_str().unwrap_or_default();
        if is_private_host(host) {
            return self.scraper.private_url.as_deref().ok_or_else(|| {
                format!("access to private network address {} is not allowed", host)
            });
        }
        self.scraper
            .public_url
            .as_deref()
            .or(self.scraper.private_url.as_deref())
            .ok_or_else(|| "no scraper service is configured".to_string())
    }

    async fn fetch(&self, scraper: &str, endpoint: &str, target: &Url) -> FlowResult<Vec<u8>> {
        let url = Url::parse_with_params(
            &format!("{}/{}", scraper.trim_end_matches('/'), endpoint),
            &[("url", target.as_str())],
        )
        .map_err(|e| FlowError::other(format!("invalid scraper url: {}", e)))?;

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn save_screenshot(&self, target: &Url, image: Vec<u8>) -> FlowResult<()> {
        let dir = self.screenshot_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let name = format!("{}.png", Utc::now().format("%Y%m%d%H%M%S%3f"));
        tokio::fs::write(dir.join(&name), image).await?;

        if let Some(sink) = &self.screenshots {
            sink.put_screenshot(ScreenshotLog {
                flow_id: self.flow_id,
                name,
                url: target.to_string(),
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for BrowserTool {
    async fn handle(&self, _ctx: &ExecContext, name: &str, args: &Value) -> FlowResult<String> {
        let input: BrowserInput =
            serde_json::from_value(args.clone()).map_err(|e| FlowError::invalid_args(name, e))?;

        let target = Url::parse(&input.url)
            .map_err(|e| FlowError::invalid_args(name, format!("invalid url '{}': {}", input.url, e)))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(FlowError::invalid_args(
                name,
                format!("unsupported url scheme '{}', use http or https", target.scheme()),
            ));
        }

        let scraper = match self.scraper_for(&target) {
            Ok(scraper) => scraper,
            Err(text) => return Ok(text),
        };

        tracing::info!(
            "[BrowserTool] Flow {}: fetching {} as {}",
            self.flow_id,
            target,
            input.action.endpoint()
        );

        let fetched = tokio::try_join!(
            self.fetch(scraper, input.action.endpoint(), &target),
            self.fetch(scraper, "screenshot", &target),
        );
        let (content, screenshot) = match fetched {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("[BrowserTool] Failed to fetch {}: {}", target, e);
                return Ok(format!("failed to fetch {}: {}", target, e));
            }
        };

        let content = String::from_utf8_lossy(&content).into_owned();
        if content.len() < MIN_CONTENT_LENGTH {
            return Ok(format!(
                "the page {} returned too little content ({} bytes); it may be empty, \
                 blocked or need a different action",
                target,
                content.len()
            ));
        }

        if let Err(e) = self.save_screenshot(&target, screenshot).await {
            tracing::warn!("[BrowserTool] Failed to save screenshot of {}: {}", target, e);
        }

        Ok(content)
    }

    fn is_available(&self) -> bool {
        self.scraper.public_url.is_some() || self.scraper.private_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::serve_http;
    use serde_json::json;

    const PAGE: &str = "# Example Domain\n\nThis domain is for use in illustrative examples in documents.";

    #[test]
    fn test_private_hosts() {
        for host in ["localhost", "127.0.0.1", "10.1.2.3", "192.168.0.5", "169.254.1.1", "[::1]", "[fd00::1]", "db.internal"] {
            assert!(is_private_host(host), "{} should be private", host);
        }
        for host in ["example.com", "8.8.8.8", "[2001:4860::8888]"] {
            assert!(!is_private_host(host), "{} should be public", host);
        }
    }

    #[tokio::test]
    async fn test_fetch_content_and_screenshot() {
        let (base, requests) = serve_http(vec![
            ("/markdown", PAGE.as_bytes().to_vec()),
            ("/screenshot", vec![0x89, b'P', b'N', b'G']),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let tool = BrowserTool::new(
            3,
            dir.path(),
            ScraperConfig {
                public_url: Some(base),
                private_url: None,
            },
        )
        .unwrap()
        .with_screenshots(Some(store.clone()));

        let result = tool
            .handle(
                &ExecContext::new(),
                "browser",
                &json!({"url": "https://example.com/", "action": "markdown"}),
            )
            .await
            .unwrap();
        assert_eq!(result, PAGE);

        let shots = store.screenshots();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].url, "https://example.com/");
        assert!(dir.path().join("flow-3/screenshots").join(&shots[0].name).exists());
        assert!(requests
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.contains("url=https%3A%2F%2Fexample.com%2F")));
    }

    #[tokio::test]
    async fn test_short_content_is_reported() {
        let (base, _) = serve_http(vec![("/", b"tiny".to_vec())]).await;
        let dir = tempfile::tempdir().unwrap();
        let tool = BrowserTool::new(
            1,
            dir.path(),
            ScraperConfig {
                public_url: Some(base),
                private_url: None,
            },
        )
        .unwrap();

        let result = tool
            .handle(&ExecContext::new(), "browser", &json!({"url": "https://example.com", "action": "links"}))
            .await
            .unwrap();
        assert!(result.contains("too little content"));
    }

    #[tokio::test]
    async fn test_private_target_refused_without_private_scraper() {
        let tool = BrowserTool::new(
            1,
            "data",
            ScraperConfig {
                public_url: Some("http://scraper.example".into()),
                private_url: None,
            },
        )
        .unwrap();

        let result = tool
            .handle(&ExecContext::new(), "browser", &json!({"url": "http://10.0.0.1/admin", "action": "html"}))
            .await
            .unwrap();
        assert_eq!(result, "access to private network address 10.0.0.1 is not allowed");

        let err = tool
            .handle(&ExecContext::new(), "browser", &json!({"url": "file:///etc/passwd", "action": "html"}))
            .await
            .unwrap_err();
        assert!(err.is_invalid_arguments());
    }

    #[test]
    fn test_availability() {
        let tool = BrowserTool::new(1, "data", ScraperConfig::default()).unwrap();
        assert!(!tool.is_available());
    }
}
