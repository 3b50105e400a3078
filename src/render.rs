//! HTML to PDF rendering through headless Chromium.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::RenderError;

/// Page geometry and limits for rendering.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub timeout_secs: u64,
    /// Browser executable. Detected automatically when unset.
    pub chrome_path: Option<PathBuf>,
    pub paper_width_in: f64,
    pub paper_height_in: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        // A4
        Self {
            timeout_secs: 60,
            chrome_path: None,
            paper_width_in: 8.27,
            paper_height_in: 11.69,
        }
    }
}

impl RenderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Turns self-contained HTML into page-accurate document bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError>;
}

/// Renders with a fresh headless Chromium per document.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    settings: RenderSettings,
}

impl ChromeRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, RenderError> {
        let mut builder = BrowserConfig::builder();
        if let Some(path) = &self.settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(RenderError::Launch)
    }

    fn print_params(&self) -> PrintToPdfParams {
        PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(self.settings.paper_width_in),
            paper_height: Some(self.settings.paper_height_in),
            ..Default::default()
        }
    }

    async fn render_once(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::Session(e.to_string()))?;
            page.set_content(html)
                .await
                .map_err(|e| RenderError::Session(e.to_string()))?;
            page.pdf(self.print_params())
                .await
                .map_err(|e| RenderError::Session(e.to_string()))
        }
        .await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser close failed");
        }
        let _ = browser.wait().await;
        events.abort();
        result
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let limit = self.settings.timeout();
        tokio::time::timeout(limit, self.render_once(html))
            .await
            .map_err(|_| RenderError::Timeout(limit))?
    }
}
