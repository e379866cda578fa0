//! Diagnostic artifacts captured at the moment of failure.
//!
//! The core only produces raw bytes and markup; whatever reporting system
//! sits above decides the format and attachment plumbing.

use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::Driver;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub label: String,
    pub captured_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_source: Option<String>,
}

impl Evidence {
    /// Best-effort capture: either artifact may be missing if the session is
    /// already degraded, and that must not mask the failure being reported.
    pub async fn capture<D: Driver>(driver: &D, tab: &D::TabHandle, label: &str) -> Self {
        let screenshot = match driver.screenshot(tab).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(label, error = %e, "screenshot capture failed");
                None
            }
        };
        let page_source = match driver.page_source(tab).await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(label, error = %e, "page source capture failed");
                None
            }
        };

        Self {
            label: label.to_string(),
            captured_at: Utc::now(),
            screenshot,
            page_source,
        }
    }

    pub fn screenshot_base64(&self) -> Option<String> {
        self.screenshot
            .as_ref()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Write the artifacts as `<label>_<timestamp>.png` / `.html` under
    /// `dir`, returning whatever paths were written.
    pub fn persist(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let stamp = self.captured_at.format("%Y%m%d_%H%M%S");
        let mut written = Vec::new();

        if let Some(png) = &self.screenshot {
            let path = dir.join(format!("{}_{}.png", self.label, stamp));
            std::fs::write(&path, png)?;
            written.push(path);
        }
        if let Some(html) = &self.page_source {
            let path = dir.join(format!("{}_{}.html", self.label, stamp));
            std::fs::write(&path, html)?;
            written.push(path);
        }

        Ok(written)
    }
}
