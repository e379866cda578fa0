use crate::config::BrowserConfig;
use crate::errors::{FlowError, Result};
use crate::session::Driver;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;

/// Chrome backend over the DevTools protocol.
pub struct ChromeDriver {
    browser: Browser,
}

impl ChromeDriver {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.window_width, config.window_height
        );
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            // The target site fingerprints the automation flag.
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new(&window_size_arg),
        ];
        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }
        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| FlowError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| FlowError::LaunchFailed(e.to_string()))?;

        Ok(Self { browser })
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    type TabHandle = Arc<Tab>;

    async fn open_tab(&self) -> Result<Self::TabHandle> {
        self.browser
            .new_tab()
            .map_err(|e| FlowError::TabFailed(e.to_string()))
    }

    async fn close_tab(&self, tab: &Self::TabHandle) -> Result<()> {
        tab.close(true)
            .map(|_| ())
            .map_err(|e| FlowError::TabFailed(e.to_string()))
    }

    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()> {
        tab.navigate_to(url)
            .map_err(|e| FlowError::NavigationFailed(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| FlowError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(tab.get_url())
    }

    async fn page_source(&self, tab: &Self::TabHandle) -> Result<String> {
        tab.get_content()
            .map_err(|e| FlowError::BrowserError(e.to_string()))
    }

    async fn click(&self, tab: &Self::TabHandle, selector: &str) -> Result<()> {
        let element = tab
            .find_element(selector)
            .map_err(|e| FlowError::ElementNotFound(format!("{}: {}", selector, e)))?;
        element
            .click()
            .map(|_| ())
            .map_err(|e| FlowError::InteractionFailed(e.to_string()))
    }

    async fn type_text(&self, tab: &Self::TabHandle, selector: &str, text: &str) -> Result<()> {
        let element = tab
            .find_element(selector)
            .map_err(|e| FlowError::ElementNotFound(format!("{}: {}", selector, e)))?;
        element
            .type_into(text)
            .map(|_| ())
            .map_err(|e| FlowError::InteractionFailed(e.to_string()))
    }

    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value> {
        let result = tab
            .evaluate(script, false)
            .map_err(|e| FlowError::ScriptFailed(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>> {
        tab.capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )
        .map_err(|e| FlowError::ScreenshotFailed(e.to_string()))
    }
}
