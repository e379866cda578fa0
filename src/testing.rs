//! Scripted driver backend for tests.
//!
//! `MockDriver` serves registered fixture documents per URL, records every
//! interaction, and can be programmed to fail native clicks/typing or to
//! answer specific scripts, so the interaction protocol can be exercised
//! without a real browser.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{FlowError, Result};
use crate::session::Driver;

const DEFAULT_PAGE: &str = "<html><body></body></html>";

/// Answer for scripts containing `needle`: values are returned in order,
/// the last one repeating once the sequence is exhausted.
struct ScriptRule {
    needle: String,
    values: Vec<Value>,
    served: usize,
}

impl ScriptRule {
    fn next(&mut self) -> Value {
        let idx = self.served.min(self.values.len().saturating_sub(1));
        self.served += 1;
        self.values.get(idx).cloned().unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct MockState {
    next_tab: u64,
    tab_urls: HashMap<u64, String>,
    pages: HashMap<String, String>,
    failing_clicks: HashSet<String>,
    failing_typing: HashSet<String>,
    failing_screenshot: bool,
    script_rules: Vec<ScriptRule>,
    // When a script containing the needle runs in a tab, point that tab at
    // the mapped URL. Emulates form submission or scripted navigation.
    script_navigations: Vec<(String, String)>,
    clicks: Vec<(u64, String)>,
    typed: Vec<(u64, String, String)>,
    scripts: Vec<(u64, String)>,
    closed: Vec<u64>,
}

pub struct MockDriver {
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Serve `html` whenever a tab at `url` is snapshotted.
    pub fn register_page(&self, url: &str, html: &str) {
        let mut s = self.state.lock().unwrap();
        s.pages.insert(url.to_string(), html.to_string());
    }

    /// Make native clicks on this selector fail.
    pub fn fail_native_click(&self, selector: &str) {
        let mut s = self.state.lock().unwrap();
        s.failing_clicks.insert(selector.to_string());
    }

    /// Make native typing into this selector fail.
    pub fn fail_native_typing(&self, selector: &str) {
        let mut s = self.state.lock().unwrap();
        s.failing_typing.insert(selector.to_string());
    }

    pub fn fail_screenshots(&self) {
        self.state.lock().unwrap().failing_screenshot = true;
    }

    /// Answer scripts containing `needle` with `value`, forever.
    pub fn on_script(&self, needle: &str, value: Value) {
        self.on_script_sequence(needle, vec![value]);
    }

    /// Answer scripts containing `needle` with the given values in order;
    /// the final value repeats.
    pub fn on_script_sequence(&self, needle: &str, values: Vec<Value>) {
        let mut s = self.state.lock().unwrap();
        s.script_rules.push(ScriptRule {
            needle: needle.to_string(),
            values,
            served: 0,
        });
    }

    /// When a script containing `needle` runs, move the executing tab to
    /// `url` (fixture stand-in for a form submission).
    pub fn navigate_on_script(&self, needle: &str, url: &str) {
        let mut s = self.state.lock().unwrap();
        s.script_navigations
            .push((needle.to_string(), url.to_string()));
    }

    pub fn clicks(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(u64, String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn scripts(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn closed_tabs(&self) -> Vec<u64> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn open_tab_count(&self) -> usize {
        self.state.lock().unwrap().tab_urls.len()
    }
}

#[async_trait]
impl Driver for MockDriver {
    type TabHandle = u64;

    async fn open_tab(&self) -> Result<u64> {
        let mut s = self.state.lock().unwrap();
        let id = s.next_tab;
        s.next_tab += 1;
        s.tab_urls.insert(id, String::new());
        Ok(id)
    }

    async fn close_tab(&self, tab: &u64) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.tab_urls.remove(tab);
        s.closed.push(*tab);
        Ok(())
    }

    async fn navigate(&self, tab: &u64, url: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.tab_urls.insert(*tab, url.to_string());
        Ok(())
    }

    async fn current_url(&self, tab: &u64) -> Result<String> {
        let s = self.state.lock().unwrap();
        s.tab_urls
            .get(tab)
            .cloned()
            .ok_or_else(|| FlowError::TabFailed(format!("unknown tab {}", tab)))
    }

    async fn page_source(&self, tab: &u64) -> Result<String> {
        let s = self.state.lock().unwrap();
        let url = s
            .tab_urls
            .get(tab)
            .ok_or_else(|| FlowError::TabFailed(format!("unknown tab {}", tab)))?;
        Ok(s.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| DEFAULT_PAGE.to_string()))
    }

    async fn click(&self, tab: &u64, selector: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if s.failing_clicks.contains(selector) {
            return Err(FlowError::InteractionFailed(format!(
                "native click rejected: {}",
                selector
            )));
        }
        s.clicks.push((*tab, selector.to_string()));
        Ok(())
    }

    async fn type_text(&self, tab: &u64, selector: &str, text: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if s.failing_typing.contains(selector) {
            return Err(FlowError::InteractionFailed(format!(
                "native typing rejected: {}",
                selector
            )));
        }
        s.typed.push((*tab, selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn execute_script(&self, tab: &u64, script: &str) -> Result<Value> {
        let mut s = self.state.lock().unwrap();
        s.scripts.push((*tab, script.to_string()));

        let navigation = s
            .script_navigations
            .iter()
            .find(|(needle, _)| script.contains(needle))
            .map(|(_, url)| url.clone());
        if let Some(url) = navigation {
            s.tab_urls.insert(*tab, url);
        }

        for rule in s.script_rules.iter_mut() {
            if script.contains(&rule.needle) {
                return Ok(rule.next());
            }
        }
        Ok(Value::Null)
    }

    async fn screenshot(&self, _tab: &u64) -> Result<Vec<u8>> {
        let s = self.state.lock().unwrap();
        if s.failing_screenshot {
            return Err(FlowError::ScreenshotFailed("mock".to_string()));
        }
        // PNG magic bytes so artifact writers have something real-looking.
        Ok(vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a])
    }
}
