use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Seam between the interaction core and a concrete browser backend.
///
/// Everything the classifier, resolver, and actuator need from a live
/// session goes through this trait, so tests can substitute a scripted
/// backend and the site logic never touches the automation protocol
/// directly.
#[async_trait]
pub trait Driver: Send + Sync {
    type TabHandle: Send + Sync + Clone;

    /// Open a fresh tab.
    async fn open_tab(&self) -> Result<Self::TabHandle>;

    /// Close a tab. Idempotent close failures are the caller's to absorb.
    async fn close_tab(&self, tab: &Self::TabHandle) -> Result<()>;

    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()>;

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String>;

    /// Full markup of the current document.
    async fn page_source(&self, tab: &Self::TabHandle) -> Result<String>;

    /// Native click on the first element matching the selector.
    async fn click(&self, tab: &Self::TabHandle, selector: &str) -> Result<()>;

    /// Native keyboard input into the first element matching the selector.
    async fn type_text(&self, tab: &Self::TabHandle, selector: &str, text: &str) -> Result<()>;

    /// Evaluate JavaScript against the document and return its JSON value.
    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value>;

    /// PNG screenshot of the current viewport.
    async fn screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>>;
}
