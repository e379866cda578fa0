use crate::errors::Result;
use crate::session::Driver;
use tracing::warn;

/// Tracks the scenario's original tab and every tab spawned from it.
///
/// Cross-tab work (opening a product in its own tab) must always come back
/// to the original tab, including on the failure path; leaking a foreign tab
/// as the active context is a bug. Flows register every spawned tab here and
/// call `release_all` before returning, so no exit path can leave one open.
pub struct TabTracker<'a, D: Driver> {
    driver: &'a D,
    original: D::TabHandle,
    spawned: Vec<D::TabHandle>,
}

impl<'a, D: Driver> TabTracker<'a, D> {
    pub fn new(driver: &'a D, original: D::TabHandle) -> Self {
        Self {
            driver,
            original,
            spawned: Vec::new(),
        }
    }

    /// The tab the scenario started on. Work continues here after every
    /// spawned tab is finished.
    pub fn original(&self) -> &D::TabHandle {
        &self.original
    }

    /// Open a new tab at `url` and register it for cleanup.
    pub async fn spawn(&mut self, url: &str) -> Result<D::TabHandle> {
        let tab = self.driver.open_tab().await?;
        if let Err(e) = self.driver.navigate(&tab, url).await {
            // Registration before bail-out keeps the half-opened tab from
            // leaking.
            self.spawned.push(tab);
            return Err(e);
        }
        self.spawned.push(tab.clone());
        Ok(tab)
    }

    /// Close the most recently spawned tab. Close failures are absorbed: the
    /// session may already have discarded the tab.
    pub async fn close_spawned(&mut self) {
        if let Some(tab) = self.spawned.pop() {
            if let Err(e) = self.driver.close_tab(&tab).await {
                warn!(error = %e, "could not close spawned tab");
            }
        }
    }

    /// Close every spawned tab still registered, oldest last.
    pub async fn release_all(&mut self) {
        while !self.spawned.is_empty() {
            self.close_spawned().await;
        }
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.len()
    }
}
