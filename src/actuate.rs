//! Resilient actuation: perform one action against a resolved element with
//! native-first, scripted-fallback semantics.
//!
//! Every action follows the same shape: best-effort scroll to viewport
//! center, a short settle pause, a native attempt through the driver, and a
//! scripted attempt dispatched directly against the node when the native
//! path is rejected (overlay interception, synthetic-event-only widgets).
//! When an observable post-condition exists it is polled under a bounded
//! timeout; when none is observable, the raw dispatch is the best available
//! success signal.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::classify::{classify_tab, PageState};
use crate::config::TimingConfig;
use crate::errors::Result;
use crate::evidence::Evidence;
use crate::resolve::{resolve, Goal, ResolutionQuery};
use crate::session::Driver;

/// Outcome of one actuation, consumed by the orchestrating flow to decide
/// whether to retry, skip, or fail the scenario.
#[derive(Debug)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub attempts: u32,
    pub evidence: Option<Evidence>,
}

impl ActionOutcome {
    fn success(attempts: u32) -> Self {
        Self {
            succeeded: true,
            attempts,
            evidence: None,
        }
    }

    fn failure(attempts: u32, evidence: Option<Evidence>) -> Self {
        Self {
            succeeded: false,
            attempts,
            evidence,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Click {
        /// JS boolean expression observable after a successful click.
        post_condition: Option<String>,
    },
    SetText {
        value: String,
    },
    SelectVariant,
}

pub struct Actuator<'a, D: Driver> {
    driver: &'a D,
    timing: &'a TimingConfig,
}

impl<'a, D: Driver> Actuator<'a, D> {
    pub fn new(driver: &'a D, timing: &'a TimingConfig) -> Self {
        Self { driver, timing }
    }

    pub async fn act(&self, tab: &D::TabHandle, selector: &str, action: &Action) -> ActionOutcome {
        match action {
            Action::Click { post_condition } => {
                self.click(tab, selector, post_condition.as_deref()).await
            }
            Action::SetText { value } => self.set_text(tab, selector, value).await,
            Action::SelectVariant => self.select_variant(tab).await,
        }
    }

    pub async fn click(
        &self,
        tab: &D::TabHandle,
        selector: &str,
        post_condition: Option<&str>,
    ) -> ActionOutcome {
        // Scroll is best-effort; a failure here says nothing about the click.
        let _ = self
            .driver
            .execute_script(tab, &scroll_into_view_script(selector))
            .await;
        sleep(Duration::from_millis(self.timing.settle_ms)).await;

        let mut attempts = 1;
        let mut dispatched = match self.driver.click(tab, selector).await {
            Ok(()) => true,
            Err(e) => {
                debug!(selector, error = %e, "native click rejected, trying scripted fallback");
                false
            }
        };

        if !dispatched {
            attempts += 1;
            dispatched = matches!(
                self.driver
                    .execute_script(tab, &js_click_script(selector))
                    .await,
                Ok(v) if v != Value::Bool(false)
            );
        }

        if !dispatched {
            warn!(selector, "click failed on both native and scripted paths");
            let evidence = Evidence::capture(self.driver, tab, "click_failed").await;
            return ActionOutcome::failure(attempts, Some(evidence));
        }

        if let Some(probe) = post_condition {
            if self.poll_condition(tab, probe).await {
                return ActionOutcome::success(attempts);
            }
            warn!(selector, "post-condition not observed within timeout");
            let evidence = Evidence::capture(self.driver, tab, "post_condition_missed").await;
            return ActionOutcome::failure(attempts, Some(evidence));
        }

        ActionOutcome::success(attempts)
    }

    pub async fn set_text(&self, tab: &D::TabHandle, selector: &str, value: &str) -> ActionOutcome {
        let _ = self
            .driver
            .execute_script(tab, &scroll_into_view_script(selector))
            .await;
        // Clearing is best-effort: a pristine field rejects clear on some
        // engines and the subsequent set overwrites anyway.
        let _ = self
            .driver
            .execute_script(tab, &js_clear_script(selector))
            .await;

        if self.driver.type_text(tab, selector, value).await.is_ok() {
            return ActionOutcome::success(1);
        }
        debug!(selector, "native typing rejected, assigning value via script");

        // Some fields ignore programmatic assignment unless input/change
        // notifications are synthesized, so listening validation re-runs.
        match self
            .driver
            .execute_script(tab, &js_set_value_script(selector, value))
            .await
        {
            Ok(v) if v != Value::Bool(false) => ActionOutcome::success(2),
            _ => {
                let evidence = Evidence::capture(self.driver, tab, "set_text_failed").await;
                ActionOutcome::failure(2, Some(evidence))
            }
        }
    }

    /// Text entry for a reload-prone page: re-resolve the target fresh on
    /// every attempt, never reusing a candidate across attempts, and back
    /// off between tries.
    pub async fn set_text_resolving(
        &self,
        tab: &D::TabHandle,
        goal: Goal,
        value: &str,
    ) -> ActionOutcome {
        for attempt in 1..=self.timing.text_entry_attempts {
            let html = match self.driver.page_source(tab).await {
                Ok(html) => html,
                Err(e) => {
                    debug!(attempt, error = %e, "snapshot unavailable, backing off");
                    sleep(self.backoff(attempt)).await;
                    continue;
                }
            };

            if let Some(candidate) = resolve(&html, &ResolutionQuery::first(goal)).first() {
                if !self.is_unobstructed(tab, &candidate.selector).await {
                    debug!(attempt, selector = %candidate.selector, "target covered by overlay");
                    sleep(self.backoff(attempt)).await;
                    continue;
                }
                let outcome = self.set_text(tab, &candidate.selector, value).await;
                if outcome.succeeded {
                    return ActionOutcome::success(attempt);
                }
            }

            sleep(self.backoff(attempt)).await;
        }

        warn!(goal = ?goal, "text entry exhausted all attempts");
        let evidence = Evidence::capture(self.driver, tab, "text_entry_exhausted").await;
        ActionOutcome::failure(self.timing.text_entry_attempts, Some(evidence))
    }

    /// Auto-resolve one variant axis: radio buttons first, then dropdowns
    /// (first non-placeholder option by value, falling back to visible
    /// text), then swatch tiles. Stops at the first strategy that succeeds,
    /// since one axis typically unblocks the add action.
    pub async fn select_variant(&self, tab: &D::TabHandle) -> ActionOutcome {
        let strategies: [(&str, String); 3] = [
            ("radio", first_radio_script()),
            ("dropdown", dropdown_select_script()),
            ("swatch", swatch_click_script()),
        ];

        for (attempts, (kind, script)) in strategies.iter().enumerate() {
            if matches!(
                self.driver.execute_script(tab, script).await,
                Ok(Value::Bool(true))
            ) {
                info!(kind = %kind, "variant auto-selection succeeded");
                sleep(Duration::from_millis(self.timing.settle_ms)).await;
                return ActionOutcome::success(attempts as u32 + 1);
            }
        }

        ActionOutcome::failure(3, None)
    }

    /// Try to close a cookie/consent overlay. Nothing present is fine.
    pub async fn dismiss_overlays(&self, tab: &D::TabHandle) -> bool {
        for selector in crate::signatures::OVERLAY_DISMISS_SELECTORS {
            if self.driver.click(tab, selector).await.is_ok() {
                debug!(selector, "dismissed overlay");
                sleep(Duration::from_millis(self.timing.settle_ms)).await;
                return true;
            }
        }
        false
    }

    /// Submit the form enclosing a field, the scripted equivalent of
    /// pressing Return in it.
    pub async fn submit_enclosing_form(&self, tab: &D::TabHandle, selector: &str) -> Result<()> {
        self.driver
            .execute_script(tab, &submit_form_script(selector))
            .await
            .map(|_| ())
    }

    /// Poll a JS boolean expression until true or the post-condition ceiling
    /// elapses.
    pub async fn poll_condition(&self, tab: &D::TabHandle, probe: &str) -> bool {
        let deadline = Instant::now() + Duration::from_millis(self.timing.post_condition_timeout_ms);
        loop {
            if let Ok(Value::Bool(true)) = self.driver.execute_script(tab, probe).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(self.timing.post_condition_poll_ms)).await;
        }
    }

    /// elementFromPoint check at the target's center: if another element
    /// that is not an ancestor/descendant sits on top, typing would be
    /// intercepted. Check failures count as unobstructed.
    async fn is_unobstructed(&self, tab: &D::TabHandle, selector: &str) -> bool {
        !matches!(
            self.driver
                .execute_script(tab, &unobstructed_check_script(selector))
                .await,
            Ok(Value::Bool(false))
        )
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.timing.text_entry_backoff_ms * attempt as u64)
    }
}

/// Outcome of the bounded wait for a human to clear a verification
/// challenge.
#[derive(Debug, PartialEq, Eq)]
pub enum ChallengeWait {
    /// The page left the challenge state; carries what it became.
    Cleared(PageState),
    TimedOut,
}

/// Shared primitive used around actuation: once a challenge is detected,
/// poll the classifier until the page is no longer blocked or the ceiling
/// elapses. Detection plus bounded waiting only; solving stays with the
/// human.
pub async fn wait_for_challenge_clear<D: Driver>(
    driver: &D,
    tab: &D::TabHandle,
    timing: &TimingConfig,
) -> ChallengeWait {
    let deadline = Instant::now() + Duration::from_millis(timing.challenge_wait_timeout_ms);
    info!("waiting for verification challenge to be cleared manually");

    loop {
        let state = classify_tab(driver, tab).await;
        if state != PageState::ChallengePresent {
            info!(state = ?state, "challenge cleared");
            return ChallengeWait::Cleared(state);
        }
        if Instant::now() >= deadline {
            warn!("challenge was not cleared within the ceiling");
            return ChallengeWait::TimedOut;
        }
        sleep(Duration::from_millis(timing.challenge_poll_ms)).await;
    }
}

// ---------------------------------------------------------------------------
// Script builders
// ---------------------------------------------------------------------------

fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn scroll_into_view_script(selector: &str) -> String {
    format!(
        r#"
        (function() {{
            const el = document.querySelector('{}');
            if (!el) return false;
            el.scrollIntoView({{block: 'center'}});
            return true;
        }})()
    "#,
        escape_js(selector)
    )
}

fn js_click_script(selector: &str) -> String {
    format!(
        r#"
        (function() {{
            const el = document.querySelector('{}');
            if (!el) return false;
            el.click();
            return true;
        }})()
    "#,
        escape_js(selector)
    )
}

fn js_clear_script(selector: &str) -> String {
    format!(
        r#"
        (function() {{
            const el = document.querySelector('{}');
            if (!el) return false;
            el.value = '';
            return true;
        }})()
    "#,
        escape_js(selector)
    )
}

fn js_set_value_script(selector: &str, value: &str) -> String {
    format!(
        r#"
        (function() {{
            const el = document.querySelector('{}');
            if (!el) return false;
            try {{ el.removeAttribute('readonly'); }} catch (e) {{}}
            try {{ el.removeAttribute('disabled'); }} catch (e) {{}}
            el.focus();
            el.value = '{}';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()
    "#,
        escape_js(selector),
        escape_js(value)
    )
}

fn unobstructed_check_script(selector: &str) -> String {
    format!(
        r#"
        (function() {{
            const el = document.querySelector('{}');
            if (!el) return false;
            const r = el.getBoundingClientRect();
            const top = document.elementFromPoint(
                Math.floor(r.left + r.width / 2),
                Math.floor(r.top + r.height / 2)
            );
            if (!top) return true;
            let t = top;
            while (t) {{
                if (t === el) return true;
                t = t.parentElement;
            }}
            return el.contains(top);
        }})()
    "#,
        escape_js(selector)
    )
}

fn submit_form_script(selector: &str) -> String {
    format!(
        r#"
        (function() {{
            const el = document.querySelector('{}');
            if (!el || !el.form) return false;
            el.form.submit();
            return true;
        }})()
    "#,
        escape_js(selector)
    )
}

fn first_radio_script() -> String {
    r#"
        (function() {
            const radios = document.querySelectorAll("input[type='radio']");
            for (const r of radios) {
                const rect = r.getBoundingClientRect();
                if (rect.width > 0 && rect.height > 0 && !r.disabled) {
                    r.scrollIntoView({block: 'center'});
                    r.click();
                    return true;
                }
            }
            return false;
        })()
    "#
    .to_string()
}

fn dropdown_select_script() -> String {
    r#"
        (function() {
            const selects = document.querySelectorAll('select');
            for (const s of selects) {
                for (const option of s.options) {
                    const val = (option.value || '').trim();
                    const txt = (option.textContent || '').trim();
                    if (!val || txt.toLowerCase().startsWith('select')) continue;
                    s.value = val;
                    if (s.value !== val) {
                        // Value assignment rejected; fall back to the index.
                        s.selectedIndex = option.index;
                    }
                    s.dispatchEvent(new Event('change', { bubbles: true }));
                    return true;
                }
            }
            return false;
        })()
    "#
    .to_string()
}

fn swatch_click_script() -> String {
    r#"
        (function() {
            const tiles = document.querySelectorAll(
                "button[role='radio'], .swatch, .variation, .item-variation");
            for (const t of tiles) {
                const rect = t.getBoundingClientRect();
                if (rect.width > 0 && rect.height > 0) {
                    t.click();
                    return true;
                }
            }
            return false;
        })()
    "#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    fn timing() -> TimingConfig {
        TimingConfig::fast()
    }

    #[test]
    fn script_literals_escape_control_characters() {
        let script = js_set_value_script("input#userid", "line1\r\nline2");
        assert!(script.contains("line1\\r\\nline2"));
        assert!(!script.contains('\r'));
    }

    #[tokio::test]
    async fn native_click_success_is_one_attempt() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator.click(&tab, "button#add", None).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(driver.clicks().len(), 1);
    }

    #[tokio::test]
    async fn scripted_fallback_reports_success_when_native_click_throws() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.fail_native_click("button#add");
        driver.on_script("el.click()", Value::Bool(true));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator.click(&tab, "button#add", None).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
        // No native click landed; the dispatch went through the script path.
        assert!(driver.clicks().is_empty());
    }

    #[tokio::test]
    async fn both_click_paths_failing_yields_failure_with_evidence() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.fail_native_click("button#add");
        driver.on_script("el.click()", Value::Bool(false));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator.click(&tab, "button#add", None).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
        let evidence = outcome.evidence.expect("diagnostics captured");
        assert!(evidence.screenshot.is_some());
        assert!(evidence.page_source.is_some());
    }

    #[tokio::test]
    async fn post_condition_met_reports_success() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.on_script("confirmationProbe", Value::Bool(true));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator
            .click(&tab, "button#add", Some("confirmationProbe()"))
            .await;
        assert!(outcome.succeeded);
    }

    #[tokio::test]
    async fn post_condition_never_met_fails_within_ceiling() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.on_script("confirmationProbe", Value::Bool(false));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let start = Instant::now();
        let outcome = actuator
            .click(&tab, "button#add", Some("confirmationProbe()"))
            .await;
        assert!(!outcome.succeeded);
        assert!(outcome.evidence.is_some());
        // Terminates at roughly the configured ceiling, never hangs.
        assert!(start.elapsed() < Duration::from_millis(timing.post_condition_timeout_ms + 500));
    }

    #[tokio::test]
    async fn set_text_falls_back_to_value_assignment() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.fail_native_typing("input#userid");
        driver.on_script("dispatchEvent", Value::Bool(true));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let action = Action::SetText {
            value: "user@example.com".to_string(),
        };
        let outcome = actuator.act(&tab, "input#userid", &action).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
        assert!(driver.typed().is_empty());
    }

    #[tokio::test]
    async fn set_text_resolving_re_resolves_fresh_each_attempt() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.navigate(&tab, "https://signin.example.com/").await.unwrap();
        driver.register_page(
            "https://signin.example.com/",
            r#"<html><body><input id="userid" name="userid"></body></html>"#,
        );
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator
            .set_text_resolving(&tab, Goal::EmailField, "user@example.com")
            .await;
        assert!(outcome.succeeded);
        let typed = driver.typed();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].1, "input#userid");
    }

    #[tokio::test]
    async fn set_text_resolving_exhausts_bounded_attempts() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.navigate(&tab, "https://signin.example.com/").await.unwrap();
        // Page never grows an email field.
        driver.register_page(
            "https://signin.example.com/",
            "<html><body><p>loading</p></body></html>",
        );
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator
            .set_text_resolving(&tab, Goal::EmailField, "user@example.com")
            .await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, timing.text_entry_attempts);
    }

    #[tokio::test]
    async fn variant_selection_stops_at_first_successful_strategy() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.on_script("type='radio'", Value::Bool(false));
        driver.on_script("selectedIndex", Value::Bool(true));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator.act(&tab, "body", &Action::SelectVariant).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn variant_selection_fails_when_no_strategy_applies() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.on_script("(function", Value::Bool(false));
        let timing = timing();
        let actuator = Actuator::new(&driver, &timing);

        let outcome = actuator.select_variant(&tab).await;
        assert!(!outcome.succeeded);
    }

    #[tokio::test]
    async fn challenge_wait_clears_when_page_state_changes() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.navigate(&tab, "https://www.example.com/item").await.unwrap();
        driver.register_page(
            "https://www.example.com/item",
            "<html><body><h1>Bouncy Castle</h1></body></html>",
        );
        let timing = timing();

        let result = wait_for_challenge_clear(&driver, &tab, &timing).await;
        assert_eq!(result, ChallengeWait::Cleared(PageState::Normal));
    }

    #[tokio::test]
    async fn challenge_wait_times_out_within_one_poll_of_ceiling() {
        let driver = MockDriver::new();
        let tab = driver.open_tab().await.unwrap();
        driver.navigate(&tab, "https://www.example.com/item").await.unwrap();
        driver.register_page(
            "https://www.example.com/item",
            r#"<html><body><div class="g-recaptcha"></div></body></html>"#,
        );
        let timing = timing();

        let start = Instant::now();
        let result = wait_for_challenge_clear(&driver, &tab, &timing).await;
        let elapsed = start.elapsed();

        assert_eq!(result, ChallengeWait::TimedOut);
        let ceiling = Duration::from_millis(timing.challenge_wait_timeout_ms);
        let one_poll = Duration::from_millis(timing.challenge_poll_ms);
        assert!(elapsed >= ceiling);
        assert!(elapsed < ceiling + one_poll + Duration::from_millis(150));
    }
}
