//! Cart cleanup scenario: open the cart, remove the most recently added
//! item, and prove the removal took effect.
//!
//! The cart renders one remove control per line item with no stable mapping
//! from control to product, so "the most recently added item" is taken to be
//! the last remove control in document order. Success is confirmed by the
//! visible remove-control count going down, not by the click dispatching.

use tracing::{debug, info};

use crate::actuate::Actuator;
use crate::config::FlowConfig;
use crate::evidence::Evidence;
use crate::flows::context::FlowVerdict;
use crate::flows::{handle_challenge, think_pause, ChallengeOutcome, RunContext};
use crate::resolve::{resolve, Goal, ResolutionQuery};
use crate::session::{Driver, TabTracker};
use crate::signatures;

pub struct CartFlow<'a, D: Driver> {
    driver: &'a D,
    config: &'a FlowConfig,
}

impl<'a, D: Driver> CartFlow<'a, D> {
    pub fn new(driver: &'a D, config: &'a FlowConfig) -> Self {
        Self { driver, config }
    }

    pub async fn run(
        &self,
        tracker: &mut TabTracker<'_, D>,
        ctx: &mut RunContext,
    ) -> FlowVerdict {
        let timing = &self.config.timing;
        let actuator = Actuator::new(self.driver, timing);

        let tab = match tracker.spawn(&self.config.site.cart_url).await {
            Ok(tab) => tab,
            Err(e) => {
                tracker.release_all().await;
                return FlowVerdict::Failed {
                    reason: format!("could not open the cart: {}", e),
                };
            }
        };
        think_pause(timing.tab_switch_min_ms, timing.tab_switch_max_ms).await;

        match handle_challenge(self.driver, &tab, ctx, timing, self.config.limits.max_challenges)
            .await
        {
            ChallengeOutcome::AbortRun => {
                tracker.release_all().await;
                return FlowVerdict::Aborted {
                    reason: "challenge ceiling reached in the cart".to_string(),
                };
            }
            ChallengeOutcome::TimedOut => {
                tracker.release_all().await;
                return FlowVerdict::Failed {
                    reason: "challenge in the cart was not cleared".to_string(),
                };
            }
            _ => {}
        }

        ctx.attach(Evidence::capture(self.driver, &tab, "cart_before").await);

        let query = ResolutionQuery::new(Goal::RemoveControl)
            .with_max_results(self.config.limits.max_candidates);
        let removable = match self.driver.page_source(&tab).await {
            Ok(html) => resolve(&html, &query)
                .into_iter()
                .filter(|c| c.visible && c.enabled)
                .collect::<Vec<_>>(),
            Err(e) => {
                tracker.release_all().await;
                return FlowVerdict::Failed {
                    reason: format!("could not snapshot the cart: {}", e),
                };
            }
        };
        let target = match removable.last() {
            Some(c) => c.clone(),
            None => {
                ctx.attach(Evidence::capture(self.driver, &tab, "cart_empty").await);
                tracker.release_all().await;
                return FlowVerdict::Failed {
                    reason: "cart has no removable items".to_string(),
                };
            }
        };

        let count_before = match self
            .driver
            .execute_script(&tab, &signatures::remove_control_count_script())
            .await
        {
            Ok(v) => v.as_u64().unwrap_or(removable.len() as u64),
            Err(_) => removable.len() as u64,
        };
        debug!(count_before, selector = %target.selector, "removing last cart line");

        // The removal has landed once the control count drops below the
        // starting count; the cart re-renders asynchronously after the click.
        let probe = format!(
            "{} < {}",
            signatures::remove_control_count_script(),
            count_before
        );
        let outcome = actuator.click(&tab, &target.selector, Some(&probe)).await;
        if !outcome.succeeded {
            ctx.attach_maybe(outcome.evidence);
            tracker.release_all().await;
            return FlowVerdict::Failed {
                reason: "removal was not reflected in the cart".to_string(),
            };
        }

        ctx.attach(Evidence::capture(self.driver, &tab, "cart_after").await);
        info!("cart line removed and confirmed");
        tracker.release_all().await;
        FlowVerdict::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::testing::MockDriver;
    use serde_json::Value;

    const CART_URL: &str = "https://cart.example.com";

    const CART_PAGE: &str = r#"<html><body><div id="cart">
        <div class="line"><button id="rm1">Remove</button></div>
        <div class="line"><button id="rm2">Remove</button></div>
    </div></body></html>"#;

    fn config() -> FlowConfig {
        let mut config = FlowConfig::default();
        config.timing = TimingConfig::fast();
        config.site.cart_url = CART_URL.to_string();
        config
    }

    #[tokio::test]
    async fn removes_the_last_control_and_confirms_by_count() {
        let driver = MockDriver::new();
        driver.register_page(CART_URL, CART_PAGE);
        // The comparison probe fails once while the cart re-renders, then
        // confirms; the bare count query reports the starting total.
        driver.on_script_sequence("< 2", vec![Value::Bool(false), Value::Bool(true)]);
        driver.on_script("count++", Value::from(2));

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = CartFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert_eq!(verdict, FlowVerdict::Completed);
        // Document order puts the newest line last.
        assert!(driver.clicks().iter().any(|(_, sel)| sel == "button#rm2"));
        assert!(!driver.clicks().iter().any(|(_, sel)| sel == "button#rm1"));
        assert_eq!(driver.open_tab_count(), 1);
    }

    #[tokio::test]
    async fn candidate_cap_bounds_remove_control_resolution() {
        let driver = MockDriver::new();
        driver.register_page(CART_URL, CART_PAGE);
        driver.on_script("< 2", Value::Bool(true));
        driver.on_script("count++", Value::from(2));

        let mut config = config();
        // With the cap at one, only the first control resolves and becomes
        // the removal target.
        config.limits.max_candidates = 1;
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = CartFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert_eq!(verdict, FlowVerdict::Completed);
        assert!(driver.clicks().iter().any(|(_, sel)| sel == "button#rm1"));
        assert!(!driver.clicks().iter().any(|(_, sel)| sel == "button#rm2"));
    }

    #[tokio::test]
    async fn empty_cart_fails_with_diagnostics() {
        let driver = MockDriver::new();
        driver.register_page(CART_URL, "<html><body><p>Your cart is empty</p></body></html>");

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = CartFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert!(matches!(verdict, FlowVerdict::Failed { .. }));
        assert_eq!(driver.open_tab_count(), 1);
    }

    #[tokio::test]
    async fn unconfirmed_removal_is_a_failure() {
        let driver = MockDriver::new();
        driver.register_page(CART_URL, CART_PAGE);
        driver.on_script("< 2", Value::Bool(false));
        driver.on_script("count++", Value::from(2));

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = CartFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert!(matches!(verdict, FlowVerdict::Failed { .. }));
        assert_eq!(driver.open_tab_count(), 1);
    }

    #[tokio::test]
    async fn challenge_blocking_the_cart_is_a_failure() {
        let driver = MockDriver::new();
        driver.register_page(
            CART_URL,
            r#"<html><body><iframe src="https://hcaptcha.com/x"></iframe></body></html>"#,
        );

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = CartFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert!(matches!(verdict, FlowVerdict::Failed { .. }));
        assert_eq!(ctx.challenges_seen(), 1);
        assert_eq!(driver.open_tab_count(), 1);
    }
}
