//! Search-and-add scenario: search for the keyword, walk the first page of
//! matching results, and add one product to the cart.
//!
//! Each candidate product opens in its own tab so a hostile or broken
//! product page never poisons the results page. The walk is bounded by the
//! configured product and challenge ceilings and stops at the first
//! successful add.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::actuate::{Action, Actuator};
use crate::classify::{classify_tab, PageState};
use crate::config::FlowConfig;
use crate::evidence::Evidence;
use crate::flows::context::FlowVerdict;
use crate::flows::{handle_challenge, think_pause, ChallengeOutcome, RunContext};
use crate::resolve::{resolve, Candidate, Goal, ResolutionQuery};
use crate::session::{Driver, TabTracker};
use crate::signatures;

/// What happened with one candidate product.
enum CandidateOutcome {
    Added,
    Skipped,
    AbortRun,
}

pub struct SearchFlow<'a, D: Driver> {
    driver: &'a D,
    config: &'a FlowConfig,
}

impl<'a, D: Driver> SearchFlow<'a, D> {
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
        let original = tracker.original().clone();

        if let Err(e) = self.driver.navigate(&original, &self.config.site.home_url).await {
            return FlowVerdict::Failed {
                reason: format!("could not open home page: {}", e),
            };
        }
        if classify_tab(self.driver, &original).await == PageState::OverlayPresent {
            actuator.dismiss_overlays(&original).await;
        }

        let outcome = actuator
            .set_text_resolving(&original, Goal::SearchBox, &ctx.keyword)
            .await;
        if !outcome.succeeded {
            ctx.attach_maybe(outcome.evidence);
            return FlowVerdict::Failed {
                reason: "could not enter the search keyword".to_string(),
            };
        }
        if let Err(e) = self.submit_search(&original, &actuator).await {
            return FlowVerdict::Failed {
                reason: format!("could not submit the search: {}", e),
            };
        }
        sleep(Duration::from_millis(timing.results_wait_ms)).await;

        match handle_challenge(self.driver, &original, ctx, timing, self.config.limits.max_challenges)
            .await
        {
            ChallengeOutcome::AbortRun => {
                return FlowVerdict::Aborted {
                    reason: "challenge ceiling reached on the results page".to_string(),
                }
            }
            ChallengeOutcome::TimedOut => {
                return FlowVerdict::Failed {
                    reason: "challenge on the results page was not cleared".to_string(),
                }
            }
            _ => {}
        }

        let candidates = match self.collect_candidates(&original, ctx).await {
            Ok(candidates) => candidates,
            Err(verdict) => return verdict,
        };
        info!(count = candidates.len(), "product candidates collected");

        let mut verdict = FlowVerdict::Failed {
            reason: "no candidate product could be added".to_string(),
        };
        for (index, candidate) in candidates.iter().enumerate() {
            debug!(index, selector = %candidate.selector, strategy = candidate.strategy, "trying candidate");
            match self.try_candidate(tracker, ctx, &actuator, candidate).await {
                CandidateOutcome::Added => {
                    verdict = FlowVerdict::Completed;
                    break;
                }
                CandidateOutcome::Skipped => continue,
                CandidateOutcome::AbortRun => {
                    verdict = FlowVerdict::Aborted {
                        reason: "challenge ceiling reached while opening products".to_string(),
                    };
                    break;
                }
            }
        }

        tracker.release_all().await;
        verdict
    }

    /// Submit the search from the box itself so the flow works even when the
    /// dedicated search button is not rendered.
    async fn submit_search(&self, tab: &D::TabHandle, actuator: &Actuator<'_, D>) -> crate::errors::Result<()> {
        let html = self.driver.page_source(tab).await?;
        match resolve(&html, &ResolutionQuery::first(Goal::SearchBox)).first() {
            Some(search_box) => actuator.submit_enclosing_form(tab, &search_box.selector).await,
            None => Ok(()),
        }
    }

    async fn collect_candidates(
        &self,
        tab: &D::TabHandle,
        ctx: &mut RunContext,
    ) -> std::result::Result<Vec<Candidate>, FlowVerdict> {
        let html = match self.driver.page_source(tab).await {
            Ok(html) => html,
            Err(e) => {
                return Err(FlowVerdict::Failed {
                    reason: format!("could not snapshot the results page: {}", e),
                })
            }
        };

        let mut query = ResolutionQuery::new(Goal::ProductLink)
            .with_max_results(self.config.limits.max_products);
        if self.config.limits.keyword_match_required {
            query = query.with_keyword(&ctx.keyword);
        }

        let candidates = resolve(&html, &query);
        if candidates.is_empty() {
            ctx.attach(Evidence::capture(self.driver, tab, "no_results").await);
            return Err(FlowVerdict::Failed {
                reason: format!("no results matched '{}'", ctx.keyword),
            });
        }
        Ok(candidates)
    }

    async fn try_candidate(
        &self,
        tracker: &mut TabTracker<'_, D>,
        ctx: &mut RunContext,
        actuator: &Actuator<'_, D>,
        candidate: &Candidate,
    ) -> CandidateOutcome {
        let timing = &self.config.timing;
        think_pause(timing.think_min_ms, timing.think_max_ms).await;

        let href = match &candidate.href {
            Some(href) => href.clone(),
            None => return CandidateOutcome::Skipped,
        };
        let tab = match tracker.spawn(&href).await {
            Ok(tab) => tab,
            Err(e) => {
                warn!(%href, error = %e, "could not open product tab");
                tracker.close_spawned().await;
                return CandidateOutcome::Skipped;
            }
        };
        think_pause(timing.tab_switch_min_ms, timing.tab_switch_max_ms).await;

        match handle_challenge(self.driver, &tab, ctx, timing, self.config.limits.max_challenges)
            .await
        {
            ChallengeOutcome::AbortRun => return CandidateOutcome::AbortRun,
            ChallengeOutcome::TimedOut => {
                tracker.close_spawned().await;
                return CandidateOutcome::Skipped;
            }
            _ => {}
        }

        match classify_tab(self.driver, &tab).await {
            PageState::VariantSelectionRequired => {
                // The add control stays inert until a variant is picked.
                if !actuator.select_variant(&tab).await.succeeded {
                    debug!(%href, "variant prompt could not be satisfied");
                    tracker.close_spawned().await;
                    return CandidateOutcome::Skipped;
                }
            }
            PageState::OverlayPresent => {
                actuator.dismiss_overlays(&tab).await;
            }
            _ => {}
        }

        if !self.add_to_cart(&tab, ctx, actuator).await {
            tracker.close_spawned().await;
            return CandidateOutcome::Skipped;
        }

        ctx.record_added();
        tracker.close_spawned().await;
        think_pause(timing.tab_switch_min_ms, timing.tab_switch_max_ms).await;
        CandidateOutcome::Added
    }

    /// Click the add control and require the "See in cart" confirmation. A
    /// miss gets one variant-selection recovery attempt before giving up on
    /// this product.
    async fn add_to_cart(
        &self,
        tab: &D::TabHandle,
        ctx: &mut RunContext,
        actuator: &Actuator<'_, D>,
    ) -> bool {
        let add_control = match self.first_candidate(tab, Goal::AddToCartControl).await {
            Some(c) => c,
            None => {
                debug!("no add-to-cart control on the product page");
                return false;
            }
        };

        let action = Action::Click {
            post_condition: Some(signatures::see_in_cart_probe_script()),
        };
        let mut outcome = actuator.act(tab, &add_control.selector, &action).await;

        if !outcome.succeeded && actuator.select_variant(tab).await.succeeded {
            outcome = actuator.act(tab, &add_control.selector, &action).await;
        }
        if !outcome.succeeded {
            ctx.attach_maybe(outcome.evidence);
            return false;
        }

        // Some layouts confirm through a button that jumps to the cart.
        if let Some(confirm) = self.first_candidate(tab, Goal::SeeInCartControl).await {
            if confirm.visible {
                let _ = actuator.click(tab, &confirm.selector, None).await;
            }
        }
        true
    }

    async fn first_candidate(&self, tab: &D::TabHandle, goal: Goal) -> Option<Candidate> {
        let html = self.driver.page_source(tab).await.ok()?;
        resolve(&html, &ResolutionQuery::first(goal)).first().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::testing::MockDriver;
    use serde_json::Value;

    const HOME_URL: &str = "https://www.example.com";
    const RESULTS_URL: &str = "https://www.example.com/sch?kw=outdoor+toys";

    const HOME_PAGE: &str = r#"<html><body>
        <form><input id="gh-ac" name="_nkw"></form>
    </body></html>"#;

    const RESULTS_PAGE: &str = r#"<html><body><ul class="srp-results">
        <li class="s-item"><a class="s-item__link" href="https://www.example.com/itm/100">Outdoor Toys Bundle</a></li>
        <li class="s-item"><a class="s-item__link" href="https://www.example.com/itm/200">Outdoor Toys Slide</a></li>
        <li class="s-item"><a class="s-item__link" href="https://www.example.com/itm/300">Outdoor Toys Swing</a></li>
    </ul></body></html>"#;

    const CHALLENGE_PRODUCT: &str = r#"<html><body>
        <div class="g-recaptcha"></div>
    </body></html>"#;

    const VARIANT_PRODUCT: &str = r#"<html><body>
        <p>Please select a colour</p>
        <button id="atc-variant"><span class="ux-call-to-action__text">Add to cart</span></button>
    </body></html>"#;

    const PLAIN_PRODUCT: &str = r#"<html><body>
        <h1>Outdoor Toys Swing</h1>
        <button id="atc-plain"><span class="ux-call-to-action__text">Add to cart</span></button>
    </body></html>"#;

    fn config() -> FlowConfig {
        let mut config = FlowConfig::default();
        config.timing = TimingConfig::fast();
        config.site.home_url = HOME_URL.to_string();
        config
    }

    fn driver_with_results() -> MockDriver {
        let driver = MockDriver::new();
        driver.register_page(HOME_URL, HOME_PAGE);
        driver.register_page(RESULTS_URL, RESULTS_PAGE);
        driver.navigate_on_script("el.form.submit()", RESULTS_URL);
        driver
    }

    #[tokio::test]
    async fn one_product_is_added_across_hostile_candidates() {
        let driver = driver_with_results();
        driver.register_page("https://www.example.com/itm/100", CHALLENGE_PRODUCT);
        driver.register_page("https://www.example.com/itm/200", VARIANT_PRODUCT);
        driver.register_page("https://www.example.com/itm/300", PLAIN_PRODUCT);
        driver.on_script("see in cart", Value::Bool(true));

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = SearchFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;

        // The challenge candidate times out, the variant candidate cannot be
        // satisfied, the plain candidate succeeds.
        assert_eq!(verdict, FlowVerdict::Completed);
        assert_eq!(ctx.added_count(), 1);
        assert_eq!(ctx.challenges_seen(), 1);
        assert!(driver.clicks().iter().any(|(_, sel)| sel == "button#atc-plain"));
        // Only the original tab survives the run.
        assert_eq!(driver.open_tab_count(), 1);
    }

    #[tokio::test]
    async fn empty_results_fail_with_diagnostics() {
        let driver = MockDriver::new();
        driver.register_page(HOME_URL, HOME_PAGE);
        driver.register_page(RESULTS_URL, "<html><body><p>0 results</p></body></html>");
        driver.navigate_on_script("el.form.submit()", RESULTS_URL);

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = SearchFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert!(matches!(verdict, FlowVerdict::Failed { .. }));
        assert_eq!(ctx.added_count(), 0);
    }

    #[tokio::test]
    async fn challenge_ceiling_aborts_the_run_and_closes_tabs() {
        let driver = driver_with_results();
        driver.register_page("https://www.example.com/itm/100", CHALLENGE_PRODUCT);
        driver.register_page("https://www.example.com/itm/200", CHALLENGE_PRODUCT);
        driver.register_page("https://www.example.com/itm/300", PLAIN_PRODUCT);

        let mut config = config();
        config.limits.max_challenges = 2;
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = SearchFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert!(matches!(verdict, FlowVerdict::Aborted { .. }));
        assert_eq!(ctx.challenges_seen(), 2);
        assert_eq!(driver.open_tab_count(), 1);
    }

    #[tokio::test]
    async fn missed_confirmation_recovers_through_variant_selection() {
        let driver = driver_with_results();
        driver.register_page("https://www.example.com/itm/100", PLAIN_PRODUCT);
        // Native click is rejected; the scripted click fails once, then the
        // variant recovery unblocks the control and the retry goes through.
        driver.fail_native_click("button#atc-plain");
        driver.on_script_sequence(
            "el.click()",
            vec![Value::Bool(false), Value::Bool(true)],
        );
        driver.on_script("type='radio'", Value::Bool(true));
        driver.on_script("see in cart", Value::Bool(true));

        let config = config();
        let original = driver.open_tab().await.unwrap();
        let mut tracker = TabTracker::new(&driver, original);
        let mut ctx = RunContext::new("outdoor toys");
        let flow = SearchFlow::new(&driver, &config);

        let verdict = flow.run(&mut tracker, &mut ctx).await;
        assert_eq!(verdict, FlowVerdict::Completed);
        assert_eq!(ctx.added_count(), 1);
        let ran_radio_selection = driver
            .scripts()
            .iter()
            .any(|(_, s)| s.contains("type='radio'"));
        assert!(ran_radio_selection);
    }
}
