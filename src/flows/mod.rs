//! End-to-end scenarios composed from the resolution and actuation layers.

pub mod cart;
pub mod context;
pub mod login;
pub mod search;

pub use cart::CartFlow;
pub use context::{FlowReport, FlowVerdict, RunContext};
pub use login::{Credentials, LoginFlow};
pub use search::SearchFlow;

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;

use crate::actuate::{wait_for_challenge_clear, ChallengeWait};
use crate::classify::{classify_tab, PageState};
use crate::config::TimingConfig;
use crate::evidence::Evidence;
use crate::resolve::{resolve, Candidate, Goal, ResolutionQuery};
use crate::session::Driver;

/// Randomized pause between interactions so the run paces like a person
/// browsing rather than a tight loop.
pub async fn think_pause(min_ms: u64, max_ms: u64) {
    let ms = if max_ms > min_ms {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    sleep(Duration::from_millis(ms)).await;
}

/// What a flow should do after probing a page for a verification challenge.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChallengeOutcome {
    NotPresent,
    Cleared,
    /// Challenge stayed on screen past the ceiling.
    TimedOut,
    /// Per-run challenge ceiling reached; stop the whole scenario.
    AbortRun,
}

/// Probe one tab for a challenge and, when present, record it against the
/// run limits and wait for a human to clear it.
pub(crate) async fn handle_challenge<D: Driver>(
    driver: &D,
    tab: &D::TabHandle,
    ctx: &mut RunContext,
    timing: &TimingConfig,
    max_challenges: u32,
) -> ChallengeOutcome {
    if classify_tab(driver, tab).await != PageState::ChallengePresent {
        return ChallengeOutcome::NotPresent;
    }

    ctx.attach(Evidence::capture(driver, tab, "challenge").await);
    if ctx.record_challenge(max_challenges) {
        return ChallengeOutcome::AbortRun;
    }

    match wait_for_challenge_clear(driver, tab, timing).await {
        ChallengeWait::Cleared(_) => ChallengeOutcome::Cleared,
        ChallengeWait::TimedOut => ChallengeOutcome::TimedOut,
    }
}

/// Poll fresh snapshots until a goal resolves to a candidate or the ceiling
/// elapses.
pub(crate) async fn wait_for_candidate<D: Driver>(
    driver: &D,
    tab: &D::TabHandle,
    goal: Goal,
    timeout_ms: u64,
    poll_ms: u64,
) -> Option<Candidate> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if let Ok(html) = driver.page_source(tab).await {
            if let Some(candidate) = resolve(&html, &ResolutionQuery::first(goal)).first() {
                return Some(candidate.clone());
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(Duration::from_millis(poll_ms)).await;
    }
}
