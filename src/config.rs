use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowConfig {
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub limits: LimitConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
}

/// All waits in the suite are bounded by one of these ceilings; there is no
/// unbounded polling loop anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Layout-settling pause after scrolling a target into view.
    pub settle_ms: u64,
    /// Ceiling for post-condition polling after a click.
    pub post_condition_timeout_ms: u64,
    pub post_condition_poll_ms: u64,
    /// How long to wait for a human to clear a verification challenge.
    pub challenge_wait_timeout_ms: u64,
    pub challenge_poll_ms: u64,
    /// Text entry re-resolves the target fresh on each attempt because the
    /// sign-in page is known to reload mid-step.
    pub text_entry_attempts: u32,
    pub text_entry_backoff_ms: u64,
    /// Randomized human-pacing pause between candidate interactions.
    pub think_min_ms: u64,
    pub think_max_ms: u64,
    /// Pause after spawning or closing a tab.
    pub tab_switch_min_ms: u64,
    pub tab_switch_max_ms: u64,
    /// Wait for search results to start rendering before resolution.
    pub results_wait_ms: u64,
    pub login_verify_timeout_ms: u64,
    pub field_wait_timeout_ms: u64,
    pub field_wait_poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// How many products on the first results page to try.
    pub max_products: usize,
    /// Abort the scenario once this many challenges appear in one run.
    pub max_challenges: u32,
    /// Require a keyword token in href/title/alt before opening a candidate.
    pub keyword_match_required: bool,
    /// Cap on candidates returned by a single resolution call.
    pub max_candidates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub home_url: String,
    pub signin_url: String,
    pub cart_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1280,
            window_height: 720,
            user_agent: None,
            args: vec![],
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 400,
            post_condition_timeout_ms: 6_000,
            post_condition_poll_ms: 250,
            challenge_wait_timeout_ms: 180_000,
            challenge_poll_ms: 3_000,
            text_entry_attempts: 4,
            text_entry_backoff_ms: 600,
            think_min_ms: 1_000,
            think_max_ms: 3_000,
            tab_switch_min_ms: 800,
            tab_switch_max_ms: 1_600,
            results_wait_ms: 2_000,
            login_verify_timeout_ms: 20_000,
            field_wait_timeout_ms: 20_000,
            field_wait_poll_ms: 400,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_products: 5,
            max_challenges: 2,
            keyword_match_required: true,
            max_candidates: 25,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            home_url: "https://www.ebay.com".to_string(),
            signin_url: "https://signin.ebay.com/".to_string(),
            cart_url: "https://cart.ebay.com".to_string(),
        }
    }
}

impl TimingConfig {
    /// Near-zero variant used by tests so polling loops terminate quickly.
    pub fn fast() -> Self {
        Self {
            settle_ms: 0,
            post_condition_timeout_ms: 50,
            post_condition_poll_ms: 10,
            challenge_wait_timeout_ms: 200,
            challenge_poll_ms: 20,
            text_entry_attempts: 4,
            text_entry_backoff_ms: 1,
            think_min_ms: 0,
            think_max_ms: 1,
            tab_switch_min_ms: 0,
            tab_switch_max_ms: 1,
            results_wait_ms: 0,
            login_verify_timeout_ms: 100,
            field_wait_timeout_ms: 100,
            field_wait_poll_ms: 10,
        }
    }
}
