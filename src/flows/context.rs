//! Per-run bookkeeping shared across scenario steps.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::evidence::Evidence;

/// Terminal status of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowVerdict {
    Completed,
    Failed { reason: String },
    /// The run was cut short deliberately, e.g. too many verification
    /// challenges in one session.
    Aborted { reason: String },
}

impl FlowVerdict {
    pub fn is_completed(&self) -> bool {
        matches!(self, FlowVerdict::Completed)
    }
}

#[derive(Debug, Serialize)]
pub struct FlowReport {
    pub run_id: Uuid,
    pub verdict: FlowVerdict,
    pub products_added: usize,
    pub challenges_seen: u32,
    #[serde(skip)]
    pub artifacts: Vec<Evidence>,
}

/// Mutable state threaded through a scenario: identity, counters enforcing
/// the session limits, and the diagnostic artifacts collected along the way.
pub struct RunContext {
    pub run_id: Uuid,
    pub keyword: String,
    challenge_count: u32,
    added_count: usize,
    artifacts: Vec<Evidence>,
}

impl RunContext {
    pub fn new(keyword: impl Into<String>) -> Self {
        let run_id = Uuid::new_v4();
        let keyword = keyword.into();
        info!(%run_id, %keyword, "run started");
        Self {
            run_id,
            keyword,
            challenge_count: 0,
            added_count: 0,
            artifacts: Vec::new(),
        }
    }

    /// Count one challenge encounter. Returns true once the per-run ceiling
    /// is reached and the scenario must abort rather than keep poking a
    /// suspicious-looking session.
    pub fn record_challenge(&mut self, max_challenges: u32) -> bool {
        self.challenge_count += 1;
        warn!(
            count = self.challenge_count,
            max = max_challenges,
            "verification challenge encountered"
        );
        self.challenge_count >= max_challenges
    }

    pub fn record_added(&mut self) {
        self.added_count += 1;
        info!(total = self.added_count, "product added to cart");
    }

    pub fn attach(&mut self, evidence: Evidence) {
        self.artifacts.push(evidence);
    }

    pub fn attach_maybe(&mut self, evidence: Option<Evidence>) {
        if let Some(e) = evidence {
            self.artifacts.push(e);
        }
    }

    pub fn challenges_seen(&self) -> u32 {
        self.challenge_count
    }

    pub fn added_count(&self) -> usize {
        self.added_count
    }

    pub fn into_report(self, verdict: FlowVerdict) -> FlowReport {
        info!(run_id = %self.run_id, verdict = ?verdict, added = self.added_count, "run finished");
        FlowReport {
            run_id: self.run_id,
            verdict,
            products_added: self.added_count,
            challenges_seen: self.challenge_count,
            artifacts: self.artifacts,
        }
    }
}
