//! Candidate resolution: turn a semantic goal into an ordered, deduplicated
//! list of interactive elements.
//!
//! The target site renders the same logical control in several structural
//! layouts (classic result list vs. card grid, redesigned vs. legacy
//! add-to-cart buttons), and any of them can appear interchangeably or
//! together. A single selector is not sufficient, so each goal carries an
//! ordered chain of structural strategies; every strategy's hits are
//! appended to one running list, deduplicated by underlying node identity.
//! A failing strategy is skipped, never fatal, and an empty final list is a
//! valid result the caller interprets.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::dom;
use crate::signatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Goal {
    ProductLink,
    AddToCartControl,
    RemoveControl,
    SeeInCartControl,
    SearchBox,
    EmailField,
    PasswordField,
    ContinueControl,
    SignInControl,
    AccountIndicator,
}

/// One fixed structural lookup pattern for one known page-layout variant.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Plain CSS selector (selector lists allowed).
    Css(&'static str),
    /// Images matching the selector, resolved to their nearest enclosing
    /// anchor ancestor (card-grid layout).
    AnchorOfImage(&'static str),
    /// Any anchor whose href contains the segment.
    HrefContains(&'static str),
    /// Elements in `scope` whose text contains any needle, climbed to the
    /// nearest button/anchor ancestor when the match is a bare span.
    ControlByText {
        scope: &'static str,
        needles: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub pattern: Pattern,
}

/// Stateless value describing one resolution call.
#[derive(Debug, Clone)]
pub struct ResolutionQuery {
    pub goal: Goal,
    pub keyword: Option<String>,
    pub max_results: usize,
}

impl ResolutionQuery {
    pub fn new(goal: Goal) -> Self {
        Self {
            goal,
            keyword: None,
            max_results: 25,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Single-element query used when a flow needs "the" control.
    pub fn first(goal: Goal) -> Self {
        Self::new(goal).with_max_results(1)
    }
}

/// Transient handle to a page element considered for an action.
///
/// Derived attributes are captured from the snapshot; `selector` re-locates
/// the node on the live page. The underlying document may invalidate this at
/// any time, so callers must be prepared to re-resolve.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub selector: String,
    pub text: String,
    pub alt_text: Option<String>,
    pub href: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    pub strategy: &'static str,
}

/// Resolve a query against one snapshot. Strategy order is fixed; within a
/// strategy, document order is preserved; the result is capped after dedup.
pub fn resolve(html: &str, query: &ResolutionQuery) -> Vec<Candidate> {
    let doc = dom::parse(html);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for strategy in signatures::strategies_for(query.goal) {
        for el in find_matches(&doc, &strategy.pattern) {
            if !seen.insert(el.id()) {
                continue;
            }
            if let Some(candidate) = build_candidate(&el, strategy.name, query) {
                trace!(
                    strategy = strategy.name,
                    selector = %candidate.selector,
                    "candidate discovered"
                );
                candidates.push(candidate);
            }
            if candidates.len() >= query.max_results {
                debug!(
                    goal = ?query.goal,
                    count = candidates.len(),
                    "resolution capped at max_results"
                );
                return candidates;
            }
        }
    }

    debug!(goal = ?query.goal, count = candidates.len(), "resolution complete");
    candidates
}

fn find_matches<'a>(doc: &'a Html, pattern: &Pattern) -> Vec<ElementRef<'a>> {
    match pattern {
        Pattern::Css(sel) => match Selector::parse(sel) {
            Ok(selector) => doc.select(&selector).collect(),
            Err(_) => Vec::new(),
        },
        Pattern::AnchorOfImage(img_sel) => {
            let selector = match Selector::parse(img_sel) {
                Ok(s) => s,
                Err(_) => return Vec::new(),
            };
            doc.select(&selector)
                .filter_map(|img| dom::ancestor_with_tag(&img, "a"))
                .collect()
        }
        Pattern::HrefContains(segment) => {
            let selector = match Selector::parse("a[href]") {
                Ok(s) => s,
                Err(_) => return Vec::new(),
            };
            doc.select(&selector)
                .filter(|a| {
                    a.value()
                        .attr("href")
                        .map(|h| h.contains(segment))
                        .unwrap_or(false)
                })
                .collect()
        }
        Pattern::ControlByText { scope, needles } => {
            let selector = match Selector::parse(scope) {
                Ok(s) => s,
                Err(_) => return Vec::new(),
            };
            doc.select(&selector)
                .filter(|el| {
                    let text = combined_label(el).to_lowercase();
                    needles.iter().any(|n| text.contains(n))
                })
                .map(|el| climb_to_control(el))
                .collect()
        }
    }
}

/// Text plus aria-label, the way a user or screen reader would identify the
/// control.
fn combined_label(el: &ElementRef) -> String {
    let mut label = dom::text_of(el);
    if let Some(aria) = el.value().attr("aria-label") {
        label.push(' ');
        label.push_str(aria);
    }
    label
}

/// A labelled span is rarely the clickable node itself; prefer the nearest
/// enclosing button or anchor when one exists.
fn climb_to_control<'a>(el: ElementRef<'a>) -> ElementRef<'a> {
    let tag = el.value().name();
    if tag == "button" || tag == "a" {
        return el;
    }
    dom::ancestor_with_tag(&el, "button")
        .or_else(|| dom::ancestor_with_tag(&el, "a"))
        .unwrap_or(el)
}

fn build_candidate(
    el: &ElementRef,
    strategy: &'static str,
    query: &ResolutionQuery,
) -> Option<Candidate> {
    let href = el
        .value()
        .attr("href")
        .map(str::to_string)
        .filter(|h| !h.trim().is_empty());

    // Product links without a target are not actionable.
    if query.goal == Goal::ProductLink && href.is_none() {
        return None;
    }

    let candidate = Candidate {
        selector: dom::selector_for(el),
        text: dom::text_of(el),
        alt_text: dom::image_alt_of(el),
        href,
        visible: !dom::is_hidden(el),
        enabled: !dom::is_disabled(el),
        strategy,
    };

    if let Some(keyword) = &query.keyword {
        if !keyword_matches(&candidate, keyword) {
            trace!(selector = %candidate.selector, "candidate filtered by keyword");
            return None;
        }
    }

    Some(candidate)
}

/// Keyword filter: keep a candidate when any keyword token appears in its
/// combined text/alt/href, OR when its URL is structurally a product-detail
/// link. The path check is an unconditional override: a direct product link
/// is accepted even when the keyword only appears in an off-screen image.
pub fn keyword_matches(candidate: &Candidate, keyword: &str) -> bool {
    if let Some(href) = &candidate.href {
        if is_item_detail_link(href) {
            return true;
        }
    }

    let combined = format!(
        "{} {} {}",
        candidate.text,
        candidate.alt_text.as_deref().unwrap_or(""),
        candidate.href.as_deref().unwrap_or("")
    )
    .to_lowercase();

    keyword
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .any(|token| combined.contains(token))
}

fn is_item_detail_link(href: &str) -> bool {
    match Url::parse(href) {
        Ok(url) => url.path().contains(signatures::ITEM_DETAIL_PATH_SEGMENT),
        // Relative links never parse as absolute URLs; fall back to a raw
        // substring check.
        Err(_) => href.contains(signatures::ITEM_DETAIL_PATH_SEGMENT),
    }
}
