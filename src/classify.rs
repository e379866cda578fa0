//! Page-state classification over a DOM snapshot.
//!
//! `classify` inspects one HTML snapshot and decides whether the page is
//! interactable, blocked by a verification challenge, waiting on a variant
//! choice, or covered by a consent overlay. Detection rules run in fixed
//! priority order and the first match wins: a blocked page must never be
//! treated as merely needing a variant, so Challenge dominates everything.
//!
//! Classification never fails. Any lookup that goes wrong counts as "feature
//! absent", degrading toward `Normal`/`Unknown` instead of aborting the
//! caller.

use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom;
use crate::session::Driver;
use crate::signatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageState {
    Normal,
    OverlayPresent,
    ChallengePresent,
    VariantSelectionRequired,
    Unknown,
}

/// Classify one snapshot. Computed fresh on every call; results must never
/// be cached across navigation because the document can change between any
/// two operations.
pub fn classify(html: &str) -> PageState {
    if html.trim().is_empty() {
        return PageState::Unknown;
    }
    let doc = dom::parse(html);

    let body_sel = match Selector::parse("body") {
        Ok(s) => s,
        Err(_) => return PageState::Unknown,
    };
    let body = match doc.select(&body_sel).next() {
        Some(b) => b,
        None => return PageState::Unknown,
    };
    let body_text = dom::text_of(&body).to_lowercase();

    // 1. Challenge: iframe signature, body phrase, or widget class.
    if matches_selector(&doc, signatures::CHALLENGE_IFRAME_SELECTOR)
        || signatures::CHALLENGE_PHRASES.iter().any(|p| body_text.contains(p))
        || matches_selector(&doc, signatures::CHALLENGE_WIDGET_SELECTOR)
    {
        debug!("classified as ChallengePresent");
        return PageState::ChallengePresent;
    }

    // 2. Variant selection required.
    if variant_selection_required(&doc, &body_text) {
        debug!("classified as VariantSelectionRequired");
        return PageState::VariantSelectionRequired;
    }

    // 3. Overlay: a visible close/accept control from the known list.
    for sel in signatures::OVERLAY_DISMISS_SELECTORS {
        if let Ok(selector) = Selector::parse(sel) {
            if doc.select(&selector).any(|el| !dom::is_hidden(&el)) {
                debug!(selector = sel, "classified as OverlayPresent");
                return PageState::OverlayPresent;
            }
        }
    }

    PageState::Normal
}

/// Snapshot the live tab and classify it. Session faults degrade to
/// `Unknown` rather than propagating.
pub async fn classify_tab<D: Driver>(driver: &D, tab: &D::TabHandle) -> PageState {
    match driver.page_source(tab).await {
        Ok(html) => classify(&html),
        Err(_) => PageState::Unknown,
    }
}

fn matches_selector(doc: &scraper::Html, selector: &str) -> bool {
    match Selector::parse(selector) {
        Ok(s) => doc.select(&s).next().is_some(),
        Err(_) => false,
    }
}

fn variant_selection_required(doc: &scraper::Html, body_text: &str) -> bool {
    // Explicit "please select a colour/color" prompt anywhere on the page.
    if signatures::VARIANT_PROMPT_PHRASES.iter().any(|p| body_text.contains(p)) {
        return true;
    }

    // A label pairing "select" with "colour/color".
    if let Ok(label_sel) = Selector::parse("label") {
        for label in doc.select(&label_sel) {
            let text = dom::text_of(&label).to_lowercase();
            if signatures::VARIANT_LABEL_WORDS
                .iter()
                .any(|(a, b)| text.contains(a) && text.contains(b))
            {
                return true;
            }
        }
    }

    // A select whose chosen option is still the "Select ..." placeholder.
    if let Ok(select_sel) = Selector::parse("select") {
        for select in doc.select(&select_sel) {
            if let Some(chosen) = dom::selected_option_text(&select) {
                if chosen
                    .trim()
                    .to_lowercase()
                    .starts_with(signatures::VARIANT_PLACEHOLDER_PREFIX)
                {
                    return true;
                }
            }
        }
    }

    false
}
