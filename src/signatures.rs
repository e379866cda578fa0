//! Site-specific markup knowledge, isolated from the resolution and
//! actuation protocol so the matching rules can be swapped without touching
//! the surrounding machinery.
//!
//! Everything in this module describes one target site (eBay-shaped markup):
//! challenge widgets, consent overlays, variant prompts, and the structural
//! layout variants of each semantic control.

use crate::resolve::{Goal, Pattern, Strategy};

// ---------------------------------------------------------------------------
// Challenge detection
// ---------------------------------------------------------------------------

pub const CHALLENGE_IFRAME_SELECTOR: &str =
    "iframe[src*='hcaptcha'], iframe[src*='recaptcha'], iframe[src*='captcha']";

pub const CHALLENGE_WIDGET_SELECTOR: &str =
    ".h-captcha, .h-captcha-checkbox, .g-recaptcha, .captcha";

pub const CHALLENGE_PHRASES: &[&str] = &[
    "please verify yourself",
    "please verify",
    "verify yourself",
    "security check",
    "select the images",
    "i am not a robot",
];

// ---------------------------------------------------------------------------
// Overlays and variant prompts
// ---------------------------------------------------------------------------

/// Common cookie/consent close buttons, tried in order when dismissing.
pub const OVERLAY_DISMISS_SELECTORS: &[&str] = &[
    "button[aria-label='Close']",
    "button[aria-label='Accept']",
    "button[aria-label='I accept']",
    "button#gdpr-banner-accept",
    "button.privacy-accept",
];

pub const VARIANT_PROMPT_PHRASES: &[&str] =
    &["please select a colour", "please select a color"];

pub const VARIANT_LABEL_WORDS: &[(&str, &str)] = &[("select", "colour"), ("select", "color")];

/// A select whose chosen option still starts with this word is an
/// unconfigured placeholder.
pub const VARIANT_PLACEHOLDER_PREFIX: &str = "select";

/// Sign-in error banner shown when the site rejects the entered email.
pub const EMAIL_REJECTED_PHRASES: &[&str] = &["not a match"];

/// Path segment identifying a product detail page. A link whose URL contains
/// this is accepted as a product link even without a keyword match.
pub const ITEM_DETAIL_PATH_SEGMENT: &str = "/itm/";

pub const SEE_IN_CART_PHRASE: &str = "see in cart";

// ---------------------------------------------------------------------------
// Structural strategies per semantic goal
// ---------------------------------------------------------------------------

const PRODUCT_LINK_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "primary-result-link",
        pattern: Pattern::Css("a.s-item__link"),
    },
    Strategy {
        name: "result-item-anchor",
        pattern: Pattern::Css("li.s-item a"),
    },
    Strategy {
        name: "results-region-anchor",
        pattern: Pattern::Css(".srp-results a, .s-item__wrapper a, .s-list .s-item a"),
    },
    Strategy {
        name: "card-image-anchor",
        pattern: Pattern::AnchorOfImage("img.s-card__image"),
    },
    Strategy {
        name: "item-detail-href",
        pattern: Pattern::HrefContains(ITEM_DETAIL_PATH_SEGMENT),
    },
];

const ADD_TO_CART_NEEDLES: &[&str] = &["add to cart", "add to basket"];

const ADD_TO_CART_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "call-to-action-span",
        pattern: Pattern::ControlByText {
            scope: "span.ux-call-to-action__text",
            needles: ADD_TO_CART_NEEDLES,
        },
    },
    Strategy {
        name: "any-labelled-span",
        pattern: Pattern::ControlByText {
            scope: "span",
            needles: ADD_TO_CART_NEEDLES,
        },
    },
    Strategy {
        name: "known-button-variants",
        pattern: Pattern::Css(
            "#atcRedesignId_btn, button#isCartBtn_btn, button[aria-label='Add to cart'], \
             button[title='Add to cart'], button[data-testid='add-to-cart-button'], \
             button[aria-describedby*='atc']",
        ),
    },
    Strategy {
        name: "labelled-button",
        pattern: Pattern::ControlByText {
            scope: "button",
            needles: ADD_TO_CART_NEEDLES,
        },
    },
];

const REMOVE_NEEDLES: &[&str] = &["remove", "delete"];

const REMOVE_CONTROL_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "labelled-remove-button",
        pattern: Pattern::ControlByText {
            scope: "button",
            needles: REMOVE_NEEDLES,
        },
    },
    Strategy {
        name: "labelled-remove-anchor",
        pattern: Pattern::ControlByText {
            scope: "a",
            needles: REMOVE_NEEDLES,
        },
    },
    Strategy {
        name: "aria-remove-button",
        pattern: Pattern::Css(
            "button[aria-label*='Remove'], button[aria-label*='remove'], button[aria-label*='delete']",
        ),
    },
];

const SEE_IN_CART_STRATEGIES: &[Strategy] = &[Strategy {
    name: "see-in-cart-span",
    pattern: Pattern::ControlByText {
        scope: "span",
        needles: &["see in cart"],
    },
}];

const SEARCH_BOX_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "header-search-input",
        pattern: Pattern::Css("#gh-ac"),
    },
    Strategy {
        name: "named-search-input",
        pattern: Pattern::Css("input[name='_nkw']"),
    },
    Strategy {
        name: "labelled-search-input",
        pattern: Pattern::Css("input[aria-label*='Search'], input[placeholder*='Search']"),
    },
];

const EMAIL_FIELD_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "userid-input",
        pattern: Pattern::Css("#userid"),
    },
    Strategy {
        name: "named-userid-input",
        pattern: Pattern::Css("input[name='userid']"),
    },
    Strategy {
        name: "email-type-input",
        pattern: Pattern::Css("input[type='email']"),
    },
];

const PASSWORD_FIELD_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "pass-input",
        pattern: Pattern::Css("#pass"),
    },
    Strategy {
        name: "password-type-input",
        pattern: Pattern::Css("input[type='password']"),
    },
];

const CONTINUE_CONTROL_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "signin-continue-button",
        pattern: Pattern::Css("#signin-continue-btn"),
    },
    Strategy {
        name: "labelled-continue-button",
        pattern: Pattern::ControlByText {
            scope: "button",
            needles: &["continue"],
        },
    },
];

const SIGN_IN_CONTROL_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "signin-submit-button",
        pattern: Pattern::Css("#sgnBt"),
    },
    Strategy {
        name: "labelled-signin-button",
        pattern: Pattern::ControlByText {
            scope: "button",
            needles: &["sign in"],
        },
    },
    Strategy {
        name: "submit-type-button",
        pattern: Pattern::Css("button[type='submit']"),
    },
];

const ACCOUNT_INDICATOR_STRATEGIES: &[Strategy] = &[Strategy {
    name: "account-ui",
    pattern: Pattern::Css("button[aria-label*='Account'], a[title*='My eBay'], #gh-ug"),
}];

pub fn strategies_for(goal: Goal) -> &'static [Strategy] {
    match goal {
        Goal::ProductLink => PRODUCT_LINK_STRATEGIES,
        Goal::AddToCartControl => ADD_TO_CART_STRATEGIES,
        Goal::RemoveControl => REMOVE_CONTROL_STRATEGIES,
        Goal::SeeInCartControl => SEE_IN_CART_STRATEGIES,
        Goal::SearchBox => SEARCH_BOX_STRATEGIES,
        Goal::EmailField => EMAIL_FIELD_STRATEGIES,
        Goal::PasswordField => PASSWORD_FIELD_STRATEGIES,
        Goal::ContinueControl => CONTINUE_CONTROL_STRATEGIES,
        Goal::SignInControl => SIGN_IN_CONTROL_STRATEGIES,
        Goal::AccountIndicator => ACCOUNT_INDICATOR_STRATEGIES,
    }
}

// ---------------------------------------------------------------------------
// Post-condition probe scripts
// ---------------------------------------------------------------------------

/// JS expression: true once a "See in cart" confirmation label is present.
pub fn see_in_cart_probe_script() -> String {
    format!(
        r#"
        (function() {{
            const spans = document.querySelectorAll('span');
            for (const s of spans) {{
                if ((s.textContent || '').toLowerCase().includes('{}')) {{
                    return true;
                }}
            }}
            return false;
        }})()
    "#,
        SEE_IN_CART_PHRASE
    )
}

/// JS expression: count of visible remove/delete controls in the cart.
pub fn remove_control_count_script() -> String {
    r#"
        (function() {
            const nodes = document.querySelectorAll('button, a');
            let count = 0;
            for (const n of nodes) {
                const text = ((n.textContent || '') + ' ' + (n.getAttribute('aria-label') || '')).toLowerCase();
                if (!text.includes('remove') && !text.includes('delete')) continue;
                const rect = n.getBoundingClientRect();
                if (rect.width > 0 && rect.height > 0) count++;
            }
            return count;
        })()
    "#
    .to_string()
}
