//! Snapshot helpers shared by the classifier and the resolver.
//!
//! Both components work on a parsed HTML snapshot of the live page rather
//! than on live element handles, so their logic stays pure and testable
//! against fixture documents.

use scraper::{ElementRef, Html, Selector};

pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// Whitespace-normalized visible text of an element and its descendants.
pub fn text_of(el: &ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Alt text of the first descendant image, if any.
pub fn image_alt_of(el: &ElementRef) -> Option<String> {
    let img = Selector::parse("img").ok()?;
    el.select(&img)
        .find_map(|i| i.value().attr("alt"))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
}

/// Attribute-level hidden check. A live visibility query would need layout
/// information; attribute cues are the best a snapshot can do and they cover
/// the hidden inputs and display:none overlays this suite cares about.
pub fn is_hidden(el: &ElementRef) -> bool {
    let attrs: Vec<(&str, &str)> = el.value().attrs().collect();

    for (name, value) in &attrs {
        match *name {
            "hidden" => return true,
            "type" if *value == "hidden" => return true,
            "style" => {
                let style = value.to_lowercase();
                if style.contains("display:none")
                    || style.contains("display: none")
                    || style.contains("visibility:hidden")
                    || style.contains("visibility: hidden")
                {
                    return true;
                }
            }
            "class" => {
                let class = value.to_lowercase();
                if class.split_whitespace().any(|c| c == "hidden" || c == "invisible" || c == "d-none") {
                    return true;
                }
            }
            "aria-hidden" if *value == "true" => return true,
            _ => {}
        }
    }

    false
}

pub fn is_disabled(el: &ElementRef) -> bool {
    el.value().attr("disabled").is_some()
        || el.value().attr("aria-disabled") == Some("true")
}

/// Label of the currently chosen option of a `<select>`: the option carrying
/// the `selected` attribute, or the first option when none is marked.
pub fn selected_option_text(select_el: &ElementRef) -> Option<String> {
    let option_sel = Selector::parse("option").ok()?;
    let options: Vec<ElementRef> = select_el.select(&option_sel).collect();
    let chosen = options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.first())?;
    Some(text_of(chosen))
}

/// Nearest ancestor with the given tag name, wrapped as an element.
pub fn ancestor_with_tag<'a>(el: &ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    let mut node = el.parent();
    while let Some(n) = node {
        if let Some(parent_el) = ElementRef::wrap(n) {
            if parent_el.value().name() == tag {
                return Some(parent_el);
            }
        }
        node = n.parent();
    }
    None
}

/// Generate a CSS selector that re-locates this element on the live page.
///
/// Priority mirrors how the site markup identifies things: id, then anchor
/// href, then name, then test id, then classes, then aria-label. The bare
/// tag name is a last resort.
pub fn selector_for(el: &ElementRef) -> String {
    let tag = el.value().name();
    let value = el.value();

    if let Some(id) = value.attr("id") {
        if !id.is_empty() {
            return format!("{}#{}", tag, css_escape(id));
        }
    }
    if tag == "a" {
        if let Some(href) = value.attr("href") {
            if !href.is_empty() {
                return format!("a[href='{}']", attr_escape(href));
            }
        }
    }
    if let Some(name) = value.attr("name") {
        if !name.is_empty() {
            return format!("{}[name='{}']", tag, attr_escape(name));
        }
    }
    if let Some(test_id) = value.attr("data-testid") {
        return format!("{}[data-testid='{}']", tag, attr_escape(test_id));
    }
    if let Some(class) = value.attr("class") {
        let classes: Vec<String> = class.split_whitespace().map(css_escape).collect();
        if !classes.is_empty() {
            return format!("{}.{}", tag, classes.join("."));
        }
    }
    if let Some(aria_label) = value.attr("aria-label") {
        return format!("{}[aria-label='{}']", tag, attr_escape(aria_label));
    }

    tag.to_string()
}

pub fn css_escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' | '.' | '#' | ':' | '[' | ']' | '(' | ')' | '\'' | '"' | '/' => {
                format!("\\{}", c)
            }
            _ => c.to_string(),
        })
        .collect()
}

fn attr_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}
