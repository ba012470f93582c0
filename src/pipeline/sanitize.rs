//! Markup sanitation: strip the Office scaffolding Word-style exports carry.
//!
//! The exported HTML is written for Word first and browsers second. It is
//! full of conditional comments, `<xml>` data islands, `o:p`/`v:shape`
//! elements, `xmlns:*` declarations and `mso-*` style properties. Chrome
//! ignores most of it, but some of it (empty paragraph placeholders, VML
//! fallbacks, hidden `mso-hide:all` blocks) leaks visible artefacts into the
//! printed page.
//!
//! ## Rule Order
//!
//! Comment-level rules run first on the raw text so the HTML rewriter never
//! sees half of a conditional block. Element and attribute rules run in a
//! single rewriter pass. Empty `<div>` removal runs last because the
//! previous passes are what empty them.
//!
//! Every rule only removes. A removal can still splice two fragments into a
//! new conditional block, so the whole rule chain is repeated until the text
//! stops changing, which makes `sanitize(sanitize(x)) == sanitize(x)`.

use lol_html::{element, rewrite_str, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Clean Office markup out of `html`.
///
/// Rules (applied in order):
/// 1. Remove downlevel-revealed conditional markers (`<!--[if !mso]><!-->`)
/// 2. Remove downlevel-hidden conditional blocks (`<!--[if gte mso 9]>…<![endif]-->`)
/// 3. Remove bare downlevel markers (`<![if …]>`, `<![endif]>`), keeping content
/// 4. Remove `<xml>` and `o:p`/`w:*`/`v:*`/`m:*` data islands with their
///    content, unwrap every other namespaced element (smart tags) and drop
///    self-closing namespaced tags
/// 5. Remove `xmlns:*` declarations and `mso-*` style declarations
/// 6. Remove content-less `<div>` elements until none remain
///
/// The chain is repeated until a pass leaves the text unchanged.
pub fn sanitize(html: &str) -> String {
    let mut current = sanitize_pass(html);
    let mut passes = 1;
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            break;
        }
        current = next;
        passes += 1;
    }
    if passes > 1 {
        debug!("Sanitizer reached a fixpoint after {} passes", passes);
    }
    current
}

fn sanitize_pass(html: &str) -> String {
    let s = strip_revealed_markers(html);
    let s = strip_conditional_blocks(&s);
    let s = strip_downlevel_markers(&s);
    let s = strip_self_closing_office_tags(&s);
    let s = strip_office_markup(&s);
    strip_empty_divs(&s)
}

// ── Rule 1: Revealed conditional markers ─────────────────────────────────

static RE_REVEALED_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!--\[if[^\]]*\]><!-->").unwrap());
static RE_REVEALED_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!--<!\[endif\]-->").unwrap());

fn strip_revealed_markers(input: &str) -> String {
    let s = RE_REVEALED_OPEN.replace_all(input, "");
    RE_REVEALED_CLOSE.replace_all(&s, "").into_owned()
}

// ── Rule 2: Hidden conditional blocks ────────────────────────────────────

static RE_CONDITIONAL_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<!--\[if[^\]]*\]>.*?<!\[endif\]-->").unwrap());

fn strip_conditional_blocks(input: &str) -> String {
    RE_CONDITIONAL_BLOCK.replace_all(input, "").into_owned()
}

// ── Rule 3: Downlevel markers ────────────────────────────────────────────

static RE_DOWNLEVEL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!\[(?:if[^\]]*|endif)\]>").unwrap());

fn strip_downlevel_markers(input: &str) -> String {
    RE_DOWNLEVEL_MARKER.replace_all(input, "").into_owned()
}

// ── Rules 4 + 5: Office elements and attributes ──────────────────────────

// `<o:p/>` has no end tag, so the rewriter would treat everything up to the
// parent's close as its content.
static RE_SELF_CLOSING_OFFICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:xml|[a-z][a-z0-9]*:[a-z][\w.-]*)\b[^<>]*/>").unwrap());

fn strip_self_closing_office_tags(input: &str) -> String {
    RE_SELF_CLOSING_OFFICE.replace_all(input, "").into_owned()
}

fn strip_office_markup(input: &str) -> String {
    let result = rewrite_str(
        input,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                let tag = el.tag_name();
                match office_element(&tag) {
                    Some(OfficeElement::DataIsland) => {
                        el.remove();
                        return Ok(());
                    }
                    Some(OfficeElement::Wrapper) => el.remove_and_keep_content(),
                    None => {}
                }

                let doomed: Vec<String> = el
                    .attributes()
                    .iter()
                    .map(|a| a.name())
                    .filter(|name| is_namespace_declaration(name))
                    .collect();
                for name in doomed {
                    el.remove_attribute(&name);
                }

                if let Some(style) = el.get_attribute("style") {
                    match strip_mso_declarations(&style) {
                        Some(cleaned) if cleaned.is_empty() => el.remove_attribute("style"),
                        Some(cleaned) => el.set_attribute("style", &cleaned)?,
                        None => {}
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    match result {
        Ok(html) => html,
        Err(e) => {
            warn!("HTML rewriter rejected the document, Office elements kept: {}", e);
            input.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfficeElement {
    /// Word-only payload (document properties, VML, OMML, paragraph marks).
    DataIsland,
    /// Smart tags and other wrappers around visible text.
    Wrapper,
}

fn office_element(tag: &str) -> Option<OfficeElement> {
    if tag.eq_ignore_ascii_case("xml") || tag.eq_ignore_ascii_case("o:p") {
        return Some(OfficeElement::DataIsland);
    }
    let (prefix, _) = tag.split_once(':')?;
    if ["w", "v", "m"].iter().any(|p| prefix.eq_ignore_ascii_case(p)) {
        Some(OfficeElement::DataIsland)
    } else {
        Some(OfficeElement::Wrapper)
    }
}

fn is_namespace_declaration(attr: &str) -> bool {
    attr.len() > "xmlns:".len()
        && attr
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("xmlns:"))
}

/// Drop `mso-*` declarations from a style attribute.
///
/// Returns `None` when nothing changed, so untouched attributes keep their
/// original formatting.
fn strip_mso_declarations(style: &str) -> Option<String> {
    let mut changed = false;
    let kept: Vec<&str> = style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| {
            let property = decl.split(':').next().unwrap_or("").trim();
            let is_mso = property
                .get(..4)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("mso-"));
            changed |= is_mso;
            !is_mso
        })
        .collect();
    changed.then(|| kept.join(";"))
}

// ── Rule 6: Empty divs ───────────────────────────────────────────────────

static RE_EMPTY_DIV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<div\b[^>]*></div\s*>").unwrap());

fn strip_empty_divs(input: &str) -> String {
    let mut current = input.to_string();
    let mut passes = 0;
    loop {
        let next = RE_EMPTY_DIV.replace_all(&current, "");
        if next == current {
            break;
        }
        current = next.into_owned();
        passes += 1;
    }
    if passes > 1 {
        debug!("Empty div removal reached a fixpoint after {} passes", passes);
    }
    current
}
