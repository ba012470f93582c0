//! Resource resolution: inline every part the root HTML references.
//!
//! Word-style exports point at their attachments by `Content-Location`
//! (`src="8d9f2c1a/diagram.png"` next to a part located at
//! `file:///C:/8d9f2c1a/diagram.png`) or occasionally by `cid:`. The browser
//! only ever sees a single HTML file, so each matched reference is replaced
//! with a `data:` URI carrying the part's payload.
//!
//! ## Reference sites
//!
//! - `src`, `data-image-src` and `background` on any element, `href` on
//!   `<link>`
//! - `url(...)` inside `style` attributes and `<style>` elements
//! - `url(...)` inside inlined stylesheet parts, before they are encoded
//!
//! Attribute values are read raw, so entities (`&amp;` in a query string)
//! are decoded before matching. Text inside `<style>` is not entity-encoded
//! and is matched as written.
//!
//! Resolution never fails. Unmatched references are left untouched and
//! reported in [`ResolutionReport::unresolved`]; parts the browser cannot
//! display are reported in [`ResolutionReport::unsupported`].

use crate::pipeline::mime::{MhtmlDocument, MimePart, PartBody};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use html_escape::decode_html_entities;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, text, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Attributes that may hold a part reference on any element.
const REFERENCE_ATTRIBUTES: &[&str] = &["src", "data-image-src", "background"];

/// `url(...)` with a double-quoted, single-quoted or bare argument.
static RE_CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^'")\s]+))\s*\)"#).unwrap()
});

/// Image types every Chromium build can display.
const BROWSER_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/pjpeg",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/avif",
    "image/apng",
];

/// What resolution did to the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Distinct parts embedded at least once.
    pub inlined: usize,
    /// References that matched no part, in first-seen order.
    pub unresolved: Vec<String>,
    /// References to parts whose type the browser cannot display.
    pub unsupported: Vec<String>,
}

/// The root HTML with resources inlined.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub html: String,
    pub report: ResolutionReport,
}

/// Inline every resolvable reference of `doc`'s root HTML.
pub fn resolve(doc: &MhtmlDocument) -> ResolvedDocument {
    let index = PartIndex::new(doc);
    let state = RefCell::new(ResolveState::default());
    let style_text = RefCell::new(String::new());

    let rewritten = rewrite_str(
        doc.root_html(),
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("*", |el| {
                    let is_link = el.tag_name().eq_ignore_ascii_case("link");
                    let sites = REFERENCE_ATTRIBUTES
                        .iter()
                        .copied()
                        .chain(is_link.then_some("href"));

                    let mut state = state.borrow_mut();
                    for attr in sites {
                        let Some(raw) = el.get_attribute(attr) else {
                            continue;
                        };
                        if let Some(uri) = state.lookup(&index, &decode_html_entities(&raw)) {
                            el.set_attribute(attr, &uri)?;
                        }
                    }
                    if let Some(style) = el.get_attribute("style") {
                        if let Some(rewritten) = state.rewrite_css(&index, &style, true) {
                            el.set_attribute("style", &rewritten)?;
                        }
                    }
                    Ok(())
                }),
                // Text chunks can split a rule; buffer the whole element.
                text!("style", |chunk| {
                    let mut buffer = style_text.borrow_mut();
                    buffer.push_str(chunk.as_str());
                    if !chunk.last_in_text_node() {
                        chunk.remove();
                        return Ok(());
                    }
                    let css = std::mem::take(&mut *buffer);
                    let rewritten = state.borrow_mut().rewrite_css(&index, &css, false);
                    chunk.replace(rewritten.as_deref().unwrap_or(&css), ContentType::Html);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    );

    let html = match rewritten {
        Ok(html) => html,
        Err(e) => {
            warn!("HTML rewriter rejected the document, resources not inlined: {}", e);
            return ResolvedDocument {
                html: doc.root_html().to_string(),
                report: ResolutionReport::default(),
            };
        }
    };

    let state = state.into_inner();
    let report = ResolutionReport {
        inlined: state.used.len(),
        unresolved: state.unresolved,
        unsupported: state.unsupported,
    };
    debug!(
        "Resolved resources: {} inlined, {} unresolved, {} unsupported",
        report.inlined,
        report.unresolved.len(),
        report.unsupported.len()
    );
    for reference in &report.unresolved {
        warn!("Unresolved reference '{}' left as-is", reference);
    }

    ResolvedDocument { html, report }
}

// ── Matching ─────────────────────────────────────────────────────────────

/// Lookup tables over the non-root parts.
struct PartIndex<'a> {
    parts: &'a [MimePart],
    by_location: HashMap<&'a str, usize>,
    by_cid: HashMap<&'a str, usize>,
    by_basename: HashMap<&'a str, usize>,
}

impl<'a> PartIndex<'a> {
    fn new(doc: &'a MhtmlDocument) -> Self {
        let mut index = PartIndex {
            parts: &doc.parts,
            by_location: HashMap::new(),
            by_cid: HashMap::new(),
            by_basename: HashMap::new(),
        };
        // First part wins on duplicate keys.
        for (i, part) in doc.resources() {
            if let Some(location) = part.content_location.as_deref() {
                index.by_location.entry(location).or_insert(i);
                let name = basename(location);
                if !name.is_empty() {
                    index.by_basename.entry(name).or_insert(i);
                }
            }
            if let Some(cid) = part.content_id.as_deref() {
                index.by_cid.entry(cid).or_insert(i);
            }
        }
        index
    }

    /// Exact location, then `cid:`, then basename.
    fn find(&self, reference: &str) -> Option<usize> {
        if let Some(&i) = self.by_location.get(reference) {
            return Some(i);
        }
        if let Some(cid) = strip_scheme(reference, "cid:") {
            let cid = cid.trim_start_matches('<').trim_end_matches('>');
            return self.by_cid.get(cid).copied();
        }
        let name = basename(reference);
        if name.is_empty() {
            return None;
        }
        self.by_basename.get(name).copied()
    }
}

#[derive(Default)]
struct ResolveState {
    cache: HashMap<usize, Option<String>>,
    used: BTreeSet<usize>,
    /// Stylesheets whose own references are being resolved.
    embedding: HashSet<usize>,
    unresolved: Vec<String>,
    unsupported: Vec<String>,
}

impl ResolveState {
    /// The data URI replacing `reference`, if it should be replaced.
    ///
    /// `reference` must already be entity-decoded.
    fn lookup(&mut self, index: &PartIndex<'_>, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if is_inline(reference) {
            return None;
        }

        // Web references only count when a part claims that exact location.
        let found = if is_web(reference) {
            index.by_location.get(reference).copied()
        } else {
            index.find(reference)
        };
        let Some(i) = found else {
            push_unique(&mut self.unresolved, reference);
            return None;
        };
        if self.embedding.contains(&i) {
            debug!("Stylesheet '{}' refers to itself; left as-is", reference);
            return None;
        }

        let uri = match self.cache.get(&i) {
            Some(uri) => uri.clone(),
            None => {
                let uri = self.embed(index, i);
                self.cache.insert(i, uri.clone());
                uri
            }
        };
        match uri {
            Some(uri) => {
                self.used.insert(i);
                Some(uri)
            }
            None => {
                push_unique(&mut self.unsupported, reference);
                None
            }
        }
    }

    /// Stylesheets get their own `url(...)` references inlined first.
    fn embed(&mut self, index: &PartIndex<'_>, i: usize) -> Option<String> {
        let part = &index.parts[i];
        let PartBody::Stylesheet(css) = &part.body else {
            return data_uri(part);
        };
        self.embedding.insert(i);
        let rewritten = self.rewrite_css(index, css, false);
        self.embedding.remove(&i);
        let css = rewritten.as_deref().unwrap_or(css);
        Some(encode_data_uri("text/css;charset=utf-8", css.as_bytes()))
    }

    /// Inline the `url(...)` references of a CSS text. Returns None when
    /// nothing was replaced. `entities` is set for attribute values, which
    /// are read raw.
    fn rewrite_css(&mut self, index: &PartIndex<'_>, css: &str, entities: bool) -> Option<String> {
        let mut changed = false;
        let rewritten = RE_CSS_URL.replace_all(css, |caps: &Captures<'_>| {
            let raw = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            let decoded = if entities {
                decode_html_entities(raw)
            } else {
                raw.into()
            };
            // `&quot;` quoting only shows up after decoding.
            let reference = decoded.trim().trim_matches(|c| c == '"' || c == '\'');
            match self.lookup(index, reference) {
                Some(uri) => {
                    changed = true;
                    format!("url({uri})")
                }
                None => caps[0].to_string(),
            }
        });
        changed.then(|| rewritten.into_owned())
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// References that never point into the container.
fn is_inline(reference: &str) -> bool {
    if reference.is_empty() || reference.starts_with('#') {
        return true;
    }
    ["data:", "javascript:", "mailto:"]
        .iter()
        .any(|scheme| strip_scheme(reference, scheme).is_some())
}

fn is_web(reference: &str) -> bool {
    strip_scheme(reference, "http://").is_some() || strip_scheme(reference, "https://").is_some()
}

fn strip_scheme<'r>(reference: &'r str, scheme: &str) -> Option<&'r str> {
    let head = reference.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme)
        .then(|| &reference[scheme.len()..])
}

/// Last path segment, without query or fragment.
fn basename(reference: &str) -> &str {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let path = &reference[..end];
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

// ── Embedding ────────────────────────────────────────────────────────────

/// `data:` URI for a part, or None if the browser cannot display it.
fn data_uri(part: &MimePart) -> Option<String> {
    let media_type = match &part.body {
        PartBody::Stylesheet(_) => "text/css;charset=utf-8".to_string(),
        PartBody::Html(_) => "text/html;charset=utf-8".to_string(),
        PartBody::Image(bytes) => {
            if BROWSER_IMAGE_TYPES.contains(&part.content_type.as_str()) {
                part.content_type.clone()
            } else {
                sniff_image_type(bytes)?
            }
        }
        PartBody::Other(bytes) => {
            sniff_image_type(bytes).unwrap_or_else(|| part.content_type.clone())
        }
    };
    Some(encode_data_uri(&media_type, part.payload()))
}

fn encode_data_uri(media_type: &str, payload: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(payload))
}

/// Detect a browser-displayable image type from magic bytes.
fn sniff_image_type(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    let mime = format.to_mime_type();
    BROWSER_IMAGE_TYPES
        .contains(&mime)
        .then(|| mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mime::decode;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn export(html: &str, resources: &[(&str, &str, &str)]) -> MhtmlDocument {
        let mut raw = String::from("Content-Type: multipart/related; boundary=b\n\n--b\nContent-Type: text/html\n\n");
        raw.push_str(html);
        for (content_type, header, body) in resources {
            raw.push_str(&format!(
                "\n--b\nContent-Type: {content_type}\nContent-Transfer-Encoding: base64\n{header}\n\n{body}"
            ));
        }
        raw.push_str("\n--b--\n");
        decode(raw.as_bytes()).unwrap()
    }

    fn png_b64() -> String {
        STANDARD.encode(PNG)
    }

    #[test]
    fn inlines_by_location_and_basename() {
        let doc = export(
            r#"<img src="file:///C:/a/one.png"><img data-image-src="x/two.png" src="x/two.png">"#,
            &[
                ("image/png", "Content-Location: file:///C:/a/one.png", &png_b64()),
                ("image/png", "Content-Location: file:///C:/b/two.png", &png_b64()),
            ],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 2);
        assert!(resolved.report.unresolved.is_empty());
        assert!(!resolved.html.contains("one.png"));
        assert!(!resolved.html.contains("two.png"));
        assert_eq!(resolved.html.matches("data:image/png;base64,").count(), 3);
    }

    #[test]
    fn inlines_cid_references() {
        let doc = export(
            r#"<td background="cid:bg@x"></td>"#,
            &[("image/gif", "Content-ID: <bg@x>", &STANDARD.encode(b"GIF89a"))],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 1);
        assert!(resolved.html.contains(r#"background="data:image/gif;base64,"#));
    }

    #[test]
    fn stylesheet_links_are_inlined() {
        let doc = export(
            r#"<link rel="stylesheet" href="styles/site.css"><a href="site.css">not a link element</a>"#,
            &[("text/css", "Content-Location: file:///C:/styles/site.css", &STANDARD.encode("p{}"))],
        );
        let resolved = resolve(&doc);
        assert!(resolved.html.contains(r#"href="data:text/css;charset=utf-8;base64,cHt9""#));
        assert!(resolved.html.contains(r#"<a href="site.css">"#));
    }

    #[test]
    fn broken_reference_is_left_and_reported() {
        let doc = export(r#"<img src="missing/gone.png"><img src="missing/gone.png">"#, &[]);
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 0);
        assert_eq!(resolved.report.unresolved, vec!["missing/gone.png".to_string()]);
        assert!(resolved.html.contains(r#"src="missing/gone.png""#));
    }

    #[test]
    fn data_and_mailto_references_are_ignored() {
        let doc = export(
            r##"<img src="data:image/png;base64,AA=="><a href="mailto:x@y">m</a><a href="#top">t</a>"##,
            &[],
        );
        let resolved = resolve(&doc);
        assert!(resolved.report.unresolved.is_empty());
    }

    #[test]
    fn web_reference_matches_only_exact_location() {
        let doc = export(
            r#"<img src="https://wiki.example.com/download/logo.png"><img src="https://cdn.example.com/other/logo.png">"#,
            &[("image/png", "Content-Location: https://wiki.example.com/download/logo.png", &png_b64())],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 1);
        assert!(resolved.html.contains(r#"src="https://cdn.example.com/other/logo.png""#));
        assert_eq!(
            resolved.report.unresolved,
            vec!["https://cdn.example.com/other/logo.png".to_string()]
        );
    }

    #[test]
    fn entity_encoded_query_matches_location() {
        let doc = export(
            r#"<img src="https://w.example/dl/a.png?v=1&amp;m=2">"#,
            &[("image/png", "Content-Location: https://w.example/dl/a.png?v=1&m=2", &png_b64())],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 1);
        assert!(resolved.report.unresolved.is_empty());
        assert!(!resolved.html.contains("w.example"), "{}", resolved.html);
    }

    #[test]
    fn css_url_references_are_inlined() {
        let doc = export(
            r#"<style>td{background:url("bg.png")}</style><td style="background-image:url('bg.png')">x</td><p style="background:url(&quot;x/bg.png&quot;)">y</p>"#,
            &[("image/png", "Content-Location: file:///C:/x/bg.png", &png_b64())],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 1);
        assert!(resolved.report.unresolved.is_empty());
        assert!(!resolved.html.contains("bg.png"), "{}", resolved.html);
        assert_eq!(resolved.html.matches("url(data:image/png;base64,").count(), 3);
    }

    #[test]
    fn stylesheet_parts_carry_their_images() {
        let css = "body { background: url(img/tile.png) } h1 { background: url('nowhere.gif') }";
        let doc = export(
            r#"<link rel="stylesheet" href="site.css">"#,
            &[
                ("text/css", "Content-Location: file:///C:/site.css", &STANDARD.encode(css)),
                ("image/png", "Content-Location: file:///C:/img/tile.png", &png_b64()),
            ],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 2);
        assert_eq!(resolved.report.unresolved, vec!["nowhere.gif".to_string()]);

        let encoded = resolved
            .html
            .split("data:text/css;charset=utf-8;base64,")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        let inlined = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(inlined.contains("url(data:image/png;base64,"), "{inlined}");
        assert!(inlined.contains("url('nowhere.gif')"), "{inlined}");
    }

    #[test]
    fn self_importing_stylesheet_terminates() {
        let css = "@import url(loop.css); p { color: red }";
        let doc = export(
            r#"<link rel="stylesheet" href="loop.css">"#,
            &[("text/css", "Content-Location: loop.css", &STANDARD.encode(css))],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 1);
        assert!(resolved.html.contains("data:text/css;charset=utf-8;base64,"));
    }

    #[test]
    fn undisplayable_images_are_reported_not_inlined() {
        let doc = export(
            r#"<img src="image001.wmf">"#,
            &[("image/x-wmf", "Content-Location: file:///C:/image001.wmf", &STANDARD.encode([0xD7u8, 0xCD, 0xC6, 0x9A]))],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 0);
        assert_eq!(resolved.report.unsupported, vec!["image001.wmf".to_string()]);
        assert!(resolved.html.contains(r#"src="image001.wmf""#));
    }

    #[test]
    fn octet_stream_images_are_sniffed() {
        let doc = export(
            r#"<img src="attachment.bin">"#,
            &[("application/octet-stream", "Content-Location: attachment.bin", &png_b64())],
        );
        let resolved = resolve(&doc);
        assert_eq!(resolved.report.inlined, 1);
        assert!(resolved.html.contains("data:image/png;base64,"));
    }

    #[test]
    fn basename_ignores_query_and_backslashes() {
        assert_eq!(basename("a/b/c.png?version=1"), "c.png");
        assert_eq!(basename(r"C:\export\d.gif#frag"), "d.gif");
        assert_eq!(basename("plain.jpg"), "plain.jpg");
        assert_eq!(basename("dir/"), "");
    }
}
