//! MHTML container decoding: raw bytes → ordered list of typed MIME parts.
//!
//! Confluence's "Export to Word" produces a `multipart/related` message:
//!
//! ```text
//! Date: Mon, 3 Jun 2024 09:12:44 +0000 (UTC)
//! Message-ID: <1504339290.45.1717405964802@confluence>
//! Subject: Exported From Confluence
//! MIME-Version: 1.0
//! Content-Type: multipart/related;
//!     boundary="----=_Part_44_1297151016.1717405964802"
//!
//! ------=_Part_44_1297151016.1717405964802
//! Content-Type: text/html; charset=UTF-8
//! Content-Transfer-Encoding: quoted-printable
//! Content-Location: file:///C:/exported.html
//!
//! <html xmlns:o=3D"urn:schemas-microsoft-com:office:office" …
//! ------=_Part_44_1297151016.1717405964802
//! Content-Type: image/png
//! Content-Transfer-Encoding: base64
//! Content-Location: file:///C:/8d9f2c1a/diagram.png
//!
//! iVBORw0KGgoAAAANSUhEUgAA…
//! ------=_Part_44_1297151016.1717405964802--
//! ```
//!
//! The container itself is parsed by `mail-parser` (header unfolding,
//! RFC 2047 words, nested multiparts, QuotedPrintable/base64 and charsets).
//! This module maps its part tree onto typed [`MimePart`]s, in document
//! order with nested multiparts flattened depth-first, and picks the root.

use crate::error::DecodeError;
use crate::pipeline::transfer::TransferEncoding;
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

// ── Parts ────────────────────────────────────────────────────────────────

/// The decoded payload of a part, discriminated by content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// `text/html`, decoded to UTF-8.
    Html(String),
    /// `text/css`, decoded to UTF-8.
    Stylesheet(String),
    /// `image/*` bytes.
    Image(Vec<u8>),
    /// Anything else (`application/octet-stream`, `text/xml`, …).
    Other(Vec<u8>),
}

impl PartBody {
    pub fn kind(&self) -> &'static str {
        match self {
            PartBody::Html(_) => "html",
            PartBody::Stylesheet(_) => "stylesheet",
            PartBody::Image(_) => "image",
            PartBody::Other(_) => "other",
        }
    }
}

/// One leaf part of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lower-cased `type/subtype`.
    pub content_type: String,
    pub transfer_encoding: TransferEncoding,
    /// `Content-Location`, verbatim.
    pub content_location: Option<String>,
    /// `Content-ID` without the surrounding angle brackets.
    pub content_id: Option<String>,
    pub body: PartBody,
}

impl MimePart {
    /// Payload bytes (UTF-8 for text bodies).
    pub fn payload(&self) -> &[u8] {
        match &self.body {
            PartBody::Html(s) | PartBody::Stylesheet(s) => s.as_bytes(),
            PartBody::Image(b) | PartBody::Other(b) => b,
        }
    }

    /// Decoded payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_html(&self) -> bool {
        matches!(self.body, PartBody::Html(_))
    }
}

/// A decoded MHTML container.
#[derive(Debug, Clone)]
pub struct MhtmlDocument {
    /// Top-level `Subject` header, if any.
    pub subject: Option<String>,
    /// Every leaf part in document order, root included.
    pub parts: Vec<MimePart>,
    root: usize,
}

impl MhtmlDocument {
    /// Index of the root HTML part within [`Self::parts`].
    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn root(&self) -> &MimePart {
        &self.parts[self.root]
    }

    /// The root document's HTML.
    pub fn root_html(&self) -> &str {
        match &self.root().body {
            PartBody::Html(html) => html,
            // decode() only ever selects an Html part as root
            _ => "",
        }
    }

    /// All parts except the root, with their indices.
    pub fn resources(&self) -> impl Iterator<Item = (usize, &MimePart)> {
        self.parts
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.root)
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────

/// Decode an MHTML container.
///
/// # Errors
/// - [`DecodeError::MissingContentType`]: no top-level `Content-Type`
/// - [`DecodeError::MissingBoundary`] / [`DecodeError::BoundaryNotFound`]:
///   malformed multipart structure
/// - [`DecodeError::MissingRootPart`]: no HTML part to render
/// - [`DecodeError::InvalidBase64`]: the only HTML part(s) are undecodable
pub fn decode(input: &[u8]) -> Result<MhtmlDocument, DecodeError> {
    let message = MessageParser::default()
        .parse(input)
        .ok_or(DecodeError::MissingContentType)?;
    let top_type = message
        .content_type()
        .ok_or(DecodeError::MissingContentType)?;

    if top_type.ctype().eq_ignore_ascii_case("multipart") {
        let Some(boundary) = top_type.attribute("boundary").filter(|b| !b.is_empty()) else {
            return Err(DecodeError::MissingBoundary {
                content_type: mime_type(message.root_part()),
            });
        };
        let has_children = matches!(
            &message.root_part().body,
            PartType::Multipart(children) if !children.is_empty()
        );
        if !has_children {
            return Err(DecodeError::BoundaryNotFound {
                boundary: boundary.to_string(),
            });
        }
    }

    let mut parts = Vec::new();
    let mut dropped_html_error = None;
    for part in &message.parts {
        if matches!(part.body, PartType::Multipart(_)) {
            continue;
        }
        match leaf(part) {
            Ok(leaf) => parts.push(leaf),
            Err(dropped) => {
                warn!(
                    "Dropping {} part {}: invalid base64",
                    dropped.content_type,
                    dropped.content_location.as_deref().unwrap_or("<no location>")
                );
                if dropped.content_type == "text/html" {
                    dropped_html_error.get_or_insert_with(|| {
                        format!(
                            "undecodable base64 body in {}",
                            dropped.content_location.as_deref().unwrap_or("the HTML part")
                        )
                    });
                }
            }
        }
    }

    let start = top_type
        .attribute("start")
        .map(|s| strip_angle_brackets(s).to_string());
    let Some(root) = select_root(&parts, start.as_deref()) else {
        return Err(match dropped_html_error {
            Some(detail) => DecodeError::InvalidBase64 { detail },
            None => DecodeError::MissingRootPart,
        });
    };

    debug!(
        "Decoded MHTML: {} parts, root #{} ({})",
        parts.len(),
        root,
        parts[root]
            .content_location
            .as_deref()
            .unwrap_or("<no location>")
    );

    Ok(MhtmlDocument {
        subject: message.subject().map(str::to_string),
        parts,
        root,
    })
}

/// Lower-cased `type/subtype`; `text/plain` when the header is absent.
fn mime_type(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

/// Map one leaf of the parsed tree. A base64 body that did not decode is
/// returned as `Err` with the part's body left empty.
fn leaf(part: &MessagePart<'_>) -> Result<MimePart, MimePart> {
    let content_type = mime_type(part);
    let transfer_encoding = part
        .content_transfer_encoding()
        .map(TransferEncoding::from_header)
        .unwrap_or_default();
    if let TransferEncoding::Other(ref name) = transfer_encoding {
        warn!("Unknown transfer encoding '{}'; using the body as-is", name);
    }

    let mut mapped = MimePart {
        content_location: part.content_location().map(|l| l.trim().to_string()),
        content_id: part
            .content_id()
            .map(|id| strip_angle_brackets(id).to_string()),
        body: PartBody::Other(Vec::new()),
        transfer_encoding,
        content_type,
    };
    if part.is_encoding_problem && mapped.transfer_encoding == TransferEncoding::Base64 {
        return Err(mapped);
    }

    mapped.body = match mapped.content_type.as_str() {
        "text/html" => PartBody::Html(text_of(part)),
        "text/css" => PartBody::Stylesheet(text_of(part)),
        m if m.starts_with("image/") => PartBody::Image(part.contents().to_vec()),
        _ => PartBody::Other(part.contents().to_vec()),
    };
    Ok(mapped)
}

/// Charset-decoded text of a part. Parts the parser kept as binary (an
/// `attachment` disposition) are read as UTF-8.
fn text_of(part: &MessagePart<'_>) -> String {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => text.to_string(),
        _ => String::from_utf8_lossy(part.contents()).into_owned(),
    }
}

fn strip_angle_brackets(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(id)
}

/// Root selection: the part named by the multipart `start` parameter if it
/// is HTML, otherwise the first HTML part.
fn select_root(parts: &[MimePart], start: Option<&str>) -> Option<usize> {
    if let Some(start) = start {
        let by_start = parts
            .iter()
            .position(|p| p.is_html() && p.content_id.as_deref() == Some(start));
        if by_start.is_some() {
            return by_start;
        }
        warn!("start parameter '{}' names no HTML part; using the first one", start);
    }
    parts.iter().position(MimePart::is_html)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "Date: Mon, 3 Jun 2024 09:12:44 +0000 (UTC)\r\n\
Subject: Exported From Confluence\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related;\r\n\
\tboundary=\"----=_Part_44_1297151016\"\r\n\
\r\n\
------=_Part_44_1297151016\r\n\
Content-Type: text/html; charset=UTF-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
Content-Location: file:///C:/exported.html\r\n\
\r\n\
<html><body><p class=3D\"x\">Gr=C3=BC=C3=9Fe</p><img src=3D\"8d9f/diagr=\r\n\
am.png\"></body></html>\r\n\
------=_Part_44_1297151016\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Location: file:///C:/8d9f/diagram.png\r\n\
\r\n\
iVBORw0KGgo=\r\n\
------=_Part_44_1297151016\r\n\
Content-Type: text/css\r\n\
Content-Transfer-Encoding: 7bit\r\n\
Content-ID: <style1@confluence>\r\n\
\r\n\
p { color: red; }\r\n\
------=_Part_44_1297151016--\r\n";

    #[test]
    fn decodes_confluence_export() {
        let doc = decode(EXPORT.as_bytes()).unwrap();
        assert_eq!(doc.subject.as_deref(), Some("Exported From Confluence"));
        assert_eq!(doc.parts.len(), 3);
        assert_eq!(doc.root_index(), 0);
        assert_eq!(
            doc.root_html(),
            "<html><body><p class=\"x\">Grüße</p><img src=\"8d9f/diagram.png\"></body></html>"
        );

        let image = &doc.parts[1];
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.body, PartBody::Image(b"\x89PNG\r\n\x1a\n".to_vec()));
        assert_eq!(
            image.content_location.as_deref(),
            Some("file:///C:/8d9f/diagram.png")
        );

        let css = &doc.parts[2];
        assert_eq!(css.content_id.as_deref(), Some("style1@confluence"));
        assert_eq!(css.body, PartBody::Stylesheet("p { color: red; }".into()));
        assert_eq!(doc.resources().count(), 2);
    }

    #[test]
    fn single_part_html_is_its_own_root() {
        let input = b"MIME-Version: 1.0\nContent-Type: text/html\n\n<html><body>Hello</body></html>\n";
        let doc = decode(input).unwrap();
        assert_eq!(doc.parts.len(), 1);
        assert_eq!(doc.root_html().trim_end(), "<html><body>Hello</body></html>");
    }

    #[test]
    fn missing_content_type_is_not_mime() {
        let err = decode(b"<html><body>plain file</body></html>").unwrap_err();
        assert_eq!(err, DecodeError::MissingContentType);
    }

    #[test]
    fn multipart_without_boundary_parameter() {
        let err = decode(b"Content-Type: multipart/related\n\n--x\n\n--x--\n").unwrap_err();
        assert!(matches!(err, DecodeError::MissingBoundary { .. }));
    }

    #[test]
    fn boundary_never_found() {
        let input = b"Content-Type: multipart/related; boundary=abc\n\nno delimiters here\n";
        assert_eq!(
            decode(input).unwrap_err(),
            DecodeError::BoundaryNotFound {
                boundary: "abc".into()
            }
        );
    }

    #[test]
    fn container_without_html_has_no_root() {
        let input = b"Content-Type: multipart/related; boundary=b\n\n--b\nContent-Type: image/png\n\nxx\n--b--\n";
        assert_eq!(decode(input).unwrap_err(), DecodeError::MissingRootPart);
    }

    #[test]
    fn corrupt_base64_root_reports_invalid_base64() {
        let input = b"Content-Type: multipart/related; boundary=b\n\n--b\nContent-Type: text/html\nContent-Transfer-Encoding: base64\n\n$$$$\n--b--\n";
        assert!(matches!(
            decode(input).unwrap_err(),
            DecodeError::InvalidBase64 { .. }
        ));
    }

    #[test]
    fn corrupt_base64_resource_is_dropped() {
        let input = b"Content-Type: multipart/related; boundary=b\n\n--b\nContent-Type: text/html\n\n<p>ok</p>\n--b\nContent-Type: image/png\nContent-Transfer-Encoding: base64\n\n$$$$\n--b--\n";
        let doc = decode(input).unwrap();
        assert_eq!(doc.parts.len(), 1);
    }

    #[test]
    fn start_parameter_selects_root() {
        let input = b"Content-Type: multipart/related; boundary=b; start=\"<main>\"\n\n\
--b\nContent-Type: text/html\nContent-ID: <frame>\n\n<p>frame</p>\n\
--b\nContent-Type: text/html\nContent-ID: <main>\n\n<p>main</p>\n--b--\n";
        let doc = decode(input).unwrap();
        assert_eq!(doc.root_index(), 1);
        assert_eq!(doc.root_html(), "<p>main</p>");
    }

    #[test]
    fn nested_multipart_is_flattened() {
        let input = b"Content-Type: multipart/mixed; boundary=outer\n\n\
preamble\n\
--outer\nContent-Type: multipart/related; boundary=inner\n\n\
--inner\nContent-Type: text/html\n\n<p>doc</p>\n\
--inner\nContent-Type: image/gif\nContent-Location: a.gif\n\nGIF89a\n--inner--\n\
--outer\nContent-Type: text/plain\n\nnote\n--outer--\nepilogue\n";
        let doc = decode(input).unwrap();
        let kinds: Vec<_> = doc.parts.iter().map(|p| p.body.kind()).collect();
        assert_eq!(kinds, vec!["html", "image", "other"]);
    }

    #[test]
    fn missing_close_delimiter_is_tolerated() {
        let input = b"Content-Type: multipart/related; boundary=b\n\n--b\nContent-Type: text/html\n\n<p>cut off";
        let doc = decode(input).unwrap();
        assert_eq!(doc.root_html(), "<p>cut off");
    }

    #[test]
    fn legacy_charset_is_transcoded() {
        let input = b"Content-Type: text/html; charset=windows-1252\n\n<p>caf\xe9</p>";
        let doc = decode(input).unwrap();
        assert_eq!(doc.root_html(), "<p>caf\u{e9}</p>");
    }

    #[test]
    fn encoded_subject_is_decoded() {
        let input = b"Subject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?=\nContent-Type: text/html\n\n<p>x</p>";
        let doc = decode(input).unwrap();
        assert_eq!(doc.subject.as_deref(), Some("Grüße"));
    }

    #[test]
    fn quoted_printable_round_trips_through_the_decoder() {
        let original = vec!["<p style=\"margin: 0\">Grüße = 100%</p>"; 8].join("\r\n");
        let encoded = crate::pipeline::transfer::encode_quoted_printable(original.as_bytes());
        let input = format!(
            "Content-Type: multipart/related; boundary=b\r\n\r\n--b\r\n\
Content-Type: text/html; charset=UTF-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\n{encoded}\r\n--b--\r\n"
        );
        let doc = decode(input.as_bytes()).unwrap();
        assert_eq!(doc.root_html(), original);
        assert_eq!(
            crate::pipeline::transfer::encode_quoted_printable(doc.root_html().as_bytes()),
            encoded
        );
    }
}
