//! Content-Transfer-Encoding names and the QuotedPrintable codec.
//!
//! Part bodies are decoded by `mail-parser` while the container is parsed;
//! this module names the encoding each part declared (for summaries and
//! logs) and exposes the QuotedPrintable codec Confluence writes its HTML
//! part with.

use quoted_printable::ParseMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A part's `Content-Transfer-Encoding`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferEncoding {
    QuotedPrintable,
    Base64,
    #[serde(rename = "7bit")]
    SevenBit,
    #[serde(rename = "8bit")]
    EightBit,
    /// Also the default when the header is absent.
    #[default]
    Binary,
    /// Unrecognised encoding; the body is used as-is.
    Other(String),
}

impl TransferEncoding {
    /// Parse a header value (case-insensitive, surrounding whitespace ignored).
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            "base64" => TransferEncoding::Base64,
            "7bit" => TransferEncoding::SevenBit,
            "8bit" => TransferEncoding::EightBit,
            "binary" | "" => TransferEncoding::Binary,
            other => TransferEncoding::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferEncoding::QuotedPrintable => f.write_str("quoted-printable"),
            TransferEncoding::Base64 => f.write_str("base64"),
            TransferEncoding::SevenBit => f.write_str("7bit"),
            TransferEncoding::EightBit => f.write_str("8bit"),
            TransferEncoding::Binary => f.write_str("binary"),
            TransferEncoding::Other(s) => f.write_str(s),
        }
    }
}

// ── QuotedPrintable ──────────────────────────────────────────────────────

/// Encode bytes as QuotedPrintable (76-column lines, CRLF soft breaks).
pub fn encode_quoted_printable(input: &[u8]) -> String {
    quoted_printable::encode_to_str(input)
}

/// Decode a QuotedPrintable body. Malformed escapes pass through literally.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    quoted_printable::decode(input, ParseMode::Robust).unwrap_or_else(|_| input.to_vec())
}
