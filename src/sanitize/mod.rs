use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use html2text::from_read;

use crate::gmail::{GmailRecord, MessagePart};

const WRAP_WIDTH: usize = 80;

/// Best-effort body for display: the first MIME part's data, falling back to
/// the top-level body. HTML is rendered to plain text. Anything that does
/// not decode yields an empty body.
pub fn extract_body(record: &GmailRecord) -> String {
    let Some(payload) = record.payload.as_ref() else {
        return String::new();
    };

    let source = payload
        .parts
        .first()
        .filter(|part| part_data(part).is_some())
        .unwrap_or(payload);

    let Some(bytes) = part_data(source).and_then(decode_base64url) else {
        return String::new();
    };

    let is_html = source
        .mime_type
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("text/html"));
    if is_html {
        html_to_text(&bytes)
    } else {
        String::from_utf8_lossy(&bytes).to_string()
    }
}

fn part_data(part: &MessagePart) -> Option<&str> {
    part.body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .filter(|d| !d.is_empty())
}

/// Gmail uses unpadded base64url, but padded and standard-alphabet payloads
/// show up in the wild.
pub fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    let trimmed: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(&trimmed))
        .or_else(|_| STANDARD.decode(&trimmed))
        .ok()
}

fn html_to_text(html: &[u8]) -> String {
    from_read(html, WRAP_WIDTH).unwrap_or_else(|_| String::from_utf8_lossy(html).to_string())
}
