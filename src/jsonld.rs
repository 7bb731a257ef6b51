//! JSON-LD extraction from episode pages.
//!
//! The WDR pages embed one `application/ld+json` block per episode. Its JSON
//! is hand-assembled upstream and regularly contains raw newlines or
//! unescaped quotes inside description strings, so parsing is tolerant.

use anyhow::Result;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::DownloadError;
use crate::http::Fetcher;

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Downloads `url` and returns its JSON-LD object without the `publisher`
/// block.
pub fn fetch_metadata(fetcher: &dyn Fetcher, url: &str) -> Result<Value> {
    let html = fetcher.get_text(url)?;
    let raw = extract_json_ld(&html)
        .ok_or_else(|| DownloadError::metadata(url, "no JSON-LD metadata found"))?;
    let mut metadata =
        parse_lenient(&raw).map_err(|err| DownloadError::metadata(url, err))?;
    if let Some(object) = metadata.as_object_mut() {
        object.remove("publisher");
    }
    Ok(metadata)
}

/// First JSON-LD block that holds an object.
pub fn extract_json_ld(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&LD_JSON)
        .map(|script| script.text().collect::<String>())
        .map(|text| text.trim().to_string())
        .find(|text| text.starts_with('{'))
}

/// Parses strictly first, then with control characters escaped, then with
/// stray quotes escaped as well.
pub fn parse_lenient(raw: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            debug!(error = %strict_err, "strict JSON-LD parse failed, retrying leniently");
            serde_json::from_str(&escape_control_chars(raw)).or_else(|_| {
                serde_json::from_str(&escape_control_chars(&fix_malformed_json(raw)))
            })
        }
    }
}

/// Escapes raw control characters that appear inside string literals.
fn escape_control_chars(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut chars = json.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if in_string => {
                out.push(ch);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => {
                in_string = !in_string;
                out.push(ch);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            c if in_string && c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Escapes quotes inside string values, e.g.
/// `"description": "He said "hello" to her"`. A quote closes a string only
/// when the next non-blank character is one of `, } ] :` or the input ends.
pub fn fix_malformed_json(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len() + 16);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\\' && i + 1 < chars.len() {
            out.push(ch);
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }

        if ch == '"' {
            if !in_string {
                in_string = true;
                out.push(ch);
            } else {
                let next = chars[i + 1..].iter().copied().find(|c| !c.is_whitespace());
                match next {
                    None | Some(',' | '}' | ']' | ':') => {
                        in_string = false;
                        out.push(ch);
                    }
                    Some(_) => out.push_str("\\\""),
                }
            }
        } else {
            out.push(ch);
        }
        i += 1;
    }

    out
}
