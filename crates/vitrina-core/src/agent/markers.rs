//! Control-marker extraction from model output.
//!
//! Tools and the model embed internal directives in their text:
//! `[SESSION_DATA]{json}[/SESSION_DATA]` carries session state updates,
//! `[STORE_PERSONAL]{json}[/STORE_PERSONAL]` and
//! `[STORE_PREFERENCE]{json}[/STORE_PREFERENCE]` carry memory directives.
//! All of these are extracted and stripped before the reply is parsed
//! into content blocks; the user must never see them. Malformed JSON
//! payloads are skipped with a warning, never fatal.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static SESSION_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[SESSION_DATA\](.*?)\[/SESSION_DATA\]").unwrap());
static SESSION_DATA_ORPHAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[SESSION_DATA\].*$").unwrap());
static STORE_PERSONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[STORE_PERSONAL\](.*?)\[/STORE_PERSONAL\]").unwrap());
static STORE_PERSONAL_ORPHAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[STORE_PERSONAL\].*$").unwrap());
static STORE_PREFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[STORE_PREFERENCE\](.*?)\[/STORE_PREFERENCE\]").unwrap());
static STORE_PREFERENCE_ORPHAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[STORE_PREFERENCE\].*$").unwrap());
static BARE_TAG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[/?(?:SESSION_DATA|STORE_PERSONAL|STORE_PREFERENCE)\]$").unwrap()
});

/// Directives extracted from one raw model response.
#[derive(Debug, Default)]
pub struct Directives {
    /// Merged session state update (top-level keys from all SESSION_DATA payloads).
    pub session_update: Map<String, Value>,
    /// Merged personal-detail directives from STORE_PERSONAL.
    pub personal: Map<String, Value>,
    /// Merged preference directives from STORE_PREFERENCE.
    pub preference: Map<String, Value>,
}

/// Extract all control directives from `raw` and return them together
/// with the text stripped of every marker (matched and orphaned).
pub fn extract_directives(raw: &str) -> (Directives, String) {
    let mut directives = Directives::default();

    collect_payloads(&SESSION_DATA, raw, &mut directives.session_update);
    collect_payloads(&STORE_PERSONAL, raw, &mut directives.personal);
    collect_payloads(&STORE_PREFERENCE, raw, &mut directives.preference);

    (directives, sanitize(raw))
}

fn collect_payloads(pattern: &Regex, raw: &str, into: &mut Map<String, Value>) {
    for capture in pattern.captures_iter(raw) {
        let payload = capture[1].trim();
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => {
                into.extend(map);
            }
            Ok(_) => {
                warn!("Ignoring non-object directive payload");
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable directive payload");
            }
        }
    }
}

/// Remove every internal marker from `text`: matched pairs, orphaned
/// opening tags (stripped to end of text), and lines that consist of a
/// bare opening or closing tag.
pub fn sanitize(text: &str) -> String {
    let mut out = text.to_string();

    for pattern in [&*SESSION_DATA, &*STORE_PERSONAL, &*STORE_PREFERENCE] {
        while pattern.is_match(&out) {
            out = pattern.replace_all(&out, "").into_owned();
        }
    }
    for pattern in [
        &*SESSION_DATA_ORPHAN,
        &*STORE_PERSONAL_ORPHAN,
        &*STORE_PREFERENCE_ORPHAN,
    ] {
        out = pattern.replace(&out, "").into_owned();
    }

    out.lines()
        .filter(|line| !BARE_TAG_LINE.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
