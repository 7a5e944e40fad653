//! Parses raw model output into typed content blocks.
//!
//! Component markup is delimited with `::COMPONENT_START::<kind>::` and
//! `::COMPONENT_END::` markers. The parser is a single forward scan
//! that never fails: any malformed or unbalanced marker degrades to
//! literal text so the user always gets a renderable reply. Degradation
//! is logged at warn for observability.

use tracing::warn;

use vitrina_types::content::ContentBlock;

const COMPONENT_START: &str = "::COMPONENT_START::";
const COMPONENT_END: &str = "::COMPONENT_END::";

/// Wrap rendered component HTML in markers for embedding in tool output.
pub fn wrap_component(html: &str, kind: &str) -> String {
    format!("{COMPONENT_START}{kind}::{html}{COMPONENT_END}")
}

/// Parse raw model output into an ordered sequence of content blocks.
///
/// Matched marker pairs become `HtmlComponent` blocks (payload trimmed,
/// kind recorded as the template name). An opening marker with a
/// malformed kind, with no closing marker, or with another opening
/// marker before its close is kept as literal text. Adjacent text is
/// merged and blank segments dropped; input with no markers yields a
/// single text block.
pub fn parse_blocks(raw: &str) -> Vec<ContentBlock> {
    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut text_acc = String::new();
    let mut rest = raw;

    while let Some(start_idx) = rest.find(COMPONENT_START) {
        text_acc.push_str(&rest[..start_idx]);
        let after_start = &rest[start_idx + COMPONENT_START.len()..];

        let Some((kind, payload_and_rest)) = parse_kind(after_start) else {
            warn!("Component marker with malformed kind kept as literal text");
            text_acc.push_str(COMPONENT_START);
            rest = after_start;
            continue;
        };

        let next_start = payload_and_rest.find(COMPONENT_START);
        let end = payload_and_rest.find(COMPONENT_END);

        match (end, next_start) {
            (Some(end_idx), next) if next.is_none_or(|n| end_idx < n) => {
                flush_text(&mut blocks, &mut text_acc);
                let payload = payload_and_rest[..end_idx].trim();
                blocks.push(ContentBlock::html_component(payload, kind));
                rest = &payload_and_rest[end_idx + COMPONENT_END.len()..];
            }
            _ => {
                // Unclosed or nested opening marker: keep it literal and
                // rescan from just past the opening token so an inner
                // marker can still match.
                warn!("Unbalanced component marker kept as literal text");
                text_acc.push_str(COMPONENT_START);
                rest = after_start;
            }
        }
    }

    text_acc.push_str(rest);
    flush_text(&mut blocks, &mut text_acc);

    if blocks.is_empty() && !raw.trim().is_empty() {
        blocks.push(ContentBlock::text(raw.trim()));
    }

    blocks
}

/// Split `input` into a component kind and the remainder after its
/// trailing `::`. Kinds are `[A-Za-z0-9_]+`.
fn parse_kind(input: &str) -> Option<(&str, &str)> {
    let kind_len = input
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(input.len());
    if kind_len == 0 {
        return None;
    }
    let rest = &input[kind_len..];
    rest.strip_prefix("::")
        .map(|after| (&input[..kind_len], after))
}

fn flush_text(blocks: &mut Vec<ContentBlock>, acc: &mut String) {
    let trimmed = acc.trim();
    if !trimmed.is_empty() {
        // Merge with a preceding text block instead of emitting twice.
        if let Some(ContentBlock::Text { markdown }) = blocks.last_mut() {
            markdown.push_str("\n\n");
            markdown.push_str(trimmed);
        } else {
            blocks.push(ContentBlock::text(trimmed));
        }
    }
    acc.clear();
}
