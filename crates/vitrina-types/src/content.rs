//! Structured content blocks returned to the storefront front end.
//!
//! Assistant replies are a sequence of typed blocks: narrative markdown
//! text interleaved with pre-rendered HTML components (NFT grids, detail
//! cards). The front end renders text blocks through its markdown
//! pipeline and injects component HTML verbatim.

use serde::{Deserialize, Serialize};

/// One block of an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Narrative markdown text.
    Text { markdown: String },
    /// A pre-rendered HTML component. `template` names the component
    /// display kind of the component (e.g., "grid", "table", "details").
    HtmlComponent { html: String, template: String },
}

impl ContentBlock {
    /// A text block, trimming nothing; callers decide what to keep.
    pub fn text(markdown: impl Into<String>) -> Self {
        ContentBlock::Text {
            markdown: markdown.into(),
        }
    }

    /// An HTML component block.
    pub fn html_component(html: impl Into<String>, template: impl Into<String>) -> Self {
        ContentBlock::HtmlComponent {
            html: html.into(),
            template: template.into(),
        }
    }

    /// True for text blocks.
    pub fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Text { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_block_serde_tag() {
        let block = ContentBlock::text("Here are some NFTs:");
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"type\":\"text\""));
        assert!(json.contains("\"markdown\""));
    }

    #[test]
    fn test_html_component_serde_tag() {
        let block = ContentBlock::html_component("<div>grid</div>", "grid");
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"type\":\"html_component\""));
        let parsed: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, block);
    }
}
