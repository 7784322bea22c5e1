//! Rich-text content model.
//!
//! The serialized formatted-text payload behind a document's `content`
//! field. Block/span structure: paragraphs and headings containing styled
//! spans. The editor mirrors and replaces this value whole — there is no
//! merging of concurrent edits (last write wins at the store).

use serde::{Deserialize, Serialize};

/// Inline character styling for a span of text.
///
/// Fields are always serialized — the payload round-trips through both
/// JSON and bincode, and bincode is not self-describing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

impl SpanStyle {
    /// Plain unstyled text.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn is_plain(&self) -> bool {
        !self.bold && !self.italic && !self.underline
    }
}

/// A run of text with uniform styling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default)]
    pub style: SpanStyle,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: SpanStyle::plain(),
        }
    }

    pub fn styled(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// A block-level element: one paragraph or heading per line of content.
///
/// Externally tagged so the bincode encoding stays well-defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    Paragraph { spans: Vec<Span> },
    Heading { level: u8, spans: Vec<Span> },
}

impl Block {
    pub fn spans(&self) -> &[Span] {
        match self {
            Block::Paragraph { spans } => spans,
            Block::Heading { spans, .. } => spans,
        }
    }

    fn text(&self) -> String {
        self.spans().iter().map(|s| s.text.as_str()).collect()
    }
}

/// The rich-text document payload.
///
/// Serialized as JSON for interchange; the in-memory form is what the
/// editor session holds and overwrites on every remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    pub blocks: Vec<Block>,
}

impl RichText {
    /// Empty content.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build content from plain text; each line becomes a paragraph.
    pub fn plain(text: impl AsRef<str>) -> Self {
        let blocks = text
            .as_ref()
            .lines()
            .map(|line| Block::Paragraph {
                spans: vec![Span::plain(line)],
            })
            .collect();
        Self { blocks }
    }

    /// Flatten to plain text, blocks joined with newlines.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Total character count across all spans.
    pub fn char_len(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| b.spans())
            .map(|s| s.text.chars().count())
            .sum()
    }

    /// True when the content carries no non-whitespace text.
    ///
    /// An all-whitespace document is "empty" for autosave purposes — the
    /// editor skips write-backs of empty content.
    pub fn is_empty(&self) -> bool {
        self.blocks
            .iter()
            .flat_map(|b| b.spans())
            .all(|s| s.text.trim().is_empty())
    }

    /// Serialize to the JSON interchange form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the JSON interchange form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_roundtrip() {
        let rt = RichText::plain("first line\nsecond line");
        assert_eq!(rt.blocks.len(), 2);
        assert_eq!(rt.plain_text(), "first line\nsecond line");
    }

    #[test]
    fn test_char_len() {
        let rt = RichText::plain("abc\nde");
        assert_eq!(rt.char_len(), 5);
    }

    #[test]
    fn test_is_empty() {
        assert!(RichText::new().is_empty());
        assert!(RichText::plain("   \n\t  ").is_empty());
        assert!(!RichText::plain("x").is_empty());
    }

    #[test]
    fn test_json_roundtrip() {
        let rt = RichText {
            blocks: vec![
                Block::Heading {
                    level: 1,
                    spans: vec![Span::plain("Title")],
                },
                Block::Paragraph {
                    spans: vec![
                        Span::plain("normal "),
                        Span::styled(
                            "bold",
                            SpanStyle {
                                bold: true,
                                ..Default::default()
                            },
                        ),
                    ],
                },
            ],
        };

        let json = rt.to_json().unwrap();
        let parsed = RichText::from_json(&json).unwrap();
        assert_eq!(parsed, rt);
    }

    #[test]
    fn test_styled_spans_preserved() {
        let style = SpanStyle {
            italic: true,
            underline: true,
            ..Default::default()
        };
        let rt = RichText {
            blocks: vec![Block::Paragraph {
                spans: vec![Span::styled("emphasized", style)],
            }],
        };
        assert_eq!(rt.blocks[0].spans()[0].style, style);
        assert!(!style.is_plain());
    }
}
