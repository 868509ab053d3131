//! File-type-aware chunking
//!
//! Code is split at top-level definitions, Markdown at `#`/`##` headers and
//! everything else by size. Any section longer than the chunk size is then
//! split by size with overlap.

use crate::core::string::floor_char_boundary;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Byte range into a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingStrategy {
    Code,
    Markdown,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl Chunker {
    /// Overlap is clamped below the chunk size so splitting always advances.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into spans. Whitespace-only sections are dropped.
    pub fn chunk(&self, text: &str, strategy: ChunkingStrategy) -> Vec<TextSpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let sections = match strategy {
            ChunkingStrategy::Code => split_sections(text, is_code_boundary, is_annotation),
            ChunkingStrategy::Markdown => split_sections(text, is_markdown_header, |_| false),
            ChunkingStrategy::Text => vec![TextSpan::new(0, text.len())],
        };
        sections
            .into_iter()
            .filter(|s| !s.slice(text).trim().is_empty())
            .flat_map(|s| self.split_by_size(text, s))
            .collect()
    }

    /// Convenience returning the chunk text alongside each span
    pub fn chunk_text<'a>(&self, text: &'a str, strategy: ChunkingStrategy) -> Vec<(TextSpan, &'a str)> {
        self.chunk(text, strategy)
            .into_iter()
            .map(|span| (span, span.slice(text)))
            .collect()
    }

    fn split_by_size(&self, text: &str, section: TextSpan) -> Vec<TextSpan> {
        if section.len() <= self.chunk_size {
            return vec![section];
        }

        let mut spans = Vec::new();
        let mut start = section.start;
        while start < section.end {
            let hard_end = (start + self.chunk_size).min(section.end);
            let mut end = floor_char_boundary(text, hard_end);
            if end < section.end {
                // Prefer a line break in the back half of the window
                let window = &text[start..end];
                if let Some(pos) = window.rfind('\n')
                    && pos + 1 > self.chunk_size / 2
                {
                    end = start + pos + 1;
                }
            }
            if end <= start {
                end = ceil_char_boundary(text, start + 1);
            }
            spans.push(TextSpan::new(start, end));
            if end >= section.end {
                break;
            }
            let next = floor_char_boundary(text, end.saturating_sub(self.overlap));
            start = if next > start { next } else { end };
        }
        spans
    }
}

fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut idx = index.min(text.len());
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Split at lines matching `is_boundary`. A boundary directly after a
/// `is_prefix` line (decorator, attribute) stays with that prefix.
fn split_sections(
    text: &str,
    is_boundary: fn(&str) -> bool,
    is_prefix: fn(&str) -> bool,
) -> Vec<TextSpan> {
    let mut starts = vec![0];
    let mut offset = 0;
    let mut prev_was_prefix = false;
    for line in text.split_inclusive('\n') {
        let boundary = is_boundary(line) || is_prefix(line);
        if boundary && offset > 0 && !prev_was_prefix {
            starts.push(offset);
        }
        prev_was_prefix = is_prefix(line);
        offset += line.len();
    }
    starts.push(text.len());
    starts
        .windows(2)
        .map(|w| TextSpan::new(w[0], w[1]))
        .filter(|s| !s.is_empty())
        .collect()
}

const DEFINITION_PREFIXES: &[&str] = &[
    "def ",
    "async def ",
    "class ",
    "fn ",
    "pub fn ",
    "pub(crate) fn ",
    "async fn ",
    "pub async fn ",
    "struct ",
    "pub struct ",
    "enum ",
    "pub enum ",
    "trait ",
    "pub trait ",
    "impl ",
    "impl<",
    "mod ",
    "pub mod ",
    "function ",
    "async function ",
    "export ",
    "func ",
    "interface ",
];

fn is_code_boundary(line: &str) -> bool {
    DEFINITION_PREFIXES.iter().any(|p| line.starts_with(p))
}

fn is_annotation(line: &str) -> bool {
    line.starts_with('@') || line.starts_with("#[")
}

fn is_markdown_header(line: &str) -> bool {
    line.starts_with("# ") || line.starts_with("## ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(chunker: &Chunker, text: &'a str, strategy: ChunkingStrategy) -> Vec<&'a str> {
        chunker
            .chunk_text(text, strategy)
            .into_iter()
            .map(|(_, t)| t)
            .collect()
    }

    #[test]
    fn test_small_text_is_one_chunk() {
        let chunker = Chunker::default();
        let spans = chunker.chunk("hello world", ChunkingStrategy::Text);
        assert_eq!(spans, vec![TextSpan::new(0, 11)]);
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert!(Chunker::default().chunk("  \n\t", ChunkingStrategy::Code).is_empty());
    }

    #[test]
    fn test_size_split_with_overlap() {
        let text = "a".repeat(2500);
        let spans = Chunker::default().chunk(&text, ChunkingStrategy::Text);
        assert_eq!(
            spans,
            vec![
                TextSpan::new(0, 1000),
                TextSpan::new(850, 1850),
                TextSpan::new(1700, 2500),
            ]
        );
    }

    #[test]
    fn test_code_split_at_top_level_definitions() {
        let code = "import os\n\ndef a():\n    return 1\n\n@cached\ndef b():\n    return 2\n\nclass C:\n    def m(self):\n        pass\n";
        let chunks = texts(&Chunker::default(), code, ChunkingStrategy::Code);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], "import os\n\n");
        assert!(chunks[1].starts_with("def a()"));
        assert!(chunks[2].starts_with("@cached\ndef b()"));
        // Nested method stays inside its class
        assert!(chunks[3].starts_with("class C:") && chunks[3].contains("def m(self)"));
    }

    #[test]
    fn test_markdown_split_at_headers() {
        let md = "# Title\nintro\n## Setup\nsteps\n### Detail\nmore\n## Usage\nrun it\n";
        let chunks = texts(&Chunker::default(), md, ChunkingStrategy::Markdown);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].starts_with("## Setup") && chunks[1].contains("### Detail"));
        assert!(chunks[2].starts_with("## Usage"));
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(700);
        let chunker = Chunker::new(101, 10);
        for (span, chunk) in chunker.chunk_text(&text, ChunkingStrategy::Text) {
            assert!(text.is_char_boundary(span.start));
            assert!(text.is_char_boundary(span.end));
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = Chunker::new(10, 50);
        assert_eq!(chunker.overlap(), 9);
    }
}
