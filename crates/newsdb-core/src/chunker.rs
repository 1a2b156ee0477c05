use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::types::{chunk_id, Chunk, ChunkParams};

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\A---\n.*?\n---\n*").expect("static regex"));
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("static regex"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("static regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("static regex"));
static TABLE_RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\|[\s|\-]+\|$").expect("static regex"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+").expect("static regex"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*{1,3}(.*?)\*{1,3}").expect("static regex"));
static RULE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t\-]+$").expect("static regex"));
static DASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:---\s*){2,}").expect("static regex"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("static regex"));

/// Strips markdown frontmatter and presentational syntax, keeping prose.
pub fn clean_for_indexing(markdown: &str) -> String {
    let markdown = markdown.replace("\r\n", "\n");
    let text = FRONTMATTER.replace(&markdown, "");
    let text = IMAGE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = URL.replace_all(&text, "");
    let text = TABLE_RULE.replace_all(&text, "");
    let text = text.replace('|', " ");
    let text = HEADING.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "$1");
    let text = RULE_LINE.replace_all(&text, "");
    let text = DASH_RUN.replace_all(&text, "");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    let text = SPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}

/// Byte range of one chunk inside the body it was split from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

/// Splits `body` into ordered, overlapping spans of at most `max_len`
/// characters. Consecutive spans share at most `overlap` characters.
pub fn split(body: &str, max_len: usize, overlap: usize) -> Result<Vec<ChunkSpan>> {
    if max_len == 0 || overlap >= max_len {
        return Err(Error::InvalidConfig(format!(
            "chunk overlap ({overlap}) must be smaller than chunk length ({max_len})"
        )));
    }
    let chars: Vec<char> = body.chars().collect();
    // offsets[i] is the byte offset of char i; offsets[n] == body.len()
    let mut offsets: Vec<usize> = body.char_indices().map(|(i, _)| i).collect();
    offsets.push(body.len());
    let n = chars.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = start + max_len;
        if hard_end >= n {
            spans.push(ChunkSpan { start: offsets[start], end: offsets[n] });
            break;
        }
        let min_end = start + (overlap + 1).max(max_len / 2);
        let end = find_break(&chars, min_end, hard_end).unwrap_or(hard_end);
        spans.push(ChunkSpan { start: offsets[start], end: offsets[end] });
        start = next_start(&chars, end - overlap, end);
    }
    Ok(spans)
}

/// Best break position in `lo..=hi`: paragraph, then sentence, then word.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let lo = lo.max(2);
    if lo > hi {
        return None;
    }
    let candidates = || (lo..=hi).rev();
    candidates()
        .find(|&e| chars[e - 1] == '\n' && chars[e - 2] == '\n')
        .or_else(|| candidates().find(|&e| chars[e - 1].is_whitespace() && matches!(chars[e - 2], '.' | '!' | '?')))
        .or_else(|| candidates().find(|&e| chars[e - 1].is_whitespace()))
}

/// First word start in `from..end`, or `from` when the overlap holds none.
fn next_start(chars: &[char], from: usize, end: usize) -> usize {
    (from..end)
        .find(|&i| !chars[i].is_whitespace() && (i == 0 || chars[i - 1].is_whitespace()))
        .unwrap_or(from)
}

/// Splits an already-cleaned body into identified chunks.
pub fn chunk_document(doc_id: &str, body: &str, params: ChunkParams) -> Result<Vec<Chunk>> {
    let spans = split(body, params.max_chars, params.overlap_chars)?;
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(position, span)| Chunk {
            id: chunk_id(doc_id, position),
            doc_id: doc_id.to_string(),
            position,
            span_start: span.start,
            span_end: span.end,
            text: body[span.start..span.end].to_string(),
        })
        .collect())
}

/// Rebuilds the body from spans by appending only the part of each span
/// past the previous span's end.
pub fn reconstruct(body: &str, spans: &[ChunkSpan]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut covered = 0usize;
    for span in spans {
        let from = covered.max(span.start);
        if span.end > from {
            out.push_str(&body[from..span.end]);
            covered = span.end;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_strips_markup_but_keeps_link_text() {
        let md = "---\ntitle: \"Weekly\"\n---\n\n# Heading\n\nRead [the report](https://x.io/r) and **act** now.\n\n| a | b |\n|---|---|\n\nSee https://example.com/path for more.";
        let clean = clean_for_indexing(md);
        assert!(!clean.contains("title:"));
        assert!(clean.starts_with("Heading"));
        assert!(clean.contains("Read the report and act now."));
        assert!(!clean.contains("https://"));
        assert!(!clean.contains('|'));
    }

    #[test]
    fn break_prefers_paragraph_over_sentence() {
        let body = "First sentence here. Second one too.\n\nNext paragraph starts here and runs on for a while.";
        let spans = split(body, 50, 5).expect("split");
        assert_eq!(&body[spans[0].start..spans[0].end], "First sentence here. Second one too.\n\n");
    }

    #[test]
    fn falls_back_to_hard_cut_without_whitespace() {
        let body = "x".repeat(25);
        let spans = split(&body, 10, 2).expect("split");
        assert_eq!(spans[0], ChunkSpan { start: 0, end: 10 });
        assert_eq!(spans[1].start, 8);
        assert_eq!(reconstruct(&body, &spans), body);
    }
}
