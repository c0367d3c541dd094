use crate::chunk::{Chunk, estimate_tokens};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub target_tokens_min: usize,
    pub target_tokens_max: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens_min: 700,
            target_tokens_max: 900,
            overlap_tokens: 100,
        }
    }
}

/// A run of non-blank lines, addressed by byte range in the source text.
#[derive(Debug)]
struct Paragraph {
    start: usize,
    end: usize,
    tokens: usize,
    heading: bool,
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Pack paragraphs into chunks of at most `target_tokens_max` tokens.
    ///
    /// A markdown heading closes the current chunk once it holds at least
    /// `target_tokens_min` tokens. Size-driven splits carry trailing
    /// paragraphs worth up to `overlap_tokens` into the next chunk.
    pub fn chunk_text(&self, doc_id: &str, text: &str, source: &str) -> Vec<Chunk> {
        let paragraphs = split_paragraphs(text);
        let mut chunks = Vec::new();
        let mut window: Vec<usize> = Vec::new();
        let mut window_tokens = 0;

        for (idx, para) in paragraphs.iter().enumerate() {
            let heading_break = para.heading && window_tokens >= self.config.target_tokens_min;
            let over_budget = window_tokens + para.tokens > self.config.target_tokens_max;

            if !window.is_empty() && (heading_break || over_budget) {
                chunks.push(self.build_chunk(doc_id, text, source, &paragraphs, &window));

                window = if heading_break {
                    Vec::new()
                } else {
                    self.overlap_tail(&paragraphs, &window)
                };
                window_tokens = window.iter().map(|&i| paragraphs[i].tokens).sum();
            }

            window.push(idx);
            window_tokens += para.tokens;
        }

        if !window.is_empty() {
            chunks.push(self.build_chunk(doc_id, text, source, &paragraphs, &window));
        }

        chunks
    }

    fn overlap_tail(&self, paragraphs: &[Paragraph], window: &[usize]) -> Vec<usize> {
        let mut tail = Vec::new();
        let mut tokens = 0;

        // Never carry the whole window, the next chunk must make progress.
        for &idx in window.iter().skip(1).rev() {
            tokens += paragraphs[idx].tokens;
            if tokens > self.config.overlap_tokens {
                break;
            }
            tail.push(idx);
        }

        tail.reverse();
        tail
    }

    fn build_chunk(
        &self,
        doc_id: &str,
        text: &str,
        source: &str,
        paragraphs: &[Paragraph],
        window: &[usize],
    ) -> Chunk {
        let start = paragraphs[window[0]].start;
        let end = paragraphs[window[window.len() - 1]].end;

        let char_start = text[..start].chars().count();
        let body = &text[start..end];
        let char_end = char_start + body.chars().count();

        Chunk::new(doc_id, body.to_string(), source, (char_start, char_end))
    }
}

fn split_paragraphs(text: &str) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current: Option<(usize, usize, bool)> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let content = line.trim_end_matches(['\r', '\n']);
        let line_end = line_start + content.len();

        if content.trim().is_empty() {
            if let Some((start, end, heading)) = current.take() {
                paragraphs.push(make_paragraph(text, start, end, heading));
            }
            continue;
        }

        let is_heading = content.trim_start().starts_with('#');
        match current {
            Some((start, end, heading)) if is_heading => {
                paragraphs.push(make_paragraph(text, start, end, heading));
                current = Some((line_start, line_end, true));
            }
            Some((start, _, heading)) => current = Some((start, line_end, heading)),
            None => current = Some((line_start, line_end, is_heading)),
        }
    }

    if let Some((start, end, heading)) = current {
        paragraphs.push(make_paragraph(text, start, end, heading));
    }

    paragraphs
}

fn make_paragraph(text: &str, start: usize, end: usize, heading: bool) -> Paragraph {
    Paragraph {
        start,
        end,
        tokens: estimate_tokens(&text[start..end]).max(1),
        heading,
    }
}
