use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One ordered slice of a document, the unit the extractors work on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub offset: (usize, usize), // [start, end) character positions in the document
}

impl Chunk {
    pub fn new(doc_id: &str, text: String, source: &str, offset: (usize, usize)) -> Self {
        let chunk_id = Self::generate_chunk_id(doc_id, &text, offset);

        Self {
            doc_id: doc_id.to_string(),
            chunk_id,
            text,
            source: source.to_string(),
            offset,
        }
    }

    fn generate_chunk_id(doc_id: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    /// Estimate token count (rough: 1.3 tokens per word)
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

pub(crate) fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * 1.3) as usize
}

/// A document record: ordered chunks plus the identifiers they share.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub source: String,
    pub chunks: Vec<Chunk>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, source: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self {
            doc_id: doc_id.into(),
            source: source.into(),
            chunks,
        }
    }

    /// Build a document from already-split texts, one chunk per entry.
    pub fn from_texts<I, S>(doc_id: &str, source: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cursor = 0;
        let chunks = texts
            .into_iter()
            .map(|text| {
                let text = text.into();
                let len = text.chars().count();
                let chunk = Chunk::new(doc_id, text, source, (cursor, cursor + len));
                cursor += len;
                chunk
            })
            .collect();

        Self::new(doc_id, source, chunks)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_stable() {
        let a = Chunk::new("doc", "same text".to_string(), "a.txt", (0, 9));
        let b = Chunk::new("doc", "same text".to_string(), "a.txt", (0, 9));
        let c = Chunk::new("doc", "same text".to_string(), "a.txt", (10, 19));

        assert_eq!(a.chunk_id, b.chunk_id);
        assert_ne!(a.chunk_id, c.chunk_id);
        assert_eq!(a.chunk_id.len(), 32);
    }

    #[test]
    fn test_from_texts_assigns_offsets() {
        let doc = Document::from_texts("doc", "inline", ["abc", "de"]);

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.chunks[0].offset, (0, 3));
        assert_eq!(doc.chunks[1].offset, (3, 5));
        assert_eq!(doc.chunks[1].doc_id, "doc");
    }
}
