pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::{Chunk, Document};
pub use chunker::{Chunker, ChunkerConfig};
pub use reader::FileReader;

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Chunk raw text into a document record.
pub fn document_from_text(path: &str, content: &str, config: ChunkerConfig) -> Document {
    let doc_id = generate_doc_id(path);
    let chunks = Chunker::new(config).chunk_text(&doc_id, content, path);
    Document::new(doc_id, path, chunks)
}

/// Read and chunk a single file
pub async fn ingest_file(file_path: &Path) -> Result<Document> {
    let content = FileReader::read_file(file_path).await?;
    let path_str = file_path.to_string_lossy().to_string();

    let document = document_from_text(&path_str, &content, ChunkerConfig::default());
    info!(
        doc_id = %document.doc_id,
        chunks = document.len(),
        "Ingested {}",
        path_str
    );

    Ok(document)
}

/// Read and chunk every supported file in a directory tree
pub async fn ingest_directory(dir_path: &Path) -> Result<Vec<Document>> {
    let files = FileReader::read_directory(dir_path).await?;

    let documents: Vec<Document> = files
        .into_iter()
        .map(|(path, content)| {
            let path_str = path.to_string_lossy().to_string();
            document_from_text(&path_str, &content, ChunkerConfig::default())
        })
        .collect();

    info!(documents = documents.len(), "Ingested directory {:?}", dir_path);
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_text_shares_doc_id() {
        let doc = document_from_text("notes.md", "alpha\n\nbeta", ChunkerConfig::default());

        assert_eq!(doc.doc_id, generate_doc_id("notes.md"));
        assert_eq!(doc.source, "notes.md");
        assert!(doc.chunks.iter().all(|c| c.doc_id == doc.doc_id));
    }
}
