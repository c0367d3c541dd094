use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

pub struct FileReader;

impl FileReader {
    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
    }

    pub async fn read_file(path: &Path) -> Result<String> {
        if !Self::is_supported(path) {
            anyhow::bail!("Unsupported file format: {:?}", path);
        }

        fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))
    }

    /// Read every supported file below `dir`, sorted by path.
    pub async fn read_directory(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| Self::is_supported(path))
            .collect();
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let content = Self::read_file(&path).await?;
            files.push((path, content));
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_directory_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();
        std::fs::write(dir.path().join("skip.pdf"), "binary").unwrap();

        let files = FileReader::read_directory(dir.path()).await.unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].0.ends_with("a.txt"));
        assert_eq!(files[1].1, "# B");
    }

    #[tokio::test]
    async fn test_read_file_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "x").unwrap();

        assert!(FileReader::read_file(&path).await.is_err());
    }
}
