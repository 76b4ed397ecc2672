use std::path::PathBuf;

use async_trait::async_trait;
use ns_core::{Error, Result};

use super::{Candidate, CandidateSource};

/// Candidates exported elsewhere, as a JSON array. Everything is on page 1.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for JsonFileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch_page(&self, _query: &str, page: usize) -> Result<Vec<Candidate>> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::Scraping(format!("Failed to read {}: {}", self.path.display(), e)))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_candidates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");
        std::fs::write(
            &path,
            r#"[{"title": "A", "text": "x", "date": "1 янв 2024, 10:00", "link": "https://example.com/a"},
                {"title": "B"}]"#,
        )
        .unwrap();

        let source = JsonFileSource::new(&path);
        let first = source.fetch_page("q", 1).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1], Candidate::new("B", ""));
        assert!(source.fetch_page("q", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let source = JsonFileSource::new("/definitely/not/here.json");
        assert!(source.fetch_page("q", 1).await.is_err());
    }
}
