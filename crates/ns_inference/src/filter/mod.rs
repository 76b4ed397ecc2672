use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use ns_core::{cosine_similarity, Error, Result, TextEncoder};
use tracing::{debug, warn};

pub const DEFAULT_THRESHOLD: f32 = 0.8;

pub fn passes_threshold(query_embedding: &[f32], candidate_embedding: &[f32], threshold: f32) -> bool {
    cosine_similarity(query_embedding, candidate_embedding) >= threshold
}

/// Per-scrape-session filter keeping titles semantically close to the query.
///
/// Titles are compared lowercased. A title accepted once is rejected on
/// every later sighting in the same session.
pub struct SemanticFilter {
    encoder: Arc<dyn TextEncoder>,
    query_embedding: Vec<f32>,
    threshold: f32,
    seen: HashSet<String>,
}

impl fmt::Debug for SemanticFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticFilter")
            .field("encoder", &self.encoder.name())
            .field("threshold", &self.threshold)
            .field("seen", &self.seen.len())
            .finish()
    }
}

impl SemanticFilter {
    pub fn new(encoder: Arc<dyn TextEncoder>, query: &str, threshold: f32) -> Result<Self> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("search query is empty".to_string()));
        }
        let query_embedding = encoder.encode(&query.to_lowercase())?;
        Ok(Self::with_query_embedding(encoder, query_embedding, threshold))
    }

    fn with_query_embedding(encoder: Arc<dyn TextEncoder>, query_embedding: Vec<f32>, threshold: f32) -> Self {
        Self {
            encoder,
            query_embedding,
            threshold,
            seen: HashSet::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn accepted(&self) -> usize {
        self.seen.len()
    }

    /// Never fails: empty titles, duplicates and titles that cannot be
    /// embedded are rejected.
    pub fn accept(&mut self, title: &str) -> bool {
        if title.trim().is_empty() {
            return false;
        }
        if self.seen.contains(title) {
            debug!("🔁 Skipping duplicate title {:?}", title);
            return false;
        }

        let embedding = match self.encoder.encode(&title.to_lowercase()) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("⚠️ Could not embed {:?}, skipping: {}", title, e);
                return false;
            }
        };

        let similarity = cosine_similarity(&self.query_embedding, &embedding);
        if similarity < self.threshold {
            debug!("🚫 {:?} similarity {:.3} below {:.2}", title, similarity, self.threshold);
            return false;
        }

        self.seen.insert(title.to_string());
        true
    }
}
