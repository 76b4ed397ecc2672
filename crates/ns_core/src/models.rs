use std::fmt;

use crate::Result;

/// Turns text into a fixed-width vector.
///
/// Used both for the query/title embeddings of the semantic filter and for
/// the first-token representation fed to the regression head.
/// Implementations are immutable after construction and shared across calls.
pub trait TextEncoder: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Width of every vector returned by [`TextEncoder::encode`].
    fn dimension(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>>;
}
