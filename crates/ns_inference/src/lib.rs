use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use ns_core::{Error, Result, TextEncoder};

pub mod aggregation;
pub mod embeddings;
pub mod filter;
pub mod models;

pub use aggregation::{AggregationService, AggregationState};
pub use embeddings::{FastEmbedEncoder, HashingEncoder};
pub use filter::SemanticFilter;
pub use models::RegressionPredictor;

pub const DEFAULT_MAX_LENGTH: usize = 512;
pub const DEFAULT_HIDDEN_SIZE: usize = 312;
pub const HEAD_FILE_NAME: &str = "head.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderKind {
    /// ONNX models through fastembed.
    #[default]
    FastEmbed,
    /// Deterministic offline encoder; no model files needed.
    Hashing,
}

impl FromStr for EncoderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" | "onnx" => Ok(EncoderKind::FastEmbed),
            "hashing" | "dummy" => Ok(EncoderKind::Hashing),
            other => Err(format!(
                "Unknown encoder: {}. Available encoders: fastembed (default), hashing",
                other
            )),
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderKind::FastEmbed => write!(f, "fastembed"),
            EncoderKind::Hashing => write!(f, "hashing"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub encoder: EncoderKind,
    /// Directory with the fine-tuned encoder export (`model.onnx`, tokenizer
    /// files) and the regression head.
    pub model_dir: Option<PathBuf>,
    /// Regression head weights. Defaults to `<model_dir>/head.json`.
    pub head_file: Option<PathBuf>,
    pub hidden_size: usize,
    pub max_length: usize,
    pub similarity_threshold: f32,
    /// Download cache for the sentence embedding model.
    pub cache_dir: Option<PathBuf>,
    /// Local sentence model export used instead of the downloaded one.
    pub sentence_model_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoder: EncoderKind::default(),
            model_dir: None,
            head_file: None,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            max_length: DEFAULT_MAX_LENGTH,
            similarity_threshold: filter::DEFAULT_THRESHOLD,
            cache_dir: None,
            sentence_model_dir: None,
        }
    }
}

impl Config {
    pub fn head_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.head_file {
            return Ok(path.clone());
        }
        self.model_dir
            .as_ref()
            .map(|dir| dir.join(HEAD_FILE_NAME))
            .ok_or_else(|| Error::Config("no regression head configured: set model_dir or head_file".to_string()))
    }
}

/// Encoder used by the semantic filter for queries and titles.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn TextEncoder>> {
    match config.encoder {
        EncoderKind::FastEmbed => match &config.sentence_model_dir {
            Some(dir) => Ok(Arc::new(FastEmbedEncoder::sentence_from_dir(dir, config.max_length)?)),
            None => Ok(Arc::new(FastEmbedEncoder::sentence(config.cache_dir.clone())?)),
        },
        EncoderKind::Hashing => Ok(Arc::new(HashingEncoder::new(
            embeddings::hashing::DEFAULT_DIMENSION,
            config.max_length,
        ))),
    }
}

/// Encoder feeding the regression head.
pub fn create_encoder(config: &Config) -> Result<Arc<dyn TextEncoder>> {
    match config.encoder {
        EncoderKind::FastEmbed => {
            let dir = config
                .model_dir
                .as_ref()
                .ok_or_else(|| Error::Config("model_dir is required for the fastembed encoder".to_string()))?;
            Ok(Arc::new(FastEmbedEncoder::from_model_dir(
                dir,
                config.max_length,
                config.hidden_size,
            )?))
        }
        EncoderKind::Hashing => Ok(Arc::new(HashingEncoder::new(config.hidden_size, config.max_length))),
    }
}

pub mod prelude {
    pub use super::models::create_predictor;
    pub use super::{create_embedder, create_encoder, Config, EncoderKind};
    pub use super::{AggregationService, AggregationState, RegressionPredictor, SemanticFilter};
    pub use ns_core::{Error, Result};
}
