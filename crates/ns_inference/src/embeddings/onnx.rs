//! Encoders backed by fastembed (ONNX runtime).
//!
//! Two flavours:
//! - a sentence model for query/title similarity, either a stock multilingual
//!   model or a local export, L2-normalized by fastembed,
//! - a user-supplied export of the fine-tuned encoder for the regression head.
//!   Its output is the raw first-token (`[CLS]`) hidden state, unnormalized,
//!   because the head was trained on exactly that.
//!
//! fastembed's `embed` needs `&mut self`, so the model sits behind a `Mutex`
//! and calls are serialized.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fastembed::{
    EmbeddingModel, InitOptionsUserDefined, OutputKey, Pooling, SingleBatchOutput, TextEmbedding,
    TextInitOptions, TokenizerFiles, UserDefinedEmbeddingModel,
};
use ns_core::{Error, Result, TextEncoder};
use serde::Deserialize;
use tracing::info;

const SENTENCE_MODEL_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";
const SENTENCE_MODEL_DIMENSION: usize = 384;

/// Token-level output of a transformer export.
const HIDDEN_STATE_OUTPUTS: &[OutputKey] = &[OutputKey::OnlyOne, OutputKey::ByName("last_hidden_state")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    /// fastembed's pooled and normalized sentence embedding.
    Normalized,
    /// First-token hidden state as the model produced it.
    RawCls,
}

pub struct FastEmbedEncoder {
    model: Mutex<TextEmbedding>,
    name: String,
    dimension: usize,
    output: Output,
}

impl fmt::Debug for FastEmbedEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastEmbedEncoder")
            .field("model", &"<fastembed::TextEmbedding>")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("output", &self.output)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TransformerConfig {
    hidden_size: usize,
}

fn read_file(dir: &Path, file: &str) -> Result<Vec<u8>> {
    let path = dir.join(file);
    fs::read(&path).map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// `model.onnx` plus the four tokenizer files of a Hugging Face export.
fn load_user_defined(dir: &Path, max_length: usize, pooling: Pooling) -> Result<TextEmbedding> {
    let tokenizer_files = TokenizerFiles {
        tokenizer_file: read_file(dir, "tokenizer.json")?,
        config_file: read_file(dir, "config.json")?,
        special_tokens_map_file: read_file(dir, "special_tokens_map.json")?,
        tokenizer_config_file: read_file(dir, "tokenizer_config.json")?,
    };
    let user_model = UserDefinedEmbeddingModel::new(read_file(dir, "model.onnx")?, tokenizer_files).with_pooling(pooling);

    TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::new().with_max_length(max_length))
        .map_err(|e| Error::Embedding(format!("Failed to load encoder from {}: {}", dir.display(), e)))
}

/// Width of the hidden state, from the export's `config.json`.
pub fn hidden_size_of(dir: &Path) -> Result<usize> {
    let config: TransformerConfig = serde_json::from_slice(&read_file(dir, "config.json")?)?;
    Ok(config.hidden_size)
}

/// Rows of the `[CLS]` slice, left exactly as the session returned them.
fn raw_cls_rows(batches: &[SingleBatchOutput]) -> anyhow::Result<Vec<Vec<f32>>> {
    let mut rows = Vec::new();
    for batch in batches {
        let pooled = batch.select_and_pool_output(&HIDDEN_STATE_OUTPUTS, Some(Pooling::Cls))?;
        rows.extend(pooled.rows().into_iter().map(|row| row.iter().copied().collect::<Vec<f32>>()));
    }
    Ok(rows)
}

impl FastEmbedEncoder {
    /// Multilingual sentence model, downloaded on first use into `cache_dir`.
    pub fn sentence(cache_dir: Option<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.unwrap_or_else(|| PathBuf::from(".fastembed_cache"));
        let model = TextEmbedding::try_new(
            TextInitOptions::new(EmbeddingModel::ParaphraseMLMiniLML12V2)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(true),
        )
        .map_err(|e| Error::Embedding(format!("Failed to load {}: {}", SENTENCE_MODEL_NAME, e)))?;

        info!("🧠 Sentence model {} loaded", SENTENCE_MODEL_NAME);
        Ok(Self {
            model: Mutex::new(model),
            name: SENTENCE_MODEL_NAME.to_string(),
            dimension: SENTENCE_MODEL_DIMENSION,
            output: Output::Normalized,
        })
    }

    /// Local sentence-transformers export (e.g. rubert-tiny-turbo), mean pooled.
    pub fn sentence_from_dir(dir: &Path, max_length: usize) -> Result<Self> {
        let dimension = hidden_size_of(dir)?;
        let model = load_user_defined(dir, max_length, Pooling::Mean)?;

        info!("🧠 Sentence model loaded from {} ({} dimensions)", dir.display(), dimension);
        Ok(Self {
            model: Mutex::new(model),
            name: dir.display().to_string(),
            dimension,
            output: Output::Normalized,
        })
    }

    /// Fine-tuned encoder exported to ONNX.
    ///
    /// `dir` must hold `model.onnx`, `tokenizer.json`, `config.json`,
    /// `special_tokens_map.json` and `tokenizer_config.json`. Inputs longer
    /// than `max_length` tokens are truncated.
    pub fn from_model_dir(dir: &Path, max_length: usize, hidden_size: usize) -> Result<Self> {
        let model = load_user_defined(dir, max_length, Pooling::Cls)?;

        info!("🧠 Encoder loaded from {} (max_length={})", dir.display(), max_length);
        Ok(Self {
            model: Mutex::new(model),
            name: dir.display().to_string(),
            dimension: hidden_size,
            output: Output::RawCls,
        })
    }
}

impl TextEncoder for FastEmbedEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("encoder lock poisoned".to_string()))?;

        let embeddings = match self.output {
            Output::Normalized => model.embed(vec![text], None),
            Output::RawCls => model
                .transform(vec![text], None)
                .and_then(|output| output.export_with_transformer(raw_cls_rows)),
        };
        let embedding = embeddings
            .map_err(|e| Error::Embedding(e.to_string()))?
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no embedding".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_size_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"model_type": "bert", "hidden_size": 312, "num_hidden_layers": 3}"#,
        )
        .unwrap();
        assert_eq!(hidden_size_of(dir.path()).unwrap(), 312);
    }

    #[test]
    fn test_missing_export_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(hidden_size_of(dir.path()), Err(Error::Config(_))));
        assert!(matches!(
            FastEmbedEncoder::from_model_dir(dir.path(), 512, 312),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FastEmbedEncoder::sentence_from_dir(dir.path(), 512),
            Err(Error::Config(_))
        ));
    }
}
