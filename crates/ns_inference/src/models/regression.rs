use std::fmt;
use std::sync::Arc;

use ns_core::{Error, Result, TextEncoder};
use tracing::debug;

use super::head::RegressionHead;
use crate::{create_encoder, Config};

/// Fine-tuned encoder plus regression head, scoring text in `[-1, 1]`.
///
/// Built once at start-up and immutable afterwards. Texts are scored one at
/// a time, so a batch gives exactly the per-item results of single calls.
pub struct RegressionPredictor {
    encoder: Arc<dyn TextEncoder>,
    head: RegressionHead,
}

impl fmt::Debug for RegressionPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegressionPredictor")
            .field("encoder", &self.encoder)
            .field("hidden_size", &self.head.hidden_size())
            .finish()
    }
}

impl RegressionPredictor {
    pub fn new(encoder: Arc<dyn TextEncoder>, head: RegressionHead) -> Result<Self> {
        if encoder.dimension() != head.hidden_size() {
            return Err(Error::Config(format!(
                "encoder {} produces {} dimensions but the head expects {}",
                encoder.name(),
                encoder.dimension(),
                head.hidden_size()
            )));
        }
        Ok(Self { encoder, head })
    }

    pub fn load(config: &Config) -> Result<Self> {
        let head = RegressionHead::load(&config.head_path()?)?;
        let encoder = create_encoder(config)?;
        Self::new(encoder, head)
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    pub fn hidden_size(&self) -> usize {
        self.head.hidden_size()
    }

    /// Scores every text, in order. Any failure fails the whole call.
    pub fn predict<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<f64>> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                self.predict_one(text.as_ref()).map_err(|e| match e {
                    Error::Prediction(msg) => Error::Prediction(format!("text #{}: {}", index, msg)),
                    other => other,
                })
            })
            .collect()
    }

    pub fn predict_one(&self, text: &str) -> Result<f64> {
        let pooled = self
            .encoder
            .encode(text)
            .map_err(|e| Error::Prediction(e.to_string()))?;
        let raw = self.head.forward(&pooled)?;
        if !raw.is_finite() {
            return Err(Error::Prediction(format!("model produced a non-finite score ({})", raw)));
        }

        let score = clip(f64::from(raw));
        debug!("🔢 Scored {} chars: raw={:.4} clipped={:.4}", text.chars().count(), raw, score);
        Ok(score)
    }
}

pub fn clip(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}
