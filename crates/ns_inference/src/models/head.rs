use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use ns_core::{Error, Result};
use serde::Deserialize;

/// Head parameters exported from the training checkpoint
/// (`fc.weight`, `fc.bias` and the dropout probability).
#[derive(Debug, Clone, Deserialize)]
pub struct HeadWeights {
    /// `[out_features][hidden_size]`
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub dropout_prob: f32,
}

#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.nrows() != bias.len() {
            return Err(Error::Config(format!(
                "linear layer has {} outputs but {} biases",
                weight.nrows(),
                bias.len()
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    /// y = Wx + b
    pub fn forward(&self, x: &Array1<f32>) -> Array1<f32> {
        self.weight.dot(x) + &self.bias
    }
}

/// Only ever run in inference mode, where dropout is the identity.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    prob: f32,
}

impl Dropout {
    pub fn new(prob: f32) -> Self {
        Self { prob }
    }

    pub fn prob(&self) -> f32 {
        self.prob
    }

    pub fn forward(&self, x: Array1<f32>) -> Array1<f32> {
        x
    }
}

/// Dropout followed by a linear projection to a single score.
#[derive(Debug, Clone)]
pub struct RegressionHead {
    dropout: Dropout,
    linear: Linear,
}

impl RegressionHead {
    pub fn new(weight: Vec<f32>, bias: f32, dropout_prob: f32) -> Result<Self> {
        let hidden_size = weight.len();
        let weight = Array2::from_shape_vec((1, hidden_size), weight)
            .map_err(|e| Error::Config(format!("invalid head weight: {}", e)))?;
        Ok(Self {
            dropout: Dropout::new(dropout_prob),
            linear: Linear::new(weight, Array1::from_vec(vec![bias]))?,
        })
    }

    pub fn from_weights(weights: HeadWeights) -> Result<Self> {
        let rows = weights.weight.len();
        if rows != 1 {
            return Err(Error::Config(format!(
                "regression head must have exactly one output, found {}",
                rows
            )));
        }
        let cols = weights.weight[0].len();
        if cols == 0 {
            return Err(Error::Config("regression head weight is empty".to_string()));
        }

        let flat: Vec<f32> = weights.weight.into_iter().flatten().collect();
        let weight = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| Error::Config(format!("invalid head weight: {}", e)))?;
        Ok(Self {
            dropout: Dropout::new(weights.dropout_prob),
            linear: Linear::new(weight, Array1::from_vec(weights.bias))?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read head weights {}: {}", path.display(), e)))?;
        let weights: HeadWeights = serde_json::from_str(&raw)?;
        Self::from_weights(weights)
    }

    pub fn hidden_size(&self) -> usize {
        self.linear.in_features()
    }

    pub fn dropout(&self) -> Dropout {
        self.dropout
    }

    /// Raw (unclipped) score for one pooled representation.
    pub fn forward(&self, pooled: &[f32]) -> Result<f32> {
        if pooled.len() != self.hidden_size() {
            return Err(Error::Prediction(format!(
                "expected a {}-wide representation, got {}",
                self.hidden_size(),
                pooled.len()
            )));
        }
        let x = self.dropout.forward(Array1::from_vec(pooled.to_vec()));
        Ok(self.linear.forward(&x)[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_forward() {
        let weight = Array2::from_shape_vec((2, 3), vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        let linear = Linear::new(weight, Array1::from_vec(vec![0.5, -0.5])).unwrap();
        let y = linear.forward(&Array1::from_vec(vec![2.0, 3.0, 4.0]));
        assert_eq!(y.to_vec(), vec![2.5, 6.5]);
    }

    #[test]
    fn test_linear_rejects_bias_mismatch() {
        let weight = Array2::zeros((2, 3));
        assert!(Linear::new(weight, Array1::zeros(1)).is_err());
    }

    #[test]
    fn test_head_forward() {
        let head = RegressionHead::new(vec![0.5, -1.0], 0.1, 0.3).unwrap();
        let score = head.forward(&[2.0, 0.5]).unwrap();
        assert!((score - 0.6).abs() < 1e-6);
        assert_eq!(head.dropout().prob(), 0.3);
    }

    #[test]
    fn test_head_rejects_wrong_width() {
        let head = RegressionHead::new(vec![0.5, -1.0], 0.0, 0.0).unwrap();
        assert!(head.forward(&[1.0]).is_err());
    }

    #[test]
    fn test_head_from_json() {
        let weights: HeadWeights =
            serde_json::from_str(r#"{"weight": [[0.1, 0.2, 0.3]], "bias": [0.05], "dropout_prob": 0.1}"#).unwrap();
        let head = RegressionHead::from_weights(weights).unwrap();
        assert_eq!(head.hidden_size(), 3);

        let multi: HeadWeights = serde_json::from_str(r#"{"weight": [[0.1], [0.2]], "bias": [0.0, 0.0]}"#).unwrap();
        assert!(RegressionHead::from_weights(multi).is_err());
    }

    #[test]
    fn test_head_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("head.json");
        fs::write(&path, r#"{"weight": [[1.0, 1.0]], "bias": [0.0]}"#).unwrap();

        let head = RegressionHead::load(&path).unwrap();
        assert_eq!(head.hidden_size(), 2);
        assert!(RegressionHead::load(&dir.path().join("missing.json")).is_err());
    }
}
