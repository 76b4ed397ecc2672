use std::sync::Arc;

use ns_core::Result;
use tracing::info;

use crate::Config;

pub mod head;
pub mod regression;

pub use head::{Dropout, HeadWeights, Linear, RegressionHead};
pub use regression::RegressionPredictor;

/// Load encoder and head once; the result is shared read-only afterwards.
pub fn create_predictor(config: &Config) -> Result<Arc<RegressionPredictor>> {
    let predictor = RegressionPredictor::load(config)?;
    info!(
        "🧠 Regression model ready (encoder: {}, hidden size: {})",
        predictor.encoder_name(),
        predictor.hidden_size()
    );
    Ok(Arc::new(predictor))
}
