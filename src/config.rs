//! Training parameters read from JSON files.
//!
//! Every field is optional; missing fields keep the defaults of
//! [`BepAlgorithm::new`](crate::backprop::BepAlgorithm::new).
//!
//! ```json
//! {
//!     "learning_rate": 0.09,
//!     "max_epochs": 20000,
//!     "error_threshold": 0.01,
//!     "log_every": 500,
//!     "seed": 42,
//!     "hidden_delta_bias": true,
//!     "error": "SquaredError"
//! }
//! ```

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::loss::ErrorCalculator;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub learning_rate: Option<f64>,
    /// Upper bound on the number of epochs.
    pub max_epochs: Option<usize>,
    /// Training stops once the epoch error drops below this value.
    pub error_threshold: Option<f64>,
    /// Emits an epoch summary every `log_every` epochs.
    pub log_every: Option<usize>,
    /// Seed of the example shuffling.
    pub seed: Option<u64>,
    pub hidden_delta_bias: Option<bool>,
    pub error: Option<ErrorCalculator>,
}

impl TrainingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the configuration stored at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = TrainingConfig::from_json(&fs::read_to_string(path)?)?;
        debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }
}
