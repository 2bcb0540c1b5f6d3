//! Error measures used to score a prediction against its expected output.

use itertools::izip;

/// The error function accumulated over a training epoch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCalculator {
    /// `Σ (output - expected)²`
    SquaredError,
    /// `-Σ expected * ln(output)`
    ///
    /// Outputs of 0 produce infinite errors; nothing guards against it.
    CrossEntropyError,
}

impl Default for ErrorCalculator {
    fn default() -> Self {
        ErrorCalculator::SquaredError
    }
}

impl ErrorCalculator {
    /// Computes the error of `outputs` against `expected`.
    pub fn calculate(&self, outputs: &[f64], expected: &[f64]) -> f64 {
        assert_eq!(outputs.len(), expected.len());
        match *self {
            ErrorCalculator::SquaredError => izip!(outputs, expected)
                .map(|(o, e)| (o - e) * (o - e))
                .sum(),
            ErrorCalculator::CrossEntropyError => -izip!(outputs, expected)
                .map(|(o, e)| e * o.ln())
                .sum::<f64>(),
        }
    }
}
