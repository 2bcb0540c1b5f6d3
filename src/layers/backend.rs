//! Pluggable compute backends for device-accelerated layers.
//!
//! A backend only ever sees flat buffers: the weights and values of every
//! neuron of a layer, laid out neuron after neuron. Kernel management, device
//! buffers and transfers stay behind the [`ComputeBackend`] trait.

use std::fmt;

use itertools::izip;
use thiserror::Error;

/// Failures reported by a compute backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("kernel build failed: {0}")]
    Build(String),

    #[error("kernel launch failed: {0}")]
    Launch(String),

    #[error("buffer holds {actual} values, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// The flattened state of one layer handed to a backend.
#[derive(Copy, Clone, Debug)]
pub struct Workload<'a> {
    /// `neurons * inputs` weights, neuron-major.
    pub weights: &'a [f64],
    /// `neurons * inputs` values, in the same layout as `weights`.
    pub values: &'a [f64],
    pub neurons: usize,
    pub inputs: usize,
}

impl<'a> Workload<'a> {
    /// Checks that the buffers match the declared counts.
    pub fn validate(&self) -> Result<(), BackendError> {
        let expected = self.neurons * self.inputs;
        for actual in [self.weights.len(), self.values.len()] {
            if actual != expected {
                return Err(BackendError::BufferSize { expected, actual });
            }
        }
        Ok(())
    }
}

/// A device able to evaluate the dot products of a whole layer at once.
pub trait ComputeBackend: Send + Sync + fmt::Debug {
    /// Returns `Σ weight[i] * value[i]` for every neuron of the workload.
    ///
    /// The sum must be folded left from 0.0 in input order; the bias is
    /// added by the caller.
    fn dot_products(&self, workload: &Workload<'_>) -> Result<Vec<f64>, BackendError>;

    /// Returns the weights after one gradient step, computed as
    /// `weight - learning_rate * value * delta` with one delta per neuron.
    fn update_weights(
        &self,
        workload: &Workload<'_>,
        deltas: &[f64],
        learning_rate: f64,
    ) -> Result<Vec<f64>, BackendError>;
}

/// Reference backend evaluating workloads on the host.
#[derive(Copy, Clone, Debug, Default)]
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn dot_products(&self, workload: &Workload<'_>) -> Result<Vec<f64>, BackendError> {
        workload.validate()?;
        if workload.inputs == 0 {
            return Ok(vec![0.0; workload.neurons]);
        }
        Ok(izip!(
            workload.weights.chunks(workload.inputs),
            workload.values.chunks(workload.inputs)
        )
        .map(|(weights, values)| {
            izip!(weights, values).fold(0.0, |acc, (w, v)| acc + w * v)
        })
        .collect())
    }

    fn update_weights(
        &self,
        workload: &Workload<'_>,
        deltas: &[f64],
        learning_rate: f64,
    ) -> Result<Vec<f64>, BackendError> {
        workload.validate()?;
        if deltas.len() != workload.neurons {
            return Err(BackendError::BufferSize {
                expected: workload.neurons,
                actual: deltas.len(),
            });
        }
        let mut updated = Vec::with_capacity(workload.weights.len());
        for (neuron, &delta) in deltas.iter().enumerate() {
            let range = neuron * workload.inputs..(neuron + 1) * workload.inputs;
            for (w, v) in izip!(&workload.weights[range.clone()], &workload.values[range]) {
                updated.push(w - learning_rate * v * delta);
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_dot_products() {
        let weights = [1.0, 2.0, 0.5, -1.0];
        let values = [3.0, 4.0, 2.0, 2.0];
        let workload = Workload {
            weights: &weights,
            values: &values,
            neurons: 2,
            inputs: 2,
        };
        assert_eq!(CpuBackend.dot_products(&workload).unwrap(), vec![11.0, -1.0]);
    }

    #[test]
    fn cpu_update() {
        let weights = [1.0, 2.0];
        let values = [1.0, 0.5];
        let workload = Workload {
            weights: &weights,
            values: &values,
            neurons: 1,
            inputs: 2,
        };
        let updated = CpuBackend.update_weights(&workload, &[2.0], 0.5).unwrap();
        assert_eq!(updated, vec![0.0, 1.5]);
    }

    #[test]
    fn mismatched_buffers() {
        let workload = Workload {
            weights: &[1.0],
            values: &[1.0, 2.0],
            neurons: 1,
            inputs: 2,
        };
        match CpuBackend.dot_products(&workload) {
            Err(BackendError::BufferSize { expected: 2, actual: 1 }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
