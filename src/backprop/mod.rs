//! Training by back-propagation of errors.
//!
//! Training runs on a [`Perceptron<dyn TrainableLayer>`], obtained with
//! [`Perceptron::into_trainable`]: every neuron is wrapped in a [`BpNeuron`]
//! carrying its delta, and every layer gains the [`TrainableLayer`]
//! operations. One training step is:
//!
//! 1. a forward pass,
//! 2. output deltas from the expected outputs,
//! 3. hidden deltas propagated from the last layer back to the first,
//! 4. a weight update of every layer.

use crate::error::Result;
use crate::layers::TrainableLayer;
use crate::perceptron::Perceptron;

pub mod bep;
pub mod bptt;
mod layer;
mod neuron;

pub use self::bep::BepAlgorithm;
pub use self::bptt::BpttAlgorithm;
pub use self::neuron::{BpNeuron, Decorate, Trainable};

/// Sets the delta of every output neuron against `expected`.
pub(crate) fn output_deltas<M>(layer: &mut dyn TrainableLayer, expected: &[f64], momentum: M)
where
    M: Fn(f64, f64) -> f64,
{
    for (id, &expected) in expected.iter().enumerate() {
        let delta = layer.calculate_delta(id, expected);
        let old = layer.delta(id);
        layer.set_delta(id, momentum(old, delta));
    }
}

/// Propagates the deltas of the last layer back to the first one.
///
/// Neuron `j` of a layer collects `delta_k * weight_kj` from every neuron `k`
/// of the next layer reading its output, plus `delta_k * bias_k` when
/// `with_bias` is set.
pub(crate) fn hidden_deltas<M>(
    layers: &mut [Box<dyn TrainableLayer>],
    momentum: M,
    with_bias: bool,
) where
    M: Fn(f64, f64) -> f64,
{
    for id in (0..layers.len().saturating_sub(1)).rev() {
        let (head, tail) = layers.split_at_mut(id + 1);
        let current = &mut head[id];
        let next = &tail[0];
        for j in 0..current.size() {
            let mut sum = 0.0;
            for k in 0..next.size() {
                if let Some(weight) = next.back_weight(k, j) {
                    sum += next.delta(k) * weight;
                    if with_bias {
                        sum += next.delta(k) * next.bias(k);
                    }
                }
            }
            let delta = sum * current.calculate_derivate(j);
            let old = current.delta(j);
            current.set_delta(j, momentum(old, delta));
        }
    }
}

/// Applies one gradient step to every layer.
pub(crate) fn apply_updates(
    perceptron: &mut Perceptron<dyn TrainableLayer>,
    learning_rate: f64,
) -> Result<()> {
    for layer in perceptron.layers_mut() {
        layer.update_weights(learning_rate)?;
    }
    Ok(())
}
