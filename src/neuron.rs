//! Neuron kinds.
//!
//! A neuron owns its inputs, its bias and the cached result of its last
//! evaluation. Evaluation is split in two phases so that a layer can compute
//! every dot product before any neuron finalizes its output:
//!
//! 1. [`Neural::calc_dot_product`] computes `bias + Σ weight * value`.
//! 2. [`Neural::calculate_output`] applies the activation function, given the
//!    dot products of the whole layer.

use std::fmt;

use itertools::izip;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::memento::NeuronMemento;

/// Weight and latest value of one neuron input.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Input {
    pub weight: f64,
    pub value: f64,
}

/// Operations shared by every neuron kind.
///
/// Indices passed to the accessors must be below [`Neural::size`]; larger
/// indices panic.
pub trait Neural: fmt::Debug + Send + Sync + 'static {
    /// Number of input slots.
    fn size(&self) -> usize;

    fn input(&self, id: usize) -> f64;

    fn set_input(&mut self, id: usize, value: f64);

    /// The value of input `id` used by the last evaluation.
    fn last_input(&self, id: usize) -> f64 {
        self.input(id)
    }

    fn weight(&self, id: usize) -> f64;

    fn set_weight(&mut self, id: usize, weight: f64);

    fn bias(&self) -> f64;

    fn set_bias(&mut self, bias: f64);

    /// The output cached by the last call to [`Neural::calculate_output`].
    fn output(&self) -> f64;

    fn calc_dot_product(&self) -> f64;

    /// Computes, caches and returns the output of the neuron.
    ///
    /// `siblings` holds the dot products of every neuron of the layer.
    fn calculate_output(&mut self, dot_product: f64, siblings: &[f64]) -> f64;

    /// Derivative of the activation at the cached output.
    fn calculate_derivate(&self) -> f64;

    /// Error signal of the neuron when it sits in the output layer.
    fn calculate_delta(&self, expected: f64) -> f64;

    /// Returns false for neurons without trainable parameters.
    fn is_trainable(&self) -> bool {
        true
    }

    /// Clears state carried over between evaluations.
    fn reset(&mut self) {}

    fn memento(&self) -> NeuronMemento;

    fn set_memento(&mut self, memento: &NeuronMemento) -> Result<()>;
}

/// Returns the uniform distribution used for fresh weights.
pub(crate) fn initial_weights() -> Uniform<f64> {
    Uniform::new(-0.5, 0.5)
}

/// A weighted neuron.
#[derive(Clone, Debug, PartialEq)]
pub struct Neuron {
    activation: Activation,
    inputs: Vec<Input>,
    bias: f64,
    output: f64,
}

impl Neuron {
    /// Initializes a new, untrained neuron.
    ///
    /// Arguments:
    ///
    ///  * `activation` - the activation function applied to the dot product.
    ///  * `inputs` - the number of inputs to this neuron.
    ///  * `rng` - the source of the initial weights and bias.
    pub fn new<R: Rng + ?Sized>(
        activation: Activation,
        inputs: usize,
        rng: &mut R,
    ) -> Self {
        let distribution = initial_weights();
        let inputs = (0..inputs)
            .map(|_| Input {
                weight: distribution.sample(rng),
                value: 0.0,
            })
            .collect();
        Neuron {
            activation,
            inputs,
            bias: distribution.sample(rng),
            output: 0.0,
        }
    }

    /// Creates a neuron with the provided `weights` and `bias`.
    pub fn with_weights(activation: Activation, weights: &[f64], bias: f64) -> Self {
        Neuron {
            activation,
            inputs: weights
                .iter()
                .map(|&weight| Input { weight, value: 0.0 })
                .collect(),
            bias,
            output: 0.0,
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }
}

impl Neural for Neuron {
    fn size(&self) -> usize {
        self.inputs.len()
    }

    fn input(&self, id: usize) -> f64 {
        self.inputs[id].value
    }

    fn set_input(&mut self, id: usize, value: f64) {
        self.inputs[id].value = value;
    }

    fn weight(&self, id: usize) -> f64 {
        self.inputs[id].weight
    }

    fn set_weight(&mut self, id: usize, weight: f64) {
        self.inputs[id].weight = weight;
    }

    fn bias(&self) -> f64 {
        self.bias
    }

    fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    fn output(&self) -> f64 {
        self.output
    }

    fn calc_dot_product(&self) -> f64 {
        self.activation
            .sum(self.inputs.iter().map(|i| i.weight * i.value), self.bias)
    }

    fn calculate_output(&mut self, dot_product: f64, siblings: &[f64]) -> f64 {
        self.output = self.activation.calculate(dot_product, siblings);
        self.output
    }

    fn calculate_derivate(&self) -> f64 {
        self.activation.derivate(self.output)
    }

    fn calculate_delta(&self, expected: f64) -> f64 {
        self.activation.delta(self.output, expected)
    }

    fn memento(&self) -> NeuronMemento {
        NeuronMemento {
            bias: self.bias,
            weights: self.inputs.iter().map(|i| i.weight).collect(),
        }
    }

    fn set_memento(&mut self, memento: &NeuronMemento) -> Result<()> {
        if memento.weights.len() != self.inputs.len() {
            return Err(Error::MementoMismatch {
                what: "neuron weights",
                expected: self.inputs.len(),
                actual: memento.weights.len(),
            });
        }
        for (input, &weight) in izip!(&mut self.inputs, &memento.weights) {
            input.weight = weight;
        }
        self.bias = memento.bias;
        Ok(())
    }
}

/// The reduction applied by a pooling neuron.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pooling {
    Max,
    Avg,
}

/// A neuron without weights that reduces its raw input values.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolingNeuron {
    pooling: Pooling,
    values: Vec<f64>,
    /// Slots that read a real input. Window taps falling outside the grid
    /// are left out of the reduction.
    active: Vec<bool>,
    output: f64,
}

impl PoolingNeuron {
    pub fn new(pooling: Pooling, inputs: usize) -> Self {
        PoolingNeuron::masked(pooling, vec![true; inputs])
    }

    /// Creates a neuron with one slot per entry of `active` that only pools
    /// the slots marked true.
    pub fn masked(pooling: Pooling, active: Vec<bool>) -> Self {
        PoolingNeuron {
            pooling,
            values: vec![0.0; active.len()],
            active,
            output: 0.0,
        }
    }

    pub fn pooling(&self) -> Pooling {
        self.pooling
    }

    pub fn is_active(&self, id: usize) -> bool {
        self.active[id]
    }

    fn pooled(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        izip!(&self.values, &self.active)
            .enumerate()
            .filter(|&(_, (_, &active))| active)
            .map(|(id, (&value, _))| (id, value))
    }

    fn active_count(&self) -> usize {
        self.active.iter().filter(|&&active| active).count()
    }

    /// Index of the first pooled input holding the largest value.
    fn winner(&self) -> Option<usize> {
        let mut winner: Option<(usize, f64)> = None;
        for (id, value) in self.pooled() {
            match winner {
                Some((_, best)) if best >= value => {}
                _ => winner = Some((id, value)),
            }
        }
        winner.map(|(id, _)| id)
    }
}

impl Neural for PoolingNeuron {
    fn size(&self) -> usize {
        self.values.len()
    }

    fn input(&self, id: usize) -> f64 {
        self.values[id]
    }

    fn set_input(&mut self, id: usize, value: f64) {
        self.values[id] = value;
    }

    /// Returns how much input `id` contributes to the output: 1 for the
    /// winning input of a max pool (0 for the others) and `1/n` for each of
    /// the `n` pooled inputs of an average pool.
    fn weight(&self, id: usize) -> f64 {
        match self.pooling {
            Pooling::Max => {
                if self.winner() == Some(id) { 1.0 } else { 0.0 }
            }
            Pooling::Avg if self.active[id] => 1.0 / self.active_count() as f64,
            Pooling::Avg => 0.0,
        }
    }

    fn set_weight(&mut self, _: usize, _: f64) {}

    fn bias(&self) -> f64 {
        0.0
    }

    fn set_bias(&mut self, _: f64) {}

    fn output(&self) -> f64 {
        self.output
    }

    fn calc_dot_product(&self) -> f64 {
        0.0
    }

    fn calculate_output(&mut self, _: f64, _: &[f64]) -> f64 {
        self.output = match self.pooling {
            Pooling::Max => self.winner().map_or(0.0, |id| self.values[id]),
            Pooling::Avg => match self.active_count() {
                0 => 0.0,
                n => self.pooled().map(|(_, value)| value).sum::<f64>() / n as f64,
            },
        };
        self.output
    }

    fn calculate_derivate(&self) -> f64 {
        1.0
    }

    fn calculate_delta(&self, expected: f64) -> f64 {
        self.output - expected
    }

    fn is_trainable(&self) -> bool {
        false
    }

    fn memento(&self) -> NeuronMemento {
        NeuronMemento {
            bias: 0.0,
            weights: Vec::new(),
        }
    }

    fn set_memento(&mut self, _: &NeuronMemento) -> Result<()> {
        Ok(())
    }
}

/// A neuron that feeds its own latest output back as an extra input.
///
/// The feedback occupies the last input slot, so the neuron has one more
/// weight than external inputs. Its output depends on the order of previous
/// evaluations until [`Neural::reset`] clears the feedback.
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentNeuron {
    neuron: Neuron,
    /// Feedback value read by the last evaluation.
    seen: f64,
}

impl RecurrentNeuron {
    /// Initializes a recurrent neuron reading `inputs` external values.
    pub fn new<R: Rng + ?Sized>(
        activation: Activation,
        inputs: usize,
        rng: &mut R,
    ) -> Self {
        RecurrentNeuron {
            neuron: Neuron::new(activation, inputs + 1, rng),
            seen: 0.0,
        }
    }

    /// Wraps `neuron`, whose last input becomes the feedback slot.
    pub fn from_neuron(neuron: Neuron) -> Result<Self> {
        if neuron.size() == 0 {
            return Err(Error::MissingFeedback);
        }
        Ok(RecurrentNeuron { neuron, seen: 0.0 })
    }

    /// Number of inputs excluding the feedback slot.
    pub fn external_inputs(&self) -> usize {
        self.neuron.size() - 1
    }

    /// The value currently sitting in the feedback slot.
    pub fn feedback(&self) -> f64 {
        self.neuron.input(self.external_inputs())
    }
}

impl Neural for RecurrentNeuron {
    fn size(&self) -> usize {
        self.neuron.size()
    }

    fn input(&self, id: usize) -> f64 {
        self.neuron.input(id)
    }

    fn set_input(&mut self, id: usize, value: f64) {
        self.neuron.set_input(id, value);
    }

    fn last_input(&self, id: usize) -> f64 {
        if id == self.external_inputs() {
            self.seen
        } else {
            self.neuron.input(id)
        }
    }

    fn weight(&self, id: usize) -> f64 {
        self.neuron.weight(id)
    }

    fn set_weight(&mut self, id: usize, weight: f64) {
        self.neuron.set_weight(id, weight);
    }

    fn bias(&self) -> f64 {
        self.neuron.bias()
    }

    fn set_bias(&mut self, bias: f64) {
        self.neuron.set_bias(bias);
    }

    fn output(&self) -> f64 {
        self.neuron.output()
    }

    fn calc_dot_product(&self) -> f64 {
        self.neuron.calc_dot_product()
    }

    fn calculate_output(&mut self, dot_product: f64, siblings: &[f64]) -> f64 {
        let output = self.neuron.calculate_output(dot_product, siblings);
        let feedback = self.external_inputs();
        self.seen = self.neuron.input(feedback);
        self.neuron.set_input(feedback, output);
        output
    }

    fn calculate_derivate(&self) -> f64 {
        self.neuron.calculate_derivate()
    }

    fn calculate_delta(&self, expected: f64) -> f64 {
        self.neuron.calculate_delta(expected)
    }

    fn reset(&mut self) {
        let feedback = self.external_inputs();
        self.neuron.set_input(feedback, 0.0);
        self.seen = 0.0;
    }

    fn memento(&self) -> NeuronMemento {
        self.neuron.memento()
    }

    fn set_memento(&mut self, memento: &NeuronMemento) -> Result<()> {
        self.neuron.set_memento(memento)
    }
}
