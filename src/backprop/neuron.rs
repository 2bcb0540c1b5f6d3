//! The delta-carrying neuron decorator.

use crate::error::Result;
use crate::memento::NeuronMemento;
use crate::neuron::{Neural, Neuron, PoolingNeuron, RecurrentNeuron};

/// A neuron extended with the error signal of the current training step.
///
/// Forward evaluation is delegated untouched to the wrapped neuron; the
/// decorator only adds the `delta` consumed by the weight update.
#[derive(Clone, Debug, PartialEq)]
pub struct BpNeuron<N> {
    neuron: N,
    delta: f64,
}

impl<N: Neural> BpNeuron<N> {
    pub fn new(neuron: N) -> Self {
        BpNeuron { neuron, delta: 0.0 }
    }

    pub fn inner(&self) -> &N {
        &self.neuron
    }
}

/// A neuron able to take part in back-propagation.
pub trait Trainable: Neural {
    /// The undecorated neuron kind.
    type Inner: Decorate;

    fn delta(&self) -> f64;

    fn set_delta(&mut self, delta: f64);

    /// Applies one gradient step using the current delta.
    ///
    /// Every weight moves by `-learning_rate * input * delta`, the bias by
    /// `-learning_rate * delta`.
    fn update_weights(&mut self, learning_rate: f64);

    fn into_inner(self) -> Self::Inner;
}

/// Conversion of a neuron kind into its trainable form.
///
/// Trainable neurons decorate to themselves, so wrapping is never nested.
pub trait Decorate: Neural + Sized {
    type Trained: Trainable + Decorate;

    fn decorate(self) -> Self::Trained;
}

impl Decorate for Neuron {
    type Trained = BpNeuron<Neuron>;

    fn decorate(self) -> Self::Trained {
        BpNeuron::new(self)
    }
}

impl Decorate for PoolingNeuron {
    type Trained = BpNeuron<PoolingNeuron>;

    fn decorate(self) -> Self::Trained {
        BpNeuron::new(self)
    }
}

impl Decorate for RecurrentNeuron {
    type Trained = BpNeuron<RecurrentNeuron>;

    fn decorate(self) -> Self::Trained {
        BpNeuron::new(self)
    }
}

impl<N: Decorate> Decorate for BpNeuron<N> {
    type Trained = Self;

    fn decorate(self) -> Self {
        self
    }
}

impl<N: Decorate> Trainable for BpNeuron<N> {
    type Inner = N;

    fn delta(&self) -> f64 {
        self.delta
    }

    fn set_delta(&mut self, delta: f64) {
        self.delta = delta;
    }

    fn update_weights(&mut self, learning_rate: f64) {
        if !self.neuron.is_trainable() {
            return;
        }
        for id in 0..self.neuron.size() {
            let weight = self.neuron.weight(id)
                - learning_rate * self.neuron.last_input(id) * self.delta;
            self.neuron.set_weight(id, weight);
        }
        let bias = self.neuron.bias() - learning_rate * self.delta;
        self.neuron.set_bias(bias);
    }

    fn into_inner(self) -> N {
        self.neuron
    }
}

impl<N: Neural> Neural for BpNeuron<N> {
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
        self.neuron.last_input(id)
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
        self.neuron.calculate_output(dot_product, siblings)
    }

    fn calculate_derivate(&self) -> f64 {
        self.neuron.calculate_derivate()
    }

    fn calculate_delta(&self, expected: f64) -> f64 {
        self.neuron.calculate_delta(expected)
    }

    fn is_trainable(&self) -> bool {
        self.neuron.is_trainable()
    }

    fn reset(&mut self) {
        self.neuron.reset();
    }

    fn memento(&self) -> NeuronMemento {
        self.neuron.memento()
    }

    fn set_memento(&mut self, memento: &NeuronMemento) -> Result<()> {
        self.neuron.set_memento(memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::neuron::Pooling;

    #[test]
    fn decoration_keeps_forward_behavior() {
        let mut plain = Neuron::with_weights(Activation::Sigmoid, &[0.3, -0.7], 0.1);
        plain.set_input(0, 1.0);
        plain.set_input(1, 2.0);
        let mut trained = plain.clone().decorate();

        let dot = plain.calc_dot_product();
        assert_eq!(trained.calc_dot_product(), dot);
        assert_eq!(
            trained.calculate_output(dot, &[dot]),
            plain.calculate_output(dot, &[dot])
        );
        assert_eq!(trained.delta(), 0.0);
    }

    #[test]
    fn decorating_twice_does_not_nest() {
        let neuron = Neuron::with_weights(Activation::TanH, &[1.0], 0.0);
        let once = neuron.decorate();
        let mut twice = once.clone().decorate();
        twice.set_delta(0.5);
        assert_eq!(twice.delta(), 0.5);
        assert_eq!(twice.into_inner().weight(0), 1.0);
    }

    #[test]
    fn gradient_step() {
        let mut neuron = Neuron::with_weights(Activation::TanH, &[0.5, 0.5], 0.5).decorate();
        neuron.set_input(0, 1.0);
        neuron.set_input(1, -2.0);
        neuron.set_delta(0.25);
        neuron.update_weights(2.0);
        assert_eq!(neuron.weight(0), 0.0);
        assert_eq!(neuron.weight(1), 1.5);
        assert_eq!(neuron.bias(), 0.0);
    }

    #[test]
    fn pooling_is_left_alone() {
        let mut neuron = PoolingNeuron::new(Pooling::Avg, 2).decorate();
        neuron.set_delta(1.0);
        neuron.update_weights(1.0);
        assert_eq!(neuron.bias(), 0.0);
        assert_eq!(neuron.weight(0), 0.5);
    }
}
