//! Back-propagation over whole layers.

use itertools::izip;
use rayon::prelude::*;
use tracing::error;

use crate::backprop::{Decorate, Trainable};
use crate::error::{Error, Result};
use crate::layers::{
    ComplexLayer, Compute, Grid, Layer, NeuralLayer, TrainableLayer, Wiring, Workload,
};

/// Moves every shared convolution weight by the gradients of all the taps
/// reading the same input cell, then writes the result back to each tap.
fn update_shared<T: Trainable>(neurons: &mut [T], grid: &Grid, learning_rate: f64) {
    let mut slots: Vec<Option<f64>> = vec![None; grid.cells()];
    for (k, neuron) in neurons.iter().enumerate() {
        for tap in 0..grid.window() {
            if let Some(cell) = grid.canonical_tap(k, tap) {
                let slot = slots[cell].get_or_insert(neuron.weight(tap));
                *slot -= learning_rate * neuron.last_input(tap) * neuron.delta();
            }
        }
    }
    for (k, neuron) in neurons.iter_mut().enumerate() {
        for tap in 0..grid.window() {
            let weight = match grid.canonical_tap(k, tap).and_then(|cell| slots[cell]) {
                Some(shared) => shared,
                None => {
                    neuron.weight(tap) - learning_rate * neuron.last_input(tap) * neuron.delta()
                }
            };
            neuron.set_weight(tap, weight);
        }
        let bias = neuron.bias() - learning_rate * neuron.delta();
        neuron.set_bias(bias);
    }
}

fn update_on_device<T: Trainable + Decorate>(
    layer: &mut NeuralLayer<T>,
    learning_rate: f64,
) -> Result<()> {
    let backend = match layer.compute() {
        Compute::Device(backend) => backend.clone(),
        _ => return Ok(()),
    };
    let (weights, values, inputs) = layer.flatten(|n, id| n.last_input(id));
    let deltas: Vec<f64> = layer.neurons().iter().map(|n| n.delta()).collect();
    let workload = Workload {
        weights: &weights,
        values: &values,
        neurons: deltas.len(),
        inputs,
    };
    let updated = backend
        .update_weights(&workload, &deltas, learning_rate)
        .map_err(|e| {
            error!(error = %e, "device weight update failed");
            Error::from(e)
        })?;
    if updated.len() != weights.len() {
        return Err(Error::MementoMismatch {
            what: "device weights",
            expected: weights.len(),
            actual: updated.len(),
        });
    }
    for (neuron, weights) in izip!(layer.neurons_mut(), updated.chunks(inputs.max(1))) {
        for (id, &weight) in weights.iter().enumerate() {
            neuron.set_weight(id, weight);
        }
        let bias = neuron.bias() - learning_rate * neuron.delta();
        neuron.set_bias(bias);
    }
    Ok(())
}

impl<T: Trainable + Decorate> TrainableLayer for NeuralLayer<T> {
    fn delta(&self, id: usize) -> f64 {
        self.neurons()[id].delta()
    }

    fn set_delta(&mut self, id: usize, delta: f64) {
        self.neurons_mut()[id].set_delta(delta);
    }

    fn calculate_derivate(&self, id: usize) -> f64 {
        self.neurons()[id].calculate_derivate()
    }

    fn calculate_delta(&self, id: usize, expected: f64) -> f64 {
        self.neurons()[id].calculate_delta(expected)
    }

    fn back_weight(&self, neuron: usize, input: usize) -> Option<f64> {
        let target = &self.neurons()[neuron];
        match self.wiring() {
            Wiring::Dense if input < target.size() => Some(target.weight(input)),
            Wiring::Dense => None,
            Wiring::Grid(grid) => {
                let area = grid.area(neuron);
                if area.does_intersect(input) {
                    Some(target.weight(area.localize(input)))
                } else {
                    None
                }
            }
        }
    }

    fn bias(&self, neuron: usize) -> f64 {
        self.neurons()[neuron].bias()
    }

    fn update_weights(&mut self, learning_rate: f64) -> Result<()> {
        if !self.neurons().iter().any(|n| n.is_trainable()) {
            return Ok(());
        }
        match (self.wiring().clone(), self.compute().clone()) {
            (Wiring::Grid(grid), _) => update_shared(self.neurons_mut(), &grid, learning_rate),
            (Wiring::Dense, Compute::Device(_)) => update_on_device(self, learning_rate)?,
            (Wiring::Dense, Compute::Pool(pool)) => {
                let neurons = self.neurons_mut();
                pool.install(|| {
                    neurons
                        .par_iter_mut()
                        .for_each(|n| n.update_weights(learning_rate))
                });
            }
            (Wiring::Dense, Compute::Sync) => {
                for neuron in self.neurons_mut() {
                    neuron.update_weights(learning_rate);
                }
            }
        }
        Ok(())
    }

    fn into_plain(self: Box<Self>) -> Box<dyn Layer> {
        Box::new((*self).map_neurons(T::into_inner))
    }
}

impl<T: Trainable + Decorate> TrainableLayer for ComplexLayer<T> {
    fn delta(&self, id: usize) -> f64 {
        let (map, id) = self.locate(id);
        self.layers()[map].delta(id)
    }

    fn set_delta(&mut self, id: usize, delta: f64) {
        let (map, id) = self.locate(id);
        self.layers_mut()[map].set_delta(id, delta);
    }

    fn calculate_derivate(&self, id: usize) -> f64 {
        let (map, id) = self.locate(id);
        self.layers()[map].calculate_derivate(id)
    }

    fn calculate_delta(&self, id: usize, expected: f64) -> f64 {
        let (map, id) = self.locate(id);
        self.layers()[map].calculate_delta(id, expected)
    }

    fn back_weight(&self, neuron: usize, input: usize) -> Option<f64> {
        let (map, neuron) = self.locate(neuron);
        self.layers()[map].back_weight(neuron, input)
    }

    fn bias(&self, neuron: usize) -> f64 {
        let (map, neuron) = self.locate(neuron);
        TrainableLayer::bias(&self.layers()[map], neuron)
    }

    fn update_weights(&mut self, learning_rate: f64) -> Result<()> {
        for layer in self.layers_mut() {
            TrainableLayer::update_weights(layer, learning_rate)?;
        }
        Ok(())
    }

    fn into_plain(self: Box<Self>) -> Box<dyn Layer> {
        Box::new((*self).map_layers(|l| l.map_neurons(T::into_inner)))
    }
}
