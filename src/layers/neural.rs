use std::sync::Arc;

use itertools::izip;
use rand::distributions::Distribution;
use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, error};

use crate::activation::Activation;
use crate::backprop::Decorate;
use crate::error::{Error, Result};
use crate::layers::{Compute, Grid, Layer, TrainableLayer, Wiring, Workload};
use crate::memento::{LayerMemento, NeuralLayerMemento};
use crate::neuron::{self, Neural, Neuron, Pooling, PoolingNeuron, RecurrentNeuron};

/// A fixed-size collection of neurons of one kind.
#[derive(Debug)]
pub struct NeuralLayer<N> {
    neurons: Vec<N>,
    input_len: usize,
    wiring: Wiring,
    compute: Compute,
    /// Dot products of the last evaluation, one per neuron.
    dots: Vec<f64>,
}

impl NeuralLayer<Neuron> {
    /// Initializes a fully connected layer of `neurons` neurons, each
    /// reading all `inputs` values.
    pub fn dense<R: Rng + ?Sized>(
        neurons: usize,
        inputs: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let neurons = (0..neurons)
            .map(|_| Neuron::new(activation, inputs, rng))
            .collect();
        NeuralLayer::assemble(neurons, inputs, Wiring::Dense)
    }

    /// Initializes a convolution layer with one neuron per frame of `grid`.
    ///
    /// Taps reading the same input cell start with the same weight.
    pub fn convolution<R: Rng + ?Sized>(
        grid: Grid,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let distribution = neuron::initial_weights();
        let shared: Vec<f64> = (0..grid.cells()).map(|_| distribution.sample(rng)).collect();
        let neurons = (0..grid.frames())
            .map(|k| {
                let mut neuron = Neuron::new(activation, grid.window(), rng);
                for tap in 0..grid.window() {
                    if let Some(cell) = grid.canonical_tap(k, tap) {
                        neuron.set_weight(tap, shared[cell]);
                    }
                }
                neuron
            })
            .collect();
        let inputs = grid.cells();
        NeuralLayer::assemble(neurons, inputs, Wiring::Grid(Arc::new(grid)))
    }
}

impl NeuralLayer<RecurrentNeuron> {
    /// Initializes a fully connected layer whose neurons feed their outputs
    /// back to themselves.
    pub fn recurrent<R: Rng + ?Sized>(
        neurons: usize,
        inputs: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let neurons = (0..neurons)
            .map(|_| RecurrentNeuron::new(activation, inputs, rng))
            .collect();
        NeuralLayer::assemble(neurons, inputs, Wiring::Dense)
    }
}

impl NeuralLayer<PoolingNeuron> {
    /// Initializes a pooling layer with one neuron per frame of `grid`.
    pub fn pooling(grid: Grid, pooling: Pooling) -> Self {
        let neurons = (0..grid.frames())
            .map(|k| {
                let active = (0..grid.window())
                    .map(|tap| grid.canonical_tap(k, tap).is_some())
                    .collect();
                PoolingNeuron::masked(pooling, active)
            })
            .collect();
        let inputs = grid.cells();
        NeuralLayer::assemble(neurons, inputs, Wiring::Grid(Arc::new(grid)))
    }
}

impl<N: Neural> NeuralLayer<N> {
    /// Builds a layer from prepared `neurons`.
    ///
    /// Dense layers need neurons with at least `input_len` slots; grid layers
    /// need one neuron per frame, each with one slot per window tap.
    pub fn from_neurons(neurons: Vec<N>, input_len: usize, wiring: Wiring) -> Result<Self> {
        let slots = match wiring {
            Wiring::Dense => input_len,
            Wiring::Grid(ref grid) => {
                if grid.frames() != neurons.len() {
                    return Err(Error::LayerMismatch {
                        layer: 0,
                        expected: grid.frames(),
                        actual: neurons.len(),
                    });
                }
                if grid.cells() != input_len {
                    return Err(Error::LayerMismatch {
                        layer: 0,
                        expected: grid.cells(),
                        actual: input_len,
                    });
                }
                grid.window()
            }
        };
        if let Some(neuron) = neurons.iter().find(|n| n.size() < slots) {
            return Err(Error::LayerMismatch {
                layer: 0,
                expected: slots,
                actual: neuron.size(),
            });
        }
        Ok(NeuralLayer::assemble(neurons, input_len, wiring))
    }

    fn assemble(neurons: Vec<N>, input_len: usize, wiring: Wiring) -> Self {
        debug!(neurons = neurons.len(), inputs = input_len, ?wiring, "layer created");
        let dots = vec![0.0; neurons.len()];
        NeuralLayer {
            neurons,
            input_len,
            wiring,
            compute: Compute::Sync,
            dots,
        }
    }

    /// Selects where the dot products of the layer are computed.
    pub fn with_compute(mut self, compute: Compute) -> Self {
        self.compute = compute;
        self
    }

    pub fn neurons(&self) -> &[N] {
        &self.neurons
    }

    pub fn neurons_mut(&mut self) -> &mut [N] {
        &mut self.neurons
    }

    /// Number of values the layer reads.
    pub fn input_count(&self) -> usize {
        self.input_len
    }

    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    pub fn compute(&self) -> &Compute {
        &self.compute
    }

    /// Converts every neuron with `f`, keeping wiring and compute strategy.
    pub(crate) fn map_neurons<M, F>(self, f: F) -> NeuralLayer<M>
    where
        F: FnMut(N) -> M,
    {
        NeuralLayer {
            neurons: self.neurons.into_iter().map(f).collect(),
            input_len: self.input_len,
            wiring: self.wiring,
            compute: self.compute,
            dots: self.dots,
        }
    }

    /// Packs the weights of every neuron with the values picked by `value`,
    /// neuron-major.
    pub(crate) fn flatten<F>(&self, value: F) -> (Vec<f64>, Vec<f64>, usize)
    where
        F: Fn(&N, usize) -> f64,
    {
        let inputs = self.neurons.first().map_or(0, |n| n.size());
        let mut weights = Vec::with_capacity(self.neurons.len() * inputs);
        let mut values = Vec::with_capacity(self.neurons.len() * inputs);
        for neuron in &self.neurons {
            for id in 0..inputs {
                weights.push(neuron.weight(id));
                values.push(value(neuron, id));
            }
        }
        (weights, values, inputs)
    }

    fn distribute(&mut self, id: usize, value: f64) {
        match self.wiring {
            Wiring::Dense => {
                for neuron in &mut self.neurons {
                    neuron.set_input(id, value);
                }
            }
            Wiring::Grid(ref grid) => {
                for (neuron, area) in izip!(&mut self.neurons, grid.areas()) {
                    if area.does_intersect(id) {
                        neuron.set_input(area.localize(id), value);
                    }
                }
            }
        }
    }

    fn dot_products(&mut self) -> Result<()> {
        match self.compute {
            Compute::Sync => {
                self.dots.clear();
                self.dots
                    .extend(self.neurons.iter().map(|n| n.calc_dot_product()));
            }
            Compute::Pool(ref pool) => {
                let neurons = &self.neurons;
                let dots = &mut self.dots;
                pool.install(|| {
                    neurons
                        .par_iter()
                        .map(|n| n.calc_dot_product())
                        .collect_into_vec(dots)
                });
            }
            Compute::Device(ref backend) => {
                let (weights, values, inputs) = self.flatten(|n, id| n.input(id));
                let workload = Workload {
                    weights: &weights,
                    values: &values,
                    neurons: self.neurons.len(),
                    inputs,
                };
                let sums = backend.dot_products(&workload).map_err(|e| {
                    error!(error = %e, "device dot products failed");
                    Error::from(e)
                })?;
                self.dots.clear();
                self.dots
                    .extend(izip!(&self.neurons, sums).map(|(n, sum)| n.bias() + sum));
            }
        }
        Ok(())
    }

    fn outputs(&mut self) -> Result<()> {
        self.dot_products()?;
        for (neuron, &dot) in izip!(&mut self.neurons, &self.dots) {
            neuron.calculate_output(dot, &self.dots);
        }
        Ok(())
    }

    pub(crate) fn neural_memento(&self) -> NeuralLayerMemento {
        NeuralLayerMemento {
            neurons: self.neurons.iter().map(|n| n.memento()).collect(),
        }
    }

    /// Checks the shape of `memento` before touching any neuron.
    pub(crate) fn set_neural_memento(&mut self, memento: &NeuralLayerMemento) -> Result<()> {
        if memento.neurons.len() != self.neurons.len() {
            return Err(Error::MementoMismatch {
                what: "layer neurons",
                expected: self.neurons.len(),
                actual: memento.neurons.len(),
            });
        }
        for (neuron, state) in izip!(&self.neurons, &memento.neurons) {
            if neuron.is_trainable() && neuron.size() != state.weights.len() {
                return Err(Error::MementoMismatch {
                    what: "neuron weights",
                    expected: neuron.size(),
                    actual: state.weights.len(),
                });
            }
        }
        for (neuron, state) in izip!(&mut self.neurons, &memento.neurons) {
            neuron.set_memento(state)?;
        }
        Ok(())
    }
}

impl<N: Decorate> Layer for NeuralLayer<N> {
    fn size(&self) -> usize {
        self.neurons.len()
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    fn set_input(&mut self, id: usize, value: f64) {
        self.distribute(id, value);
    }

    fn calculate_outputs(&mut self) -> Result<()> {
        self.outputs()
    }

    fn output(&self, id: usize) -> f64 {
        self.neurons[id].output()
    }

    fn reset(&mut self) {
        for neuron in &mut self.neurons {
            neuron.reset();
        }
    }

    fn memento(&self) -> LayerMemento {
        LayerMemento::Neural(self.neural_memento())
    }

    fn set_memento(&mut self, memento: &LayerMemento) -> Result<()> {
        match memento {
            LayerMemento::Neural(memento) => self.set_neural_memento(memento),
            LayerMemento::Complex(complex) => Err(Error::MementoMismatch {
                what: "plain layer sub-layers",
                expected: 1,
                actual: complex.layers.len(),
            }),
        }
    }

    fn into_trainable(self: Box<Self>) -> Box<dyn TrainableLayer> {
        Box::new((*self).map_neurons(N::decorate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{calculate_outputs_into, BackendError, ComputeBackend, CpuBackend};
    use crate::memento::NeuronMemento;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn inputs(layer: &mut dyn Layer, values: &[f64]) {
        for (id, &value) in values.iter().enumerate() {
            layer.set_input(id, value);
        }
    }

    fn outputs(layer: &dyn Layer) -> Vec<f64> {
        (0..layer.size()).map(|id| layer.output(id)).collect()
    }

    #[test]
    fn dense_layer_outputs() {
        let neurons = vec![
            Neuron::with_weights(Activation::ReLU, &[1.0, 1.0], 0.0),
            Neuron::with_weights(Activation::ReLU, &[1.0, -1.0], 0.5),
        ];
        let mut layer = NeuralLayer::from_neurons(neurons, 2, Wiring::Dense).unwrap();
        inputs(&mut layer, &[2.0, 3.0]);
        layer.calculate_outputs().unwrap();
        assert_eq!(outputs(&layer), vec![5.0, 0.0]);
    }

    #[test]
    fn softmax_sees_every_sibling() {
        let neurons = vec![
            Neuron::with_weights(Activation::Softmax, &[1.0], 0.0),
            Neuron::with_weights(Activation::Softmax, &[2.0], 0.0),
            Neuron::with_weights(Activation::Softmax, &[3.0], 0.0),
        ];
        let mut layer = NeuralLayer::from_neurons(neurons, 1, Wiring::Dense).unwrap();
        inputs(&mut layer, &[1.0]);
        layer.calculate_outputs().unwrap();
        let total: f64 = outputs(&layer).iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(layer.output(2) > layer.output(1));
    }

    #[test]
    fn forwarding_into_next_layer() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut first = NeuralLayer::dense(3, 2, Activation::TanH, &mut rng);
        let mut second = NeuralLayer::dense(1, 3, Activation::Sigmoid, &mut rng);
        inputs(&mut first, &[0.5, -0.5]);
        calculate_outputs_into(&mut first, &mut second).unwrap();
        for id in 0..3 {
            assert_eq!(second.neurons()[0].input(id), first.output(id));
        }
    }

    #[test]
    fn pool_and_device_match_sync_exactly() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let sync = NeuralLayer::dense(24, 17, Activation::Sigmoid, &mut rng);
        let memento = sync.memento();
        let values: Vec<f64> = (0..17).map(|i| (i as f64 * 0.37).sin()).collect();

        let mut sync = sync;
        let mut pooled = NeuralLayer::dense(24, 17, Activation::Sigmoid, &mut rng)
            .with_compute(Compute::pool(3).unwrap());
        let mut device = NeuralLayer::dense(24, 17, Activation::Sigmoid, &mut rng)
            .with_compute(Compute::device(CpuBackend));
        for layer in [&mut sync, &mut pooled, &mut device] {
            layer.set_memento(&memento).unwrap();
            inputs(&mut *layer, &values);
            layer.calculate_outputs().unwrap();
        }
        assert_eq!(outputs(&sync), outputs(&pooled));
        assert_eq!(outputs(&sync), outputs(&device));
    }

    #[derive(Debug)]
    struct BrokenDevice;

    impl ComputeBackend for BrokenDevice {
        fn dot_products(&self, _: &Workload<'_>) -> std::result::Result<Vec<f64>, BackendError> {
            Err(BackendError::Launch("device lost".to_string()))
        }

        fn update_weights(
            &self,
            _: &Workload<'_>,
            _: &[f64],
            _: f64,
        ) -> std::result::Result<Vec<f64>, BackendError> {
            Err(BackendError::Launch("device lost".to_string()))
        }
    }

    #[test]
    fn device_failures_propagate() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut layer = NeuralLayer::dense(2, 2, Activation::TanH, &mut rng)
            .with_compute(Compute::device(BrokenDevice));
        match layer.calculate_outputs() {
            Err(Error::Backend(BackendError::Launch(_))) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn convolution_routes_inputs_to_windows() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let grid = Grid::new(5, 5, 2, 1).unwrap();
        let mut layer = NeuralLayer::convolution(grid, Activation::ReLU, &mut rng);
        assert_eq!(layer.size(), 4);
        assert_eq!(layer.input_len(), 25);
        layer.set_input(12, 7.0);
        for neuron in layer.neurons() {
            assert_eq!((0..9).filter(|&t| neuron.input(t) == 7.0).count(), 1);
        }
        layer.set_input(0, 3.0);
        assert_eq!(layer.neurons()[0].input(0), 3.0);
        assert!((0..9).all(|t| layer.neurons()[1].input(t) != 3.0));
    }

    #[test]
    fn convolution_taps_on_one_cell_share_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let grid = Grid::new(5, 5, 2, 1).unwrap();
        let layer = NeuralLayer::convolution(grid, Activation::TanH, &mut rng);
        let w = |k: usize, t: usize| layer.neurons()[k].weight(t);
        assert_eq!(w(0, 8), w(1, 6));
        assert_eq!(w(0, 8), w(2, 2));
        assert_eq!(w(0, 8), w(3, 0));
    }

    #[test]
    fn max_pooling_layer() {
        let grid = Grid::new(4, 4, 2, 0).unwrap();
        let mut layer = NeuralLayer::pooling(grid, Pooling::Max);
        assert_eq!(layer.size(), 4);
        let values: Vec<f64> = (0..16).map(|i| i as f64).collect();
        inputs(&mut layer, &values);
        layer.calculate_outputs().unwrap();
        assert_eq!(outputs(&layer), vec![5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn clipped_pooling_windows_skip_outside_taps() {
        let values = [-0.5, -1.5, -2.5, -3.5];
        let grid = Grid::new(2, 2, 2, 1).unwrap();
        let mut max = NeuralLayer::pooling(grid.clone(), Pooling::Max);
        let mut avg = NeuralLayer::pooling(grid, Pooling::Avg);
        inputs(&mut max, &values);
        inputs(&mut avg, &values);
        max.calculate_outputs().unwrap();
        avg.calculate_outputs().unwrap();
        assert_eq!(outputs(&max), vec![-0.5]);
        assert_eq!(outputs(&avg), vec![-2.0]);

        // The window is centered on cell 3; its last row and column lie
        // outside the grid.
        let neuron = &max.neurons()[0];
        assert_eq!(neuron.weight(0), 1.0);
        assert_eq!(neuron.weight(8), 0.0);
        assert_eq!(avg.neurons()[0].weight(4), 0.25);
        assert_eq!(avg.neurons()[0].weight(8), 0.0);
    }

    #[test]
    fn memento_round_trip_and_mismatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut layer = NeuralLayer::dense(3, 2, Activation::TanH, &mut rng);
        let memento = layer.memento();
        layer.set_memento(&memento).unwrap();
        assert_eq!(layer.memento(), memento);

        let mut short = layer.neural_memento();
        short.neurons[2] = NeuronMemento {
            bias: 1.0,
            weights: vec![1.0],
        };
        short.neurons[0].bias = 42.0;
        assert!(layer.set_memento(&short.into()).is_err());
        assert_eq!(layer.memento(), memento);
    }

    #[test]
    fn mismatched_neurons_are_rejected() {
        let neurons = vec![Neuron::with_weights(Activation::TanH, &[1.0], 0.0)];
        assert!(NeuralLayer::from_neurons(neurons, 2, Wiring::Dense).is_err());
    }
}
