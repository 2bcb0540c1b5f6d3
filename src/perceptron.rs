//! Stacks of layers evaluated front to back.
//!
//! # Example
//!
//! ```
//! # use bpnet::activation::Activation;
//! # use bpnet::perceptron::PerceptronBuilder;
//! # use rand::SeedableRng;
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
//! let mut network = PerceptronBuilder::new(2)
//!     .dense(3, Activation::TanH)
//!     .dense(1, Activation::Sigmoid)
//!     .build(&mut rng)
//!     .unwrap();
//!
//! let output = network.run(&[0.0, 1.0]).unwrap();
//! assert_eq!(output.len(), 1);
//! assert!(output[0] > 0.0 && output[0] < 1.0);
//! ```

use rand::Rng;
use tracing::debug;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::layers::{
    calculate_outputs_into, ComplexLayer, Compute, Grid, Layer, NeuralLayer, TrainableLayer,
};
use crate::memento::PerceptronMemento;
use crate::neuron::Pooling;

/// A feed-forward network of at least two layers.
///
/// The first layer reads the network input and the last one produces the
/// network output. The neuron count of every layer equals the input count of
/// the following one.
#[derive(Debug)]
pub struct Perceptron<L: ?Sized + Layer = dyn Layer> {
    layers: Vec<Box<L>>,
}

impl<L: ?Sized + Layer> Perceptron<L> {
    /// Checks that `layers` form a valid stack.
    fn from_layers(layers: Vec<Box<L>>) -> Result<Self> {
        if layers.len() < 2 {
            return Err(Error::TooFewLayers(layers.len()));
        }
        for (id, pair) in layers.windows(2).enumerate() {
            if pair[0].size() != pair[1].input_len() {
                return Err(Error::LayerMismatch {
                    layer: id + 1,
                    expected: pair[1].input_len(),
                    actual: pair[0].size(),
                });
            }
        }
        Ok(Perceptron { layers })
    }

    /// Number of network inputs.
    pub fn input_len(&self) -> usize {
        self.layers[0].input_len()
    }

    /// Number of network outputs.
    pub fn output_len(&self) -> usize {
        self.layers[self.layers.len() - 1].size()
    }

    pub fn layers(&self) -> &[Box<L>] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Box<L>] {
        &mut self.layers
    }

    /// Feeds `input` through the network and writes the output layer into
    /// `output`.
    ///
    /// Outputs only depend on the current weights and `input`, unless the
    /// network holds recurrent layers.
    pub fn calculate(&mut self, input: &[f64], output: &mut [f64]) -> Result<()> {
        if input.len() != self.input_len() {
            return Err(Error::LayerMismatch {
                layer: 0,
                expected: self.input_len(),
                actual: input.len(),
            });
        }
        if output.len() != self.output_len() {
            return Err(Error::LayerMismatch {
                layer: self.layers.len(),
                expected: self.output_len(),
                actual: output.len(),
            });
        }
        for (id, &value) in input.iter().enumerate() {
            self.layers[0].set_input(id, value);
        }
        for id in 1..self.layers.len() {
            let (head, tail) = self.layers.split_at_mut(id);
            calculate_outputs_into(&mut *head[id - 1], &mut *tail[0])?;
        }
        let count = self.layers.len();
        let last = &mut self.layers[count - 1];
        last.calculate_outputs()?;
        for (id, value) in output.iter_mut().enumerate() {
            *value = last.output(id);
        }
        Ok(())
    }

    /// Feeds `input` through the network and returns the output layer.
    pub fn run(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let mut output = vec![0.0; self.output_len()];
        self.calculate(input, &mut output)?;
        Ok(output)
    }

    /// Clears the state recurrent layers carry between evaluations.
    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }

    pub fn memento(&self) -> PerceptronMemento {
        PerceptronMemento {
            layers: self.layers.iter().map(|l| l.memento()).collect(),
        }
    }

    /// Restores every layer from `memento`.
    ///
    /// On a shape mismatch the network is left exactly as it was.
    pub fn set_memento(&mut self, memento: &PerceptronMemento) -> Result<()> {
        if memento.layers.len() != self.layers.len() {
            return Err(Error::MementoMismatch {
                what: "perceptron layers",
                expected: self.layers.len(),
                actual: memento.layers.len(),
            });
        }
        let backup = self.memento();
        for id in 0..self.layers.len() {
            if let Err(e) = self.layers[id].set_memento(&memento.layers[id]) {
                debug!(layer = id, error = %e, "memento rejected, restoring");
                for (layer, state) in self.layers.iter_mut().zip(&backup.layers).take(id) {
                    layer.set_memento(state)?;
                }
                return Err(e);
            }
        }
        debug!(layers = self.layers.len(), "memento applied");
        Ok(())
    }
}

impl Perceptron {
    /// Assembles a network from `layers`, which must hold at least two
    /// layers of matching sizes.
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self> {
        Perceptron::from_layers(layers)
    }

    /// Decorates every neuron for back-propagation.
    pub fn into_trainable(self) -> Perceptron<dyn TrainableLayer> {
        Perceptron {
            layers: self.layers.into_iter().map(|l| l.into_trainable()).collect(),
        }
    }
}

impl Perceptron<dyn TrainableLayer> {
    /// Strips the back-propagation decorators.
    pub fn into_plain(self) -> Perceptron {
        Perceptron {
            layers: self.layers.into_iter().map(|l| l.into_plain()).collect(),
        }
    }
}

/// Geometry of a grid layer's input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub margin: usize,
}

impl GridShape {
    fn grid(&self) -> Result<Grid> {
        Grid::new(self.width, self.height, self.stride, self.margin)
    }
}

/// One layer of a [`PerceptronBuilder`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LayerSpec {
    Dense {
        neurons: usize,
        activation: Activation,
    },
    Recurrent {
        neurons: usize,
        activation: Activation,
    },
    /// One neuron per frame and feature map; weights are shared within a map.
    Convolution {
        shape: GridShape,
        maps: usize,
        activation: Activation,
    },
    Pooling {
        shape: GridShape,
        pooling: Pooling,
    },
}

/// A builder for new perceptrons.
///
/// Layers are declared by their neuron count only; the input count of every
/// layer is bound to the size of the layer before it when the network is
/// built.
#[derive(Clone, Debug)]
pub struct PerceptronBuilder {
    inputs: usize,
    layers: Vec<LayerSpec>,
    compute: Compute,
}

impl PerceptronBuilder {
    /// Starts a network reading `inputs` values.
    pub fn new(inputs: usize) -> Self {
        PerceptronBuilder {
            inputs,
            layers: Vec::new(),
            compute: Compute::Sync,
        }
    }

    pub fn layer(mut self, spec: LayerSpec) -> Self {
        self.layers.push(spec);
        self
    }

    /// Appends a fully connected layer.
    pub fn dense(self, neurons: usize, activation: Activation) -> Self {
        self.layer(LayerSpec::Dense {
            neurons,
            activation,
        })
    }

    /// Appends a fully connected layer whose neurons see their own previous
    /// output.
    pub fn recurrent(self, neurons: usize, activation: Activation) -> Self {
        self.layer(LayerSpec::Recurrent {
            neurons,
            activation,
        })
    }

    /// Appends a convolution layer with `maps` feature maps over a grid of
    /// `shape`.
    pub fn convolution(self, shape: GridShape, maps: usize, activation: Activation) -> Self {
        self.layer(LayerSpec::Convolution {
            shape,
            maps,
            activation,
        })
    }

    pub fn pooling(self, shape: GridShape, pooling: Pooling) -> Self {
        self.layer(LayerSpec::Pooling { shape, pooling })
    }

    /// Selects where the dot products of every layer are computed.
    pub fn computed_by(mut self, compute: Compute) -> Self {
        self.compute = compute;
        self
    }

    /// Initializes every layer with random weights drawn from `rng`.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Perceptron> {
        let mut inputs = self.inputs;
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(self.layers.len());
        for (id, spec) in self.layers.iter().enumerate() {
            let layer = self.build_layer(spec, inputs, rng).map_err(|e| match e {
                Error::LayerMismatch {
                    expected, actual, ..
                } => Error::LayerMismatch {
                    layer: id,
                    expected,
                    actual,
                },
                e => e,
            })?;
            inputs = layer.size();
            layers.push(layer);
        }
        debug!(inputs = self.inputs, layers = layers.len(), "perceptron built");
        Perceptron::new(layers)
    }

    fn build_layer<R: Rng + ?Sized>(
        &self,
        spec: &LayerSpec,
        inputs: usize,
        rng: &mut R,
    ) -> Result<Box<dyn Layer>> {
        let compute = self.compute.clone();
        let check = |shape: &GridShape| {
            if shape.width * shape.height != inputs {
                return Err(Error::LayerMismatch {
                    layer: 0,
                    expected: shape.width * shape.height,
                    actual: inputs,
                });
            }
            shape.grid()
        };
        let layer: Box<dyn Layer> = match *spec {
            LayerSpec::Dense {
                neurons,
                activation,
            } => Box::new(
                NeuralLayer::dense(neurons, inputs, activation, rng).with_compute(compute),
            ),
            LayerSpec::Recurrent {
                neurons,
                activation,
            } => Box::new(
                NeuralLayer::recurrent(neurons, inputs, activation, rng).with_compute(compute),
            ),
            LayerSpec::Convolution {
                ref shape,
                maps,
                activation,
            } => {
                let grid = check(shape)?;
                if maps <= 1 {
                    Box::new(
                        NeuralLayer::convolution(grid, activation, rng).with_compute(compute),
                    )
                } else {
                    let layers = (0..maps)
                        .map(|_| {
                            NeuralLayer::convolution(grid.clone(), activation, &mut *rng)
                                .with_compute(compute.clone())
                        })
                        .collect();
                    Box::new(ComplexLayer::new(layers)?)
                }
            }
            LayerSpec::Pooling { ref shape, pooling } => {
                Box::new(NeuralLayer::pooling(check(shape)?, pooling))
            }
        };
        Ok(layer)
    }
}
