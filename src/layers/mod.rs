//! Layers of neurons.
//!
//! Every layer kind is a [`NeuralLayer`] over one neuron kind, combined with
//! a [`Wiring`] that decides which neuron sees which input and a [`Compute`]
//! strategy that decides where dot products are evaluated. A [`ComplexLayer`]
//! stacks several of them side by side over the same input.

use std::fmt;
use std::sync::Arc;

use rayon::ThreadPool;

use crate::error::Result;
use crate::memento::LayerMemento;

pub mod backend;
pub mod complex;
pub mod grid;
pub mod neural;

pub use self::backend::{BackendError, ComputeBackend, CpuBackend, Workload};
pub use self::complex::ComplexLayer;
pub use self::grid::{Area, Grid};
pub use self::neural::NeuralLayer;

/// The forward contract of a layer.
pub trait Layer: fmt::Debug + Send + Sync {
    /// Number of neurons, which is also the number of outputs.
    fn size(&self) -> usize;

    /// Number of values the layer reads.
    fn input_len(&self) -> usize;

    /// Delivers the global input `id` to every neuron connected to it.
    fn set_input(&mut self, id: usize, value: f64);

    /// Computes every dot product, then every output.
    fn calculate_outputs(&mut self) -> Result<()>;

    fn output(&self, id: usize) -> f64;

    /// Clears state carried over between evaluations.
    fn reset(&mut self);

    fn memento(&self) -> LayerMemento;

    /// Restores weights and biases, failing without side effects when the
    /// memento does not fit the layer.
    fn set_memento(&mut self, memento: &LayerMemento) -> Result<()>;

    /// Wraps every neuron with a delta-carrying decorator.
    fn into_trainable(self: Box<Self>) -> Box<dyn TrainableLayer>;
}

/// A layer whose neurons carry back-propagation deltas.
pub trait TrainableLayer: Layer {
    fn delta(&self, id: usize) -> f64;

    fn set_delta(&mut self, id: usize, delta: f64);

    /// Activation derivative of neuron `id` at its cached output.
    fn calculate_derivate(&self, id: usize) -> f64;

    /// Error signal of neuron `id` against its `expected` output.
    fn calculate_delta(&self, id: usize, expected: f64) -> f64;

    /// The weight linking the global input `input` to `neuron`, or `None`
    /// when the neuron does not read that input.
    fn back_weight(&self, neuron: usize, input: usize) -> Option<f64>;

    fn bias(&self, neuron: usize) -> f64;

    /// Applies one gradient step to every weight and bias of the layer.
    fn update_weights(&mut self, learning_rate: f64) -> Result<()>;

    /// Strips the delta decorators.
    fn into_plain(self: Box<Self>) -> Box<dyn Layer>;
}

/// Computes the outputs of `layer` and pushes output `i` into input `i` of
/// `next`.
pub fn calculate_outputs_into<L, M>(layer: &mut L, next: &mut M) -> Result<()>
where
    L: Layer + ?Sized,
    M: Layer + ?Sized,
{
    layer.calculate_outputs()?;
    for id in 0..layer.size() {
        next.set_input(id, layer.output(id));
    }
    Ok(())
}

/// Where the dot products of a layer are evaluated.
#[derive(Clone)]
pub enum Compute {
    /// On the calling thread.
    Sync,
    /// One task per neuron on a shared worker pool, joined before outputs
    /// are computed.
    Pool(Arc<ThreadPool>),
    /// On a device backend, one round trip per evaluation.
    Device(Arc<dyn ComputeBackend>),
}

impl Compute {
    /// Builds a worker pool of `threads` threads (0 picks the number of
    /// cores).
    pub fn pool(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bpnet-worker-{}", i))
            .build()?;
        Ok(Compute::Pool(Arc::new(pool)))
    }

    pub fn device<B: ComputeBackend + 'static>(backend: B) -> Self {
        Compute::Device(Arc::new(backend))
    }
}

impl Default for Compute {
    fn default() -> Self {
        Compute::Sync
    }
}

impl fmt::Debug for Compute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Compute::Sync => write!(f, "Sync"),
            Compute::Pool(pool) => {
                write!(f, "Pool({} threads)", pool.current_num_threads())
            }
            Compute::Device(backend) => f.debug_tuple("Device").field(backend).finish(),
        }
    }
}

/// Which inputs each neuron of a layer reads.
#[derive(Clone, Debug)]
pub enum Wiring {
    /// Every neuron reads every input at the same index.
    Dense,
    /// Each neuron reads the window of its frame on the grid.
    Grid(Arc<Grid>),
}
