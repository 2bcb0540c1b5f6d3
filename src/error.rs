//! Error types.

use std::io;

use thiserror::Error;

use crate::layers::BackendError;

/// Errors raised while building, restoring or training a network.
#[derive(Debug, Error)]
pub enum Error {
    /// A perceptron was assembled from fewer than two layers.
    #[error("a perceptron needs at least 2 layers, got {0}")]
    TooFewLayers(usize),

    /// Adjacent layers disagree on the number of values passed between them.
    #[error("layer {layer} expects {expected} inputs but receives {actual}")]
    LayerMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    /// A convolution grid cannot be partitioned with the requested shape.
    #[error("invalid grid {width}x{height} with stride {stride}")]
    InvalidGrid {
        width: usize,
        height: usize,
        stride: usize,
    },

    /// A memento does not fit the topology it is applied to.
    #[error("{what} mismatch: expected {expected}, got {actual}")]
    MementoMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A training example has the wrong number of inputs or outputs.
    #[error("example {index} has {actual} values where {expected} are expected")]
    ExampleShape {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// A recurrent neuron was given no input slot to use for its feedback.
    #[error("a recurrent neuron needs at least one input for its feedback")]
    MissingFeedback,

    /// Training was started without any example.
    #[error("the training set is empty")]
    EmptyTrainingSet,

    /// The compute backend of a layer failed.
    #[error("compute backend failed: {0}")]
    Backend(#[from] BackendError),

    /// The worker pool of an async layer could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
