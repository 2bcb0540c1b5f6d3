//! Feed-forward neural networks trained by back-propagation.
//!
//! Networks are stacks of layers built with a
//! [`PerceptronBuilder`](perceptron::PerceptronBuilder). Layers can be dense,
//! recurrent, convolutional (with shared weights) or pooling, and each layer
//! computes its dot products on the calling thread, on a worker pool or on a
//! pluggable device backend. Training wraps every neuron with its delta and
//! runs [`BepAlgorithm`](backprop::BepAlgorithm) or
//! [`BpttAlgorithm`](backprop::BpttAlgorithm). A
//! [`KohonenMap`](kohonen::KohonenMap) covers unsupervised clustering.

#[macro_use]
extern crate serde_derive;

pub mod activation;
pub mod backprop;
pub mod config;
pub mod error;
pub mod kohonen;
pub mod layers;
pub mod loss;
pub mod memento;
pub mod neuron;
pub mod perceptron;
pub mod trainer;

pub use crate::error::{Error, Result};
pub use crate::perceptron::{Perceptron, PerceptronBuilder};
