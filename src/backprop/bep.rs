//! Stochastic back-propagation over a set of labelled examples.
//!
//! # Example
//!
//! Let's train a network to compute the XOR function:
//!
//! ```
//! # use bpnet::activation::Activation;
//! # use bpnet::backprop::BepAlgorithm;
//! # use bpnet::perceptron::PerceptronBuilder;
//! # use bpnet::trainer::{Logging, StopCondition};
//! # use rand::SeedableRng;
//! let examples = [([0.0, 0.0], [0.0]),
//!                 ([0.0, 1.0], [1.0]),
//!                 ([1.0, 0.0], [1.0]),
//!                 ([1.0, 1.0], [0.0])];
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(17);
//! let network = PerceptronBuilder::new(2)
//!     .dense(8, Activation::TanH)
//!     .dense(1, Activation::Sigmoid)
//!     .build(&mut rng)
//!     .unwrap();
//!
//! let mut network = BepAlgorithm::new()
//!     .learning_rate(0.09)
//!     .logging(Logging::Silent)
//!     .stop_condition(StopCondition::ErrorThreshold(0.01))
//!     .seed(3)
//!     .train(network, &examples[..])
//!     .unwrap();
//!
//! let classify = |out: Vec<f64>| out[0] > 0.5;
//! assert_eq!(classify(network.run(&[0.0, 0.0]).unwrap()), false);
//! assert_eq!(classify(network.run(&[0.0, 1.0]).unwrap()), true);
//! assert_eq!(classify(network.run(&[1.0, 0.0]).unwrap()), true);
//! assert_eq!(classify(network.run(&[1.0, 1.0]).unwrap()), false);
//! ```

use std::fmt;

use rand::seq::SliceRandom;
use tracing::trace;

use crate::backprop::{apply_updates, hidden_deltas, output_deltas};
use crate::config::TrainingConfig;
use crate::error::{Error, Result};
use crate::layers::TrainableLayer;
use crate::loss::ErrorCalculator;
use crate::perceptron::Perceptron;
use crate::trainer::{
    self, Continuation, Logging, Momentum, Schedule, StopCondition, TrainingReport,
};

/// The parameters of one training step.
pub(crate) struct Settings {
    pub learning_rate: f64,
    pub momentum: Momentum,
    pub error: ErrorCalculator,
    pub hidden_delta_bias: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            learning_rate: 0.1,
            momentum: trainer::no_momentum(),
            error: ErrorCalculator::default(),
            hidden_delta_bias: true,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Settings")
            .field("learning_rate", &self.learning_rate)
            .field("error", &self.error)
            .field("hidden_delta_bias", &self.hidden_delta_bias)
            .finish()
    }
}

/// Checks every example against the input and output sizes of `perceptron`.
pub(crate) fn validate<I, O>(
    perceptron: &Perceptron<dyn TrainableLayer>,
    examples: &[(I, O)],
) -> Result<()>
where
    I: AsRef<[f64]>,
    O: AsRef<[f64]>,
{
    if examples.is_empty() {
        return Err(Error::EmptyTrainingSet);
    }
    for (index, (input, expected)) in examples.iter().enumerate() {
        for (expected_len, actual) in [
            (perceptron.input_len(), input.as_ref().len()),
            (perceptron.output_len(), expected.as_ref().len()),
        ] {
            if expected_len != actual {
                return Err(Error::ExampleShape {
                    index,
                    expected: expected_len,
                    actual,
                });
            }
        }
    }
    Ok(())
}

/// A builder for back-propagation training runs.
#[derive(Debug)]
pub struct BepAlgorithm {
    pub(crate) settings: Settings,
    pub(crate) schedule: Schedule,
}

impl Default for BepAlgorithm {
    fn default() -> Self {
        BepAlgorithm::new()
    }
}

impl BepAlgorithm {
    /// Creates a new training run.
    ///
    /// The run is initialized with some default values. These defaults are:
    ///
    /// * A learning rate of 0.1.
    /// * No momentum.
    /// * The squared error.
    /// * Hidden deltas include the bias of the next layer.
    /// * Stops after 1000 epochs.
    /// * Logs on training completion.
    /// * Shuffles with an unseeded RNG.
    pub fn new() -> Self {
        BepAlgorithm {
            settings: Settings::default(),
            schedule: Schedule::default(),
        }
    }

    /// Configures a run from the fields set in `config`.
    pub fn from_config(config: &TrainingConfig) -> Self {
        let mut bep = BepAlgorithm::new();
        if let Some(rate) = config.learning_rate {
            bep = bep.learning_rate(rate);
        }
        if let Some(error) = config.error {
            bep = bep.error_calculator(error);
        }
        if let Some(bias) = config.hidden_delta_bias {
            bep = bep.hidden_delta_bias(bias);
        }
        if let Some(seed) = config.seed {
            bep = bep.seed(seed);
        }
        if let Some(every) = config.log_every {
            bep = bep.logging(Logging::Iterations(every));
        }
        match (config.max_epochs, config.error_threshold) {
            (Some(epochs), Some(threshold)) => bep.should_continue(move |epoch, error| {
                epoch < epochs && !(error < threshold)
            }),
            (Some(epochs), None) => bep.stop_condition(StopCondition::Iterations(epochs)),
            (None, Some(threshold)) => {
                bep.stop_condition(StopCondition::ErrorThreshold(threshold))
            }
            (None, None) => bep,
        }
    }

    /// Sets the learning rate to use during gradient descent.
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.settings.learning_rate = rate;
        self
    }

    /// Sets the function blending `(old, new)` deltas.
    pub fn momentum<F>(mut self, momentum: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        self.settings.momentum = Box::new(momentum);
        self
    }

    /// Sets the error reported for every example.
    pub fn error_calculator(mut self, error: ErrorCalculator) -> Self {
        self.settings.error = error;
        self
    }

    /// Selects whether hidden deltas include the bias of the next layer.
    pub fn hidden_delta_bias(mut self, include: bool) -> Self {
        self.settings.hidden_delta_bias = include;
        self
    }

    /// Sets the type of logging to be emitted during training.
    pub fn logging(mut self, logging: Logging) -> Self {
        self.schedule.logging = logging;
        self
    }

    /// Sets the condition to finish training.
    pub fn stop_condition<C>(mut self, condition: C) -> Self
    where
        C: Into<StopCondition>,
    {
        self.schedule.continuation = Continuation::Stop(condition.into());
        self
    }

    /// Sets a predicate called as `predicate(epoch, error)` after every
    /// epoch; training goes on while it returns true.
    ///
    /// A predicate that always returns true trains forever.
    pub fn should_continue<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(usize, f64) -> bool + Send + 'static,
    {
        self.schedule.continuation = Continuation::Predicate(Box::new(predicate));
        self
    }

    /// Makes the example order reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.schedule.seed = Some(seed);
        self
    }

    /// Runs one training step on a single example and returns its error.
    ///
    /// The error is measured on the outputs of the forward pass, before the
    /// weights move.
    pub fn execute_training_step(
        &self,
        perceptron: &mut Perceptron<dyn TrainableLayer>,
        input: &[f64],
        expected: &[f64],
    ) -> Result<f64> {
        training_step(&self.settings, perceptron, input, expected)
    }

    /// Trains `perceptron` on `examples` until the stop condition holds.
    ///
    /// Every epoch visits each example once in a shuffled order. The epoch
    /// error is the mean of the example errors.
    pub fn calculate_weights<I, O>(
        &mut self,
        perceptron: &mut Perceptron<dyn TrainableLayer>,
        examples: &[(I, O)],
    ) -> Result<TrainingReport>
    where
        I: AsRef<[f64]>,
        O: AsRef<[f64]>,
    {
        validate(perceptron, examples)?;
        let mut order: Vec<usize> = (0..examples.len()).collect();
        let BepAlgorithm {
            ref settings,
            ref mut schedule,
        } = *self;
        schedule.run(|rng| {
            order.shuffle(rng);
            let mut error = 0.0;
            for &id in &order {
                let (ref input, ref expected) = examples[id];
                error += training_step(settings, perceptron, input.as_ref(), expected.as_ref())?;
            }
            Ok(error / examples.len() as f64)
        })
    }

    /// Trains a network using the provided labelled data.
    ///
    /// The provided `examples` should be a list of labelled data, where each
    /// element takes the form `(network input, expected output)`.
    ///
    /// Returns:
    ///   The trained network, or an error if an example does not fit the
    ///   network or a compute backend failed.
    pub fn train<I, O>(mut self, perceptron: Perceptron, examples: &[(I, O)]) -> Result<Perceptron>
    where
        I: AsRef<[f64]>,
        O: AsRef<[f64]>,
    {
        let mut trainable = perceptron.into_trainable();
        self.calculate_weights(&mut trainable, examples)?;
        Ok(trainable.into_plain())
    }
}

/// Forward pass, deltas and weight update for one example.
pub(crate) fn training_step(
    settings: &Settings,
    perceptron: &mut Perceptron<dyn TrainableLayer>,
    input: &[f64],
    expected: &[f64],
) -> Result<f64> {
    let mut output = vec![0.0; perceptron.output_len()];
    perceptron.calculate(input, &mut output)?;
    if expected.len() != output.len() {
        return Err(Error::ExampleShape {
            index: 0,
            expected: output.len(),
            actual: expected.len(),
        });
    }

    let momentum = &settings.momentum;
    let layers = perceptron.layers_mut();
    let last = layers.len() - 1;
    output_deltas(&mut *layers[last], expected, |old, new| momentum(old, new));
    hidden_deltas(layers, |old, new| momentum(old, new), settings.hidden_delta_bias);
    apply_updates(perceptron, settings.learning_rate)?;

    let error = settings.error.calculate(&output, expected);
    trace!(error, "training step");
    Ok(error)
}
