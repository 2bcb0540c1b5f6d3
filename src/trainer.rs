//! Utilities shared by the training algorithms.

use std::fmt;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::Result;

/// Blends the previous delta of a neuron with its freshly computed one.
///
/// Called as `momentum(old, new)`.
pub type Momentum = Box<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// The default momentum: the old delta is ignored.
pub fn no_momentum() -> Momentum {
    Box::new(|_, new| new)
}

/// Classic momentum keeping `factor` of the previous delta.
pub fn momentum(factor: f64) -> impl Fn(f64, f64) -> f64 + Copy + Send + Sync {
    move |old, new| new + factor * old
}

/// Logging frequency to use during training
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Logging {
    /// No events are emitted
    Silent,
    /// A summary is emitted at completion
    Completion,
    /// A summary is emitted after every `n` epochs, and at completion
    Iterations(usize),
}

impl Logging {
    /// Performs logging at the end of `epoch`.
    fn iteration(&self, epoch: usize, error: f64) {
        if let Logging::Iterations(freq) = *self {
            if freq > 0 && epoch % freq == 0 {
                info!(epoch, error, "epoch finished");
            }
        }
    }

    /// Performs logging at the end of training.
    fn completion(&self, report: &TrainingReport) {
        if let Logging::Silent = *self {
            return;
        }
        info!(
            epochs = report.epochs,
            error = report.error,
            seconds = report.elapsed.as_secs_f64(),
            "training finished"
        );
    }
}

/// When to stop training
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StopCondition {
    /// Stops after the provided number of epochs
    Iterations(usize),
    /// Stops when the epoch error drops below the provided threshold
    ErrorThreshold(f64),
    /// Stops after the provided duration
    Duration(Duration),
}

impl From<Duration> for StopCondition {
    fn from(duration: Duration) -> StopCondition {
        StopCondition::Duration(duration)
    }
}

impl StopCondition {
    /// Returns true if another epoch should run after `epoch` epochs ended
    /// with `error`.
    pub fn should_continue(&self, epoch: usize, error: f64, start_time: Instant) -> bool {
        match *self {
            StopCondition::Iterations(epochs) => epoch < epochs,
            StopCondition::ErrorThreshold(threshold) => !(error < threshold),
            StopCondition::Duration(duration) => start_time.elapsed() <= duration,
        }
    }
}

/// Summary of a finished training run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrainingReport {
    /// Number of epochs that ran.
    pub epochs: usize,
    /// Error of the last epoch.
    pub error: f64,
    pub elapsed: Duration,
}

/// Decides whether another epoch runs.
pub(crate) enum Continuation {
    Stop(StopCondition),
    /// Called as `predicate(epoch, error)`.
    Predicate(Box<dyn FnMut(usize, f64) -> bool + Send>),
}

impl Continuation {
    fn should_continue(&mut self, epoch: usize, error: f64, start_time: Instant) -> bool {
        match self {
            Continuation::Stop(condition) => condition.should_continue(epoch, error, start_time),
            Continuation::Predicate(predicate) => predicate(epoch, error),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Continuation::Stop(condition) => f.debug_tuple("Stop").field(condition).finish(),
            Continuation::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// The epoch loop shared by the training algorithms.
#[derive(Debug)]
pub(crate) struct Schedule {
    pub logging: Logging,
    pub continuation: Continuation,
    pub seed: Option<u64>,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            logging: Logging::Completion,
            continuation: Continuation::Stop(StopCondition::Iterations(1000)),
            seed: None,
        }
    }
}

impl Schedule {
    /// Runs `epoch` until the continuation declines.
    ///
    /// `epoch` receives the shuffling RNG and returns the epoch error. A
    /// continuation that never declines loops forever.
    pub fn run<F>(&mut self, mut epoch: F) -> Result<TrainingReport>
    where
        F: FnMut(&mut ChaCha8Rng) -> Result<f64>,
    {
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let start_time = Instant::now();
        let mut epochs = 0;
        let mut error;
        loop {
            error = epoch(&mut rng)?;
            epochs += 1;
            self.logging.iteration(epochs, error);
            if !self.continuation.should_continue(epochs, error, start_time) {
                break;
            }
        }
        let report = TrainingReport {
            epochs,
            error,
            elapsed: start_time.elapsed(),
        };
        self.logging.completion(&report);
        Ok(report)
    }
}
