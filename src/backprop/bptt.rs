//! Back-propagation through time for networks with recurrent layers.
//!
//! A training example is a sequence of input vectors paired with the output
//! expected after the last of them. The deltas of every time step are summed
//! and a single weight update is applied per sequence.

use rand::seq::SliceRandom;
use tracing::trace;

use crate::backprop::bep::{BepAlgorithm, Settings};
use crate::backprop::{apply_updates, hidden_deltas, output_deltas};
use crate::error::{Error, Result};
use crate::layers::TrainableLayer;
use crate::perceptron::Perceptron;
use crate::trainer::{Schedule, TrainingReport};

/// A sequence of inputs and the output expected at its end.
pub type Sequence = (Vec<Vec<f64>>, Vec<f64>);

/// Training by back-propagation through time.
///
/// Every parameter of the wrapped [`BepAlgorithm`] keeps its meaning; the
/// momentum blends the delta before the sequence with the summed deltas of
/// the sequence.
#[derive(Debug)]
pub struct BpttAlgorithm {
    settings: Settings,
    schedule: Schedule,
}

impl From<BepAlgorithm> for BpttAlgorithm {
    fn from(bep: BepAlgorithm) -> Self {
        BpttAlgorithm {
            settings: bep.settings,
            schedule: bep.schedule,
        }
    }
}

impl BpttAlgorithm {
    pub fn new(bep: BepAlgorithm) -> Self {
        BpttAlgorithm::from(bep)
    }

    /// Runs one sequence through `perceptron`, updates the weights once and
    /// returns the error of the final output.
    ///
    /// Recurrent state is cleared before the first step.
    pub fn execute_training_step(
        &self,
        perceptron: &mut Perceptron<dyn TrainableLayer>,
        inputs: &[Vec<f64>],
        expected: &[f64],
    ) -> Result<f64> {
        sequence_step(&self.settings, perceptron, inputs, expected)
    }

    /// Trains `perceptron` on `sequences` until the stop condition holds.
    ///
    /// The epoch error is the mean of the sequence errors.
    pub fn calculate_weights(
        &mut self,
        perceptron: &mut Perceptron<dyn TrainableLayer>,
        sequences: &[Sequence],
    ) -> Result<TrainingReport> {
        if sequences.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        for (index, (inputs, expected)) in sequences.iter().enumerate() {
            if inputs.is_empty() {
                return Err(Error::ExampleShape {
                    index,
                    expected: perceptron.input_len(),
                    actual: 0,
                });
            }
            let shapes = inputs
                .iter()
                .map(|i| (perceptron.input_len(), i.len()))
                .chain(Some((perceptron.output_len(), expected.len())));
            for (expected_len, actual) in shapes {
                if expected_len != actual {
                    return Err(Error::ExampleShape {
                        index,
                        expected: expected_len,
                        actual,
                    });
                }
            }
        }

        let mut order: Vec<usize> = (0..sequences.len()).collect();
        let BpttAlgorithm {
            ref settings,
            ref mut schedule,
        } = *self;
        schedule.run(|rng| {
            order.shuffle(rng);
            let mut error = 0.0;
            for &id in &order {
                let (ref inputs, ref expected) = sequences[id];
                error += sequence_step(settings, perceptron, inputs, expected)?;
            }
            Ok(error / sequences.len() as f64)
        })
    }
}

fn deltas(perceptron: &Perceptron<dyn TrainableLayer>) -> Vec<Vec<f64>> {
    perceptron
        .layers()
        .iter()
        .map(|l| (0..l.size()).map(|id| l.delta(id)).collect())
        .collect()
}

fn sequence_step(
    settings: &Settings,
    perceptron: &mut Perceptron<dyn TrainableLayer>,
    inputs: &[Vec<f64>],
    expected: &[f64],
) -> Result<f64> {
    let previous = deltas(perceptron);
    let mut summed: Vec<Vec<f64>> = previous.iter().map(|l| vec![0.0; l.len()]).collect();
    let mut output = vec![0.0; perceptron.output_len()];

    perceptron.reset();
    for input in inputs {
        perceptron.calculate(input, &mut output)?;
        let layers = perceptron.layers_mut();
        let last = layers.len() - 1;
        output_deltas(&mut *layers[last], expected, |_, new| new);
        hidden_deltas(layers, |_, new| new, settings.hidden_delta_bias);
        for (layer, sums) in layers.iter().zip(summed.iter_mut()) {
            for (id, sum) in sums.iter_mut().enumerate() {
                *sum += layer.delta(id);
            }
        }
    }

    let momentum = &settings.momentum;
    for (layer, (old, sums)) in perceptron
        .layers_mut()
        .iter_mut()
        .zip(previous.iter().zip(&summed))
    {
        for (id, (&old, &sum)) in old.iter().zip(sums).enumerate() {
            layer.set_delta(id, momentum(old, sum));
        }
    }
    apply_updates(perceptron, settings.learning_rate)?;

    let error = settings.error.calculate(&output, expected);
    trace!(steps = inputs.len(), error, "sequence step");
    Ok(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::perceptron::PerceptronBuilder;
    use crate::trainer::{Logging, StopCondition};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn network(seed: u64) -> Perceptron<dyn TrainableLayer> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        PerceptronBuilder::new(1)
            .recurrent(4, Activation::TanH)
            .dense(1, Activation::Sigmoid)
            .build(&mut rng)
            .unwrap()
            .into_trainable()
    }

    /// The expected output is the last value of the sequence.
    fn sequences() -> Vec<Sequence> {
        vec![
            (vec![vec![0.0], vec![0.0], vec![1.0]], vec![1.0]),
            (vec![vec![0.0], vec![0.0], vec![0.0]], vec![0.0]),
            (vec![vec![1.0], vec![1.0], vec![1.0]], vec![1.0]),
            (vec![vec![1.0], vec![1.0], vec![0.0]], vec![0.0]),
        ]
    }

    #[test]
    fn one_update_per_sequence() {
        let mut perceptron = network(0);
        let before = perceptron.memento();
        let bptt = BpttAlgorithm::new(BepAlgorithm::new().learning_rate(0.0));
        let sequences = sequences();
        let (inputs, expected) = &sequences[0];
        let error = bptt
            .execute_training_step(&mut perceptron, inputs, expected)
            .unwrap();
        assert!(error > 0.0);
        assert_eq!(perceptron.memento(), before);
    }

    #[test]
    fn deltas_are_summed_over_steps() {
        let mut single = network(1);
        let mut triple = network(1);
        let bptt = BpttAlgorithm::new(BepAlgorithm::new().learning_rate(0.0));
        bptt.execute_training_step(&mut single, &[vec![0.0]], &[1.0])
            .unwrap();
        bptt.execute_training_step(&mut triple, &[vec![0.0], vec![0.0], vec![0.0]], &[1.0])
            .unwrap();
        let single = single.layers()[1].delta(0);
        let triple = triple.layers()[1].delta(0);
        assert!(single < 0.0);
        assert!(triple < 2.0 * single);
    }

    #[test]
    fn rejects_bad_sequences() {
        let mut perceptron = network(2);
        let mut bptt = BpttAlgorithm::new(BepAlgorithm::new().logging(Logging::Silent));
        let bad = vec![(vec![vec![1.0, 2.0]], vec![1.0])];
        match bptt.calculate_weights(&mut perceptron, &bad) {
            Err(Error::ExampleShape {
                index: 0,
                expected: 1,
                actual: 2,
            }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(bptt.calculate_weights(&mut perceptron, &[]).is_err());
    }

    #[test]
    fn learns_to_follow_the_last_value() {
        let mut perceptron = network(3);
        let mut bptt = BpttAlgorithm::new(
            BepAlgorithm::new()
                .learning_rate(0.05)
                .logging(Logging::Silent)
                .seed(8)
                .stop_condition(StopCondition::Iterations(1)),
        );
        let first = bptt.calculate_weights(&mut perceptron, &sequences()).unwrap();
        let mut bptt = BpttAlgorithm::new(
            BepAlgorithm::new()
                .learning_rate(0.05)
                .logging(Logging::Silent)
                .seed(8)
                .stop_condition(StopCondition::Iterations(500)),
        );
        let last = bptt.calculate_weights(&mut perceptron, &sequences()).unwrap();
        assert!(last.error < first.error);
    }
}
