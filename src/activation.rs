//! Activation function types.

/// [Activation function](https://en.wikipedia.org/wiki/Activation_function)
/// types.
///
/// Every variant is a stateless strategy: all methods are pure functions of
/// their arguments, so one value can be freely copied into every neuron of a
/// layer.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified Linear Unit
    ReLU,
    /// Leaky Rectified Linear Unit
    ///
    /// Takes an `alpha` value to use for negative inputs.
    LeakyReLU(f64),
    /// Sigmoid function
    Sigmoid,
    /// Hyperbolic tan function
    TanH,
    /// Softmax, normalized over every neuron of the layer.
    ///
    /// Divides the max-shifted exponential by the sum of the shifted
    /// exponentials of the layer.
    Softmax,
    /// The same probabilities as [`Activation::Softmax`], computed as
    /// `exp(sum - logsumexp(layer))`.
    ///
    /// The output is a probability, not its logarithm. Only the evaluation
    /// route differs, which keeps the normalizer in log space.
    LogScaleSoftmax,
    /// Threshold unit, 1 for non-negative sums and 0 otherwise.
    Binary,
}

impl Activation {
    /// Returns true if the output depends on the dot products of the sibling
    /// neurons as well.
    pub fn is_normalizing(&self) -> bool {
        matches!(self, Activation::Softmax | Activation::LogScaleSoftmax)
    }

    /// Builds the dot product of a neuron from its weighted `values`.
    ///
    /// The values are folded left starting from 0.0 and `start` (the bias) is
    /// added last. Every compute path uses this order so that results do not
    /// depend on the backend.
    pub fn sum<I>(&self, values: I, start: f64) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        start + values.into_iter().fold(0.0, |acc, v| acc + v)
    }

    /// Evaluates the activation of `sum`.
    ///
    /// `siblings` holds the dot products of every neuron of the layer,
    /// including this one. Only the normalizing variants look at it.
    pub fn calculate(&self, sum: f64, siblings: &[f64]) -> f64 {
        match *self {
            Activation::ReLU => if sum > 0.0 { sum } else { 0.0 },
            Activation::LeakyReLU(alpha) => {
                if sum > 0.0 { sum } else { alpha * sum }
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-sum).exp()),
            Activation::TanH => sum.tanh(),
            Activation::Softmax => {
                let max = max_of(sum, siblings);
                let normalizer = exp_sum(sum, siblings, max);
                (sum - max).exp() / normalizer
            }
            Activation::LogScaleSoftmax => {
                let max = max_of(sum, siblings);
                let log_sum = max + exp_sum(sum, siblings, max).ln();
                (sum - log_sum).exp()
            }
            Activation::Binary => if sum >= 0.0 { 1.0 } else { 0.0 },
        }
    }

    /// Evaluates the derivative `f'(x)`, where `x = f^{-1}(y)`.
    ///
    /// Note that this function takes in the *output* of the activation
    /// function, rather than the input. This is an optimization that means we
    /// don't have to store the intermediate results before activation.
    pub fn derivate(&self, y: f64) -> f64 {
        match *self {
            Activation::ReLU => if y > 0.0 { 1.0 } else { 0.0 },
            Activation::LeakyReLU(alpha) => if y > 0.0 { 1.0 } else { alpha },
            Activation::Sigmoid => y * (1.0 - y),
            Activation::TanH => 1.0 - y * y,
            Activation::Softmax | Activation::LogScaleSoftmax => y * (1.0 - y),
            Activation::Binary => 1.0,
        }
    }

    /// Returns the error signal of an output neuron.
    ///
    /// The softmax variants are paired with the cross entropy error, whose
    /// derivative already cancels the activation derivative.
    pub fn delta(&self, output: f64, expected: f64) -> f64 {
        if self.is_normalizing() {
            output - expected
        } else {
            (output - expected) * self.derivate(output)
        }
    }
}

fn max_of(sum: f64, siblings: &[f64]) -> f64 {
    siblings.iter().cloned().fold(sum, f64::max)
}

fn exp_sum(sum: f64, siblings: &[f64], max: f64) -> f64 {
    if siblings.is_empty() {
        return (sum - max).exp();
    }
    siblings.iter().map(|d| (d - max).exp()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn sigmoid_at_zero() {
        assert_eq!(Activation::Sigmoid.calculate(0.0, &[]), 0.5);
        assert_eq!(Activation::Sigmoid.derivate(0.5), 0.25);
    }

    #[test]
    fn tanh_at_zero() {
        assert_eq!(Activation::TanH.calculate(0.0, &[]), 0.0);
        assert_eq!(Activation::TanH.derivate(0.0), 1.0);
    }

    #[test]
    fn relu_variants() {
        assert_eq!(Activation::ReLU.calculate(-3.0, &[]), 0.0);
        assert_eq!(Activation::ReLU.calculate(2.5, &[]), 2.5);
        assert_eq!(Activation::LeakyReLU(0.1).calculate(-2.0, &[]), -0.2);
        assert_eq!(Activation::LeakyReLU(0.1).derivate(-0.2), 0.1);
    }

    #[test]
    fn binary_threshold() {
        assert_eq!(Activation::Binary.calculate(0.0, &[]), 1.0);
        assert_eq!(Activation::Binary.calculate(-1e-9, &[]), 0.0);
    }

    #[test]
    fn softmax_sums_to_one() {
        let dots = [1.0, 2.0, 3.0];
        for activation in &[Activation::Softmax, Activation::LogScaleSoftmax] {
            let total: f64 =
                dots.iter().map(|&d| activation.calculate(d, &dots)).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn softmax_is_stable_for_large_sums() {
        let dots = [1000.0, 1001.0, 1002.0];
        let out = Activation::Softmax.calculate(1002.0, &dots);
        assert!(out.is_finite());
        assert_relative_eq!(
            out,
            Activation::LogScaleSoftmax.calculate(1002.0, &dots),
            epsilon = 1e-12
        );
    }

    #[test]
    fn softmax_delta_skips_derivative() {
        assert_eq!(Activation::Softmax.delta(0.7, 1.0), 0.7 - 1.0);
        assert_eq!(
            Activation::Sigmoid.delta(0.7, 1.0),
            (0.7 - 1.0) * 0.7 * (1.0 - 0.7)
        );
    }

    #[test]
    fn sum_adds_start_last() {
        let sum = Activation::TanH.sum(vec![0.25, 0.5], 1.0);
        assert_eq!(sum, 1.75);
    }

    proptest! {
        #[test]
        fn log_scale_softmax_matches_softmax(
            dots in prop::collection::vec(-50.0f64..50.0, 1..6),
            pick in 0usize..6,
        ) {
            let sum = dots[pick % dots.len()];
            let plain = Activation::Softmax.calculate(sum, &dots);
            let log_scale = Activation::LogScaleSoftmax.calculate(sum, &dots);
            prop_assert!((plain - log_scale).abs() <= 1e-12);
        }

        #[test]
        fn sigmoid_stays_in_open_interval(sum in -30.0f64..30.0) {
            let y = Activation::Sigmoid.calculate(sum, &[]);
            prop_assert!(y > 0.0 && y < 1.0);
        }
    }
}
