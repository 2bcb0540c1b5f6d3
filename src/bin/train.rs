//! Trains a small network on the XOR function.
//!
//! Usage: `train [config.json]`. Training parameters not set in the
//! configuration file fall back to the values below. Set `RUST_LOG` to tune
//! the log output.

use std::env;
use std::process;

use bpnet::activation::Activation;
use bpnet::backprop::BepAlgorithm;
use bpnet::config::TrainingConfig;
use bpnet::PerceptronBuilder;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

const EXAMPLES: [([f64; 2], [f64; 1]); 4] = [
    ([0.0, 0.0], [0.0]),
    ([0.0, 1.0], [1.0]),
    ([1.0, 0.0], [1.0]),
    ([1.0, 1.0], [0.0]),
];

fn run() -> bpnet::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => TrainingConfig::load(path)?,
        None => TrainingConfig::default(),
    };
    let config = TrainingConfig {
        learning_rate: config.learning_rate.or(Some(0.09)),
        max_epochs: config.max_epochs.or(Some(20_000)),
        error_threshold: config.error_threshold.or(Some(0.01)),
        log_every: config.log_every.or(Some(1000)),
        ..config
    };

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let network = PerceptronBuilder::new(2)
        .dense(8, Activation::TanH)
        .dense(1, Activation::Sigmoid)
        .build(&mut rng)?;

    let mut network = BepAlgorithm::from_config(&config).train(network, &EXAMPLES[..])?;

    println!();
    for (input, expected) in EXAMPLES.iter() {
        let output = network.run(input)?;
        println!(
            "{:?} -> {:.4} (expected {})",
            input, output[0], expected[0]
        );
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
