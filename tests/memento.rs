use bpnet::activation::Activation;
use bpnet::layers::Compute;
use bpnet::layers::CpuBackend;
use bpnet::memento::{LayerMemento, PerceptronMemento};
use bpnet::neuron::Pooling;
use bpnet::perceptron::GridShape;
use bpnet::PerceptronBuilder;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn builder() -> PerceptronBuilder {
    let shape = GridShape {
        width: 6,
        height: 6,
        stride: 2,
        margin: 1,
    };
    PerceptronBuilder::new(36)
        .convolution(shape, 2, Activation::ReLU)
        .pooling(
            GridShape {
                width: 6,
                height: 3,
                stride: 3,
                margin: 1,
            },
            Pooling::Max,
        )
        .dense(4, Activation::TanH)
        .dense(2, Activation::Softmax)
}

fn image() -> Vec<f64> {
    (0..36).map(|i| ((i * 7) % 11) as f64 / 10.0).collect()
}

#[test]
fn json_round_trip_restores_outputs() {
    let mut original = builder().build(&mut ChaCha8Rng::seed_from_u64(1)).unwrap();
    let json = serde_json::to_string(&original.memento()).unwrap();

    let mut restored = builder().build(&mut ChaCha8Rng::seed_from_u64(2)).unwrap();
    let memento: PerceptronMemento = serde_json::from_str(&json).unwrap();
    restored.set_memento(&memento).unwrap();

    assert_eq!(restored.memento(), original.memento());
    assert_eq!(restored.run(&image()).unwrap(), original.run(&image()).unwrap());
}

#[test]
fn stable_field_names() {
    let network = builder().build(&mut ChaCha8Rng::seed_from_u64(3)).unwrap();
    let json: serde_json::Value = serde_json::to_value(network.memento()).unwrap();
    let layers = json["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 4);
    assert_eq!(layers[0]["layers"].as_array().unwrap().len(), 2);
    assert!(layers[0]["layers"][0]["neurons"][0]["bias"].is_number());
    assert_eq!(layers[0]["layers"][0]["neurons"][0]["weights"].as_array().unwrap().len(), 9);
    assert!(layers[2]["neurons"][3]["weights"].is_array());

    let memento: PerceptronMemento = serde_json::from_value(json).unwrap();
    assert!(matches!(memento.layers[0], LayerMemento::Complex(_)));
    assert!(matches!(memento.layers[3], LayerMemento::Neural(_)));
}

#[test]
fn legacy_inputs_field() {
    let json = r#"{"layers":[
        {"neurons":[{"bias":0.0,"inputs":[1.0]}]},
        {"neurons":[{"bias":0.5,"inputs":[2.0]}]}
    ]}"#;
    let memento: PerceptronMemento = serde_json::from_str(json).unwrap();
    let mut network = PerceptronBuilder::new(1)
        .dense(1, Activation::ReLU)
        .dense(1, Activation::ReLU)
        .build(&mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    network.set_memento(&memento).unwrap();
    assert_eq!(network.run(&[3.0]).unwrap(), vec![6.5]);
}

#[test]
fn compute_strategies_agree() {
    let memento = builder()
        .build(&mut ChaCha8Rng::seed_from_u64(4))
        .unwrap()
        .memento();
    let mut outputs = Vec::new();
    for compute in vec![
        Compute::Sync,
        Compute::pool(2).unwrap(),
        Compute::device(CpuBackend),
    ] {
        let mut network = builder()
            .computed_by(compute)
            .build(&mut ChaCha8Rng::seed_from_u64(5))
            .unwrap();
        network.set_memento(&memento).unwrap();
        outputs.push(network.run(&image()).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}
