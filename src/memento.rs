//! Value snapshots of the trainable state of a network.
//!
//! Mementos are the only form in which weights leave or enter a network. The
//! serialized field names (`bias`, `weights`, `neurons`, `layers`) are kept
//! stable so that previously saved weight files stay readable; `inputs` is
//! accepted as an alias of `weights`.

/// Bias and weights of one neuron.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuronMemento {
    pub bias: f64,
    #[serde(alias = "inputs")]
    pub weights: Vec<f64>,
}

/// Neuron snapshots of one layer, in neuron order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NeuralLayerMemento {
    pub neurons: Vec<NeuronMemento>,
}

/// Snapshots of the sub-layers of a layer made of several feature maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexLayerMemento {
    pub layers: Vec<NeuralLayerMemento>,
}

/// Snapshot of any layer kind.
///
/// The representation is untagged: a plain layer serializes as
/// `{"neurons": [...]}` and a complex one as `{"layers": [...]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerMemento {
    Neural(NeuralLayerMemento),
    Complex(ComplexLayerMemento),
}

/// Layer snapshots of a perceptron, from the input layer to the output layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptronMemento {
    pub layers: Vec<LayerMemento>,
}

impl From<NeuralLayerMemento> for LayerMemento {
    fn from(memento: NeuralLayerMemento) -> Self {
        LayerMemento::Neural(memento)
    }
}

impl From<ComplexLayerMemento> for LayerMemento {
    fn from(memento: ComplexLayerMemento) -> Self {
        LayerMemento::Complex(memento)
    }
}
