use crate::backprop::Decorate;
use crate::error::{Error, Result};
use crate::layers::{Layer, NeuralLayer, TrainableLayer};
use crate::memento::{ComplexLayerMemento, LayerMemento};
use crate::neuron::Neural;

/// Several feature maps reading the same input side by side.
///
/// Outputs are numbered map after map: output `i` of map `m` is output
/// `offset(m) + i` of the complex layer.
#[derive(Debug)]
pub struct ComplexLayer<N> {
    layers: Vec<NeuralLayer<N>>,
}

impl<N: Neural> ComplexLayer<N> {
    /// Groups `layers`, which must all read the same number of inputs.
    pub fn new(layers: Vec<NeuralLayer<N>>) -> Result<Self> {
        let input_len = match layers.first() {
            Some(first) => first.input_count(),
            None => return Err(Error::TooFewLayers(0)),
        };
        for (id, layer) in layers.iter().enumerate() {
            if layer.input_count() != input_len {
                return Err(Error::LayerMismatch {
                    layer: id,
                    expected: input_len,
                    actual: layer.input_count(),
                });
            }
        }
        Ok(ComplexLayer { layers })
    }

    pub fn layers(&self) -> &[NeuralLayer<N>] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [NeuralLayer<N>] {
        &mut self.layers
    }

    /// Finds the map holding neuron `id` and the neuron's index inside it.
    ///
    /// Panics when `id` is out of range, like slice indexing.
    pub(crate) fn locate(&self, id: usize) -> (usize, usize) {
        let mut local = id;
        for (map, layer) in self.layers.iter().enumerate() {
            let size = layer.neurons().len();
            if local < size {
                return (map, local);
            }
            local -= size;
        }
        panic!("neuron index {} out of range for a layer of {} neurons", id, id - local)
    }

    pub(crate) fn map_layers<M, F>(self, f: F) -> ComplexLayer<M>
    where
        F: FnMut(NeuralLayer<N>) -> NeuralLayer<M>,
    {
        ComplexLayer {
            layers: self.layers.into_iter().map(f).collect(),
        }
    }
}

impl<N: Decorate> Layer for ComplexLayer<N> {
    fn size(&self) -> usize {
        self.layers.iter().map(|l| l.size()).sum()
    }

    fn input_len(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_len())
    }

    fn set_input(&mut self, id: usize, value: f64) {
        for layer in &mut self.layers {
            layer.set_input(id, value);
        }
    }

    fn calculate_outputs(&mut self) -> Result<()> {
        for layer in &mut self.layers {
            layer.calculate_outputs()?;
        }
        Ok(())
    }

    fn output(&self, id: usize) -> f64 {
        let (map, id) = self.locate(id);
        self.layers[map].output(id)
    }

    fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.reset();
        }
    }

    fn memento(&self) -> LayerMemento {
        LayerMemento::Complex(ComplexLayerMemento {
            layers: self.layers.iter().map(|l| l.neural_memento()).collect(),
        })
    }

    fn set_memento(&mut self, memento: &LayerMemento) -> Result<()> {
        let memento = match memento {
            LayerMemento::Complex(memento) => memento,
            LayerMemento::Neural(_) => {
                return Err(Error::MementoMismatch {
                    what: "feature maps",
                    expected: self.layers.len(),
                    actual: 1,
                })
            }
        };
        if memento.layers.len() != self.layers.len() {
            return Err(Error::MementoMismatch {
                what: "feature maps",
                expected: self.layers.len(),
                actual: memento.layers.len(),
            });
        }
        let backup: Vec<_> = self.layers.iter().map(|l| l.neural_memento()).collect();
        for id in 0..self.layers.len() {
            if let Err(e) = self.layers[id].set_neural_memento(&memento.layers[id]) {
                for (layer, state) in self.layers.iter_mut().zip(&backup).take(id) {
                    layer.set_neural_memento(state)?;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn into_trainable(self: Box<Self>) -> Box<dyn TrainableLayer> {
        Box::new((*self).map_layers(|l| l.map_neurons(N::decorate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::layers::Grid;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn maps(count: usize) -> ComplexLayer<crate::neuron::Neuron> {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let layers = (0..count)
            .map(|_| {
                let grid = Grid::new(4, 4, 2, 1).unwrap();
                NeuralLayer::convolution(grid, Activation::ReLU, &mut rng)
            })
            .collect();
        ComplexLayer::new(layers).unwrap()
    }

    #[test]
    fn outputs_are_concatenated() {
        let mut layer = maps(3);
        assert_eq!(layer.size(), 12);
        assert_eq!(layer.input_len(), 16);
        for id in 0..16 {
            layer.set_input(id, 1.0);
        }
        layer.calculate_outputs().unwrap();
        assert_eq!(layer.locate(5), (1, 1));
        assert_eq!(layer.output(5), layer.layers()[1].output(1));
        assert_eq!(layer.output(11), layer.layers()[2].output(3));
    }

    #[test]
    fn maps_must_agree_on_inputs() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let layers = vec![
            NeuralLayer::dense(2, 3, Activation::TanH, &mut rng),
            NeuralLayer::dense(2, 4, Activation::TanH, &mut rng),
        ];
        assert!(ComplexLayer::new(layers).is_err());
        assert!(ComplexLayer::<crate::neuron::Neuron>::new(Vec::new()).is_err());
    }

    #[test]
    fn memento_shape_is_checked() {
        let mut layer = maps(2);
        let memento = layer.memento();
        layer.set_memento(&memento).unwrap();
        assert_eq!(layer.memento(), memento);

        let mut other = maps(3);
        let before = other.memento();
        assert!(other.set_memento(&memento).is_err());
        assert_eq!(other.memento(), before);
    }
}
