use rand::Rng;

use crate::error::{ConfigError, TrainingError};
use crate::numeric::{sigmoid, sigmoid_derivative, tanh_derivative};

/// Activation applied by a layer. Hidden layers use tanh, the output layer
/// uses the logistic sigmoid; this is fixed by [`Network::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative in terms of the activation's output.
    pub fn derivative(self, y: f64) -> f64 {
        match self {
            Activation::Tanh => tanh_derivative(y),
            Activation::Sigmoid => sigmoid_derivative(y),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Activation from the most recent forward pass.
    pub output: f64,
    /// Error signal from the most recent training step.
    pub delta: f64,
}

impl Neuron {
    fn random<R: Rng + ?Sized>(inputs: usize, rng: &mut R) -> Self {
        Neuron {
            weights: (0..inputs).map(|_| rng.random_range(-1.0..1.0)).collect(),
            bias: rng.random_range(-1.0..1.0),
            output: 0.0,
            delta: 0.0,
        }
    }

    fn forward(&mut self, inputs: &[f64], activation: Activation) -> f64 {
        let sum = self.bias
            + self
                .weights
                .iter()
                .zip(inputs)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        self.output = activation.apply(sum);
        self.output
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub neurons: Vec<Neuron>,
    pub activation: Activation,
}

impl Layer {
    pub fn outputs(&self) -> Vec<f64> {
        self.neurons.iter().map(|n| n.output).collect()
    }
}

/// A fully connected feed-forward network with one output neuron.
///
/// `topology[0]` is the input width and creates no neurons; each later entry
/// is a layer whose neurons take one weight per neuron of the layer before.
/// Changing the topology means building a new network.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    topology: Vec<usize>,
    layers: Vec<Layer>,
}

impl Network {
    /// Build a network with weights and biases drawn uniformly from [-1, 1).
    pub fn new<R: Rng + ?Sized>(topology: &[usize], rng: &mut R) -> Result<Self, ConfigError> {
        if topology.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "topology needs an input and an output layer (got {topology:?})"
            )));
        }
        if topology.contains(&0) {
            return Err(ConfigError::Validation(format!(
                "every layer needs at least one neuron (got {topology:?})"
            )));
        }
        if topology.last() != Some(&1) {
            return Err(ConfigError::Validation(format!(
                "the output layer must have exactly one neuron (got {topology:?})"
            )));
        }

        let last = topology.len() - 1;
        let layers = topology
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Layer {
                neurons: (0..pair[1]).map(|_| Neuron::random(pair[0], rng)).collect(),
                activation: if i + 1 == last {
                    Activation::Sigmoid
                } else {
                    Activation::Tanh
                },
            })
            .collect();

        Ok(Network {
            topology: topology.to_vec(),
            layers,
        })
    }

    /// Run the network on `inputs`.
    ///
    /// Every call overwrites the cached `output` of every neuron, so after it
    /// returns [`Network::neuron_outputs`] describes exactly this input. An
    /// input of the wrong width is rejected before any neuron is touched.
    pub fn forward(&mut self, inputs: &[f64]) -> Result<Vec<f64>, TrainingError> {
        if inputs.len() != self.topology[0] {
            return Err(TrainingError::InputWidth {
                expected: self.topology[0],
                got: inputs.len(),
            });
        }
        let mut current = inputs.to_vec();
        for layer in &mut self.layers {
            let activation = layer.activation;
            current = layer
                .neurons
                .iter_mut()
                .map(|n| n.forward(&current, activation))
                .collect();
        }
        Ok(current)
    }

    /// Output of the single output neuron.
    pub fn predict(&mut self, inputs: &[f64]) -> Result<f64, TrainingError> {
        Ok(self.forward(inputs)?[0])
    }

    /// One step of single-example backpropagation. Returns `|target - prediction|`.
    pub fn train_step(
        &mut self,
        inputs: &[f64],
        target: f64,
        learning_rate: f64,
    ) -> Result<f64, TrainingError> {
        let prediction = self.predict(inputs)?;
        let error = target - prediction;

        // Deltas for every layer are computed before any weight moves.
        let last = self.layers.len() - 1;
        let output_layer = &mut self.layers[last];
        let activation = output_layer.activation;
        output_layer.neurons[0].delta = error * activation.derivative(prediction);

        for i in (0..last).rev() {
            let (head, tail) = self.layers.split_at_mut(i + 1);
            let layer = &mut head[i];
            let next = &tail[0];
            let activation = layer.activation;
            for (j, neuron) in layer.neurons.iter_mut().enumerate() {
                let downstream: f64 = next.neurons.iter().map(|n| n.weights[j] * n.delta).sum();
                neuron.delta = downstream * activation.derivative(neuron.output);
            }
        }

        let mut layer_inputs = inputs.to_vec();
        for layer in &mut self.layers {
            for neuron in &mut layer.neurons {
                let step = learning_rate * neuron.delta;
                for (w, x) in neuron.weights.iter_mut().zip(&layer_inputs) {
                    *w += step * x;
                }
                neuron.bias += step;
            }
            layer_inputs = layer.outputs();
        }

        Ok(error.abs())
    }

    /// Weights plus biases.
    pub fn count_parameters(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| &l.neurons)
            .map(|n| n.weights.len() + 1)
            .sum()
    }

    /// Cached outputs of every neuron, one vector per layer.
    pub fn neuron_outputs(&self) -> Vec<Vec<f64>> {
        self.layers.iter().map(Layer::outputs).collect()
    }

    /// Every weight and bias, in layer order.
    pub fn parameters(&self) -> Vec<f64> {
        self.layers
            .iter()
            .flat_map(|l| &l.neurons)
            .flat_map(|n| n.weights.iter().copied().chain(std::iter::once(n.bias)))
            .collect()
    }

    pub fn topology(&self) -> &[usize] {
        &self.topology
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::seeded_rng;

    #[test]
    fn test_topology_validation() {
        let mut rng = seeded_rng(Some(1));
        assert!(Network::new(&[2], &mut rng).is_err());
        assert!(Network::new(&[2, 0, 1], &mut rng).is_err());
        assert!(Network::new(&[2, 4, 2], &mut rng).is_err());
        assert!(Network::new(&[2, 4, 1], &mut rng).is_ok());
    }

    #[test]
    fn test_layer_shapes_and_activations() {
        let mut rng = seeded_rng(Some(1));
        let net = Network::new(&[2, 4, 3, 1], &mut rng).unwrap();
        let layers = net.layers();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].neurons.len(), 4);
        assert_eq!(layers[0].neurons[0].weights.len(), 2);
        assert_eq!(layers[1].neurons[0].weights.len(), 4);
        assert_eq!(layers[2].neurons[0].weights.len(), 3);
        assert_eq!(layers[0].activation, Activation::Tanh);
        assert_eq!(layers[2].activation, Activation::Sigmoid);
        // (2+1)*4 + (4+1)*3 + (3+1)*1
        assert_eq!(net.count_parameters(), 31);
        assert_eq!(net.parameters().len(), 31);
    }

    #[test]
    fn test_forward_overwrites_cached_outputs() {
        let mut rng = seeded_rng(Some(2));
        let mut net = Network::new(&[2, 3, 1], &mut rng).unwrap();
        let out = net.forward(&[0.2, 0.8]).unwrap();
        let cached = net.neuron_outputs();
        assert_eq!(cached[1], out);
        assert!(out[0] > 0.0 && out[0] < 1.0);
        assert!(cached[0].iter().all(|v| v.abs() < 1.0));
        net.forward(&[0.9, 0.1]).unwrap();
        assert_ne!(net.neuron_outputs(), cached);
    }

    #[test]
    fn test_hand_computed_output_step() {
        // A single sigmoid neuron with known weights.
        let mut rng = seeded_rng(Some(3));
        let mut net = Network::new(&[1, 1], &mut rng).unwrap();
        net.layers[0].neurons[0].weights = vec![0.0];
        net.layers[0].neurons[0].bias = 0.0;
        let err = net.train_step(&[1.0], 1.0, 1.0).unwrap();
        assert!((err - 0.5).abs() < 1e-12);
        // delta = 0.5 * 0.25
        let n = &net.layers[0].neurons[0];
        assert!((n.delta - 0.125).abs() < 1e-12);
        assert!((n.weights[0] - 0.125).abs() < 1e-12);
        assert!((n.bias - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_training_reduces_error_on_single_point() {
        let mut rng = seeded_rng(Some(4));
        let mut net = Network::new(&[2, 4, 1], &mut rng).unwrap();
        let first = net.train_step(&[0.1, 0.9], 1.0, 0.5).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = net.train_step(&[0.1, 0.9], 1.0, 0.5).unwrap();
        }
        assert!(last < first);
    }

    #[test]
    fn test_wrong_input_width_is_an_error() {
        let mut rng = seeded_rng(Some(5));
        let mut net = Network::new(&[2, 3, 1], &mut rng).unwrap();
        let before = net.clone();
        assert_eq!(
            net.forward(&[0.5]),
            Err(TrainingError::InputWidth { expected: 2, got: 1 })
        );
        assert!(net.predict(&[0.1, 0.2, 0.3]).is_err());
        assert!(net.train_step(&[], 1.0, 0.5).is_err());
        // Nothing moved.
        assert_eq!(net, before);
    }
}
