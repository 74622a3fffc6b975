use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::datasets::Dataset;
use super::network::Network;
use crate::data::LabeledPoint;
use crate::engine::Engine;
use crate::error::{ConfigError, TrainingError};
use crate::numeric::seeded_rng;
use crate::training::divergence::check_finite;
use crate::training::metrics::SeriesWindow;

/// Bounds on what topology edits may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyLimits {
    pub min_hidden_width: usize,
    pub max_hidden_width: usize,
    /// Counting the input and output layers.
    pub min_layers: usize,
    pub max_layers: usize,
    /// Width of a newly added hidden layer.
    pub new_layer_width: usize,
}

impl Default for TopologyLimits {
    fn default() -> Self {
        TopologyLimits {
            min_hidden_width: 1,
            max_hidden_width: 8,
            min_layers: 3,
            max_layers: 6,
            new_layer_width: 4,
        }
    }
}

impl TopologyLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_hidden_width == 0 || self.min_hidden_width > self.max_hidden_width {
            return Err(ConfigError::Validation(
                "neural.limits hidden width bounds must satisfy 1 <= min <= max".into(),
            ));
        }
        if self.min_layers < 2 || self.min_layers > self.max_layers {
            return Err(ConfigError::Validation(
                "neural.limits layer bounds must satisfy 2 <= min <= max".into(),
            ));
        }
        if !(self.min_hidden_width..=self.max_hidden_width).contains(&self.new_layer_width) {
            return Err(ConfigError::Validation(
                "neural.limits.new_layer_width must lie within the hidden width bounds".into(),
            ));
        }
        Ok(())
    }

    /// Check a full topology: two inputs, one output, hidden layers in bounds.
    pub fn check(&self, topology: &[usize]) -> Result<(), ConfigError> {
        if !(self.min_layers..=self.max_layers).contains(&topology.len()) {
            return Err(ConfigError::Validation(format!(
                "topology {topology:?} must have between {} and {} layers",
                self.min_layers, self.max_layers
            )));
        }
        if topology.first() != Some(&2) || topology.last() != Some(&1) {
            return Err(ConfigError::Validation(format!(
                "topology {topology:?} must start with 2 inputs and end with 1 output"
            )));
        }
        let hidden = &topology[1..topology.len() - 1];
        if let Some(w) = hidden
            .iter()
            .find(|w| !(self.min_hidden_width..=self.max_hidden_width).contains(*w))
        {
            return Err(ConfigError::Validation(format!(
                "hidden layer width {w} outside [{}, {}]",
                self.min_hidden_width, self.max_hidden_width
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    pub topology: Vec<usize>,
    pub learning_rate: f64,
    /// Random single-example steps per epoch.
    pub samples_per_epoch: usize,
    pub dataset: Dataset,
    pub limits: TopologyLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        NeuralConfig {
            topology: vec![2, 4, 4, 1],
            learning_rate: 0.03,
            samples_per_epoch: 20,
            dataset: Dataset::Xor,
            limits: TopologyLimits::default(),
            seed: None,
        }
    }
}

impl NeuralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        self.limits.check(&self.topology)?;
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::Validation(
                "neural.learning_rate must be > 0".into(),
            ));
        }
        if self.samples_per_epoch == 0 {
            return Err(ConfigError::Validation(
                "neural.samples_per_epoch must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Epoch-based training loop around a [`Network`] and a point set.
pub struct NeuralPlayground {
    network: Network,
    config: NeuralConfig,
    points: Vec<LabeledPoint>,
    epoch: usize,
    loss: f64,
    loss_history: SeriesWindow,
    diverged: Option<TrainingError>,
    rng: StdRng,
}

impl NeuralPlayground {
    pub fn new(config: NeuralConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = seeded_rng(config.seed);
        let points = config.dataset.generate(&mut rng);
        let network = Network::new(&config.topology, &mut rng)?;
        Ok(NeuralPlayground {
            network,
            config,
            points,
            epoch: 0,
            loss: 0.0,
            loss_history: SeriesWindow::new(),
            diverged: None,
            rng,
        })
    }

    /// Fresh random weights for the current topology; clears training stats.
    pub fn reset_network(&mut self) {
        // The topology was checked when it was set, so this cannot fail.
        if let Ok(network) = Network::new(&self.config.topology, &mut self.rng) {
            self.network = network;
        }
        self.epoch = 0;
        self.loss = 0.0;
        self.loss_history.clear();
        self.diverged = None;
        log::debug!(
            "network rebuilt with topology {:?} ({} parameters)",
            self.config.topology,
            self.network.count_parameters()
        );
    }

    /// Replace the points with a built-in dataset and rebuild the network.
    pub fn load_dataset(&mut self, dataset: Dataset) {
        self.config.dataset = dataset;
        self.points = dataset.generate(&mut self.rng);
        self.reset_network();
    }

    pub fn add_point(&mut self, point: LabeledPoint) {
        self.points.push(point);
    }

    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    /// One epoch of random single-example steps. Returns the mean absolute
    /// error, or `None` when there are no points. Once training has
    /// diverged every call reports the divergence until the network is reset.
    pub fn train_epoch(&mut self) -> Result<Option<f64>, TrainingError> {
        if let Some(err) = &self.diverged {
            return Err(err.clone());
        }
        if self.points.is_empty() {
            return Ok(None);
        }

        let steps = self.config.samples_per_epoch;
        let mut total = 0.0;
        for _ in 0..steps {
            let p = self.points[self.rng.random_range(0..self.points.len())];
            total += self
                .network
                .train_step(&[p.x, p.y], p.target(), self.config.learning_rate)?;
        }
        let loss = total / steps as f64;

        if let Err(err) = check_finite(self.epoch, loss, &self.network.parameters()) {
            self.diverged = Some(err.clone());
            return Err(err);
        }
        self.loss = loss;
        self.epoch += 1;
        self.loss_history.record(loss);
        Ok(Some(loss))
    }

    /// Resize the hidden layer at `layer` (a topology index) by `delta`,
    /// clamped to the width limits. Rebuilds the network.
    pub fn change_hidden_width(&mut self, layer: usize, delta: isize) -> Result<usize, ConfigError> {
        let last = self.config.topology.len() - 1;
        if layer == 0 || layer >= last {
            return Err(ConfigError::Validation(format!(
                "layer {layer} is not a hidden layer of {:?}",
                self.config.topology
            )));
        }
        let limits = self.config.limits;
        let width = self.config.topology[layer]
            .saturating_add_signed(delta)
            .clamp(limits.min_hidden_width, limits.max_hidden_width);
        self.config.topology[layer] = width;
        self.reset_network();
        Ok(width)
    }

    /// Insert a hidden layer before the output. No-op at the layer limit.
    pub fn add_hidden_layer(&mut self) -> bool {
        if self.config.topology.len() >= self.config.limits.max_layers {
            return false;
        }
        let at = self.config.topology.len() - 1;
        self.config
            .topology
            .insert(at, self.config.limits.new_layer_width);
        self.reset_network();
        true
    }

    /// Drop the last hidden layer. No-op at the layer minimum.
    pub fn remove_hidden_layer(&mut self) -> bool {
        if self.config.topology.len() <= self.config.limits.min_layers {
            return false;
        }
        let at = self.config.topology.len() - 2;
        self.config.topology.remove(at);
        self.reset_network();
        true
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.config.learning_rate = learning_rate;
    }

    /// Network output for a point. Overwrites the cached neuron outputs.
    pub fn predict(&mut self, x: f64, y: f64) -> Result<f64, TrainingError> {
        self.network.predict(&[x, y])
    }

    /// Fraction of points whose thresholded prediction matches the label.
    pub fn accuracy(&mut self) -> Result<Option<f64>, TrainingError> {
        if self.points.is_empty() {
            return Ok(None);
        }
        let mut correct = 0;
        for i in 0..self.points.len() {
            let p = self.points[i];
            if (self.network.predict(&[p.x, p.y])? >= 0.5) == (p.label == 1) {
                correct += 1;
            }
        }
        Ok(Some(correct as f64 / self.points.len() as f64))
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn topology(&self) -> &[usize] {
        &self.config.topology
    }

    pub fn points(&self) -> &[LabeledPoint] {
        &self.points
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }

    pub fn loss_history(&self) -> &SeriesWindow {
        &self.loss_history
    }

    pub fn diverged(&self) -> Option<&TrainingError> {
        self.diverged.as_ref()
    }

    pub fn parameter_count(&self) -> usize {
        self.network.count_parameters()
    }
}

impl Engine for NeuralPlayground {
    type Step = Result<Option<f64>, TrainingError>;

    fn name(&self) -> &str {
        "NeuralPlayground"
    }

    fn step(&mut self) -> Self::Step {
        self.train_epoch()
    }

    fn is_finished(&self) -> bool {
        self.diverged.is_some()
    }
}
