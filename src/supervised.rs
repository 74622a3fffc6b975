//! Online gradient descent for polynomial regression (batch gradient per
//! step) and 2D logistic regression (per-point SGD), plus the lab loop that
//! trains them with a divergence stop.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{LabeledPoint, Point2};
use crate::engine::Engine;
use crate::error::{ConfigError, TrainingError};
use crate::numeric::{seeded_rng, sigmoid};
use crate::training::divergence::check_finite;
use crate::training::metrics::SeriesWindow;

/// Predictions are clamped to this range before taking logs.
const BCE_CLAMP: (f64, f64) = (1e-4, 1.0 - 1e-4);

/// `y = Σ w_i · x^i`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialRegression {
    weights: Vec<f64>,
}

impl PolynomialRegression {
    /// All-zero coefficients for a polynomial of `degree`.
    pub fn new(degree: usize) -> Self {
        PolynomialRegression {
            weights: vec![0.0; degree + 1],
        }
    }

    pub fn with_weights(weights: Vec<f64>) -> Result<Self, ConfigError> {
        if weights.is_empty() {
            return Err(ConfigError::Validation(
                "a polynomial needs at least one coefficient".into(),
            ));
        }
        Ok(PolynomialRegression { weights })
    }

    /// Constant term in [0, 1), higher terms in [-0.5, 0.5).
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for (i, w) in self.weights.iter_mut().enumerate() {
            *w = if i == 0 {
                rng.random_range(0.0..1.0)
            } else {
                rng.random_range(-0.5..0.5)
            };
        }
    }

    pub fn degree(&self) -> usize {
        self.weights.len() - 1
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn predict(&self, x: f64) -> f64 {
        // Horner
        self.weights.iter().rev().fold(0.0, |acc, w| acc * x + w)
    }

    /// One batch gradient step over `points`. Returns the mean squared error
    /// measured before the update, or `None` for an empty set.
    pub fn train_step(&mut self, points: &[Point2], learning_rate: f64) -> Option<f64> {
        if points.is_empty() {
            return None;
        }
        let mut gradient = vec![0.0; self.weights.len()];
        let mut squared = 0.0;
        for p in points {
            let error = p.y - self.predict(p.x);
            let mut power = 1.0;
            for g in &mut gradient {
                *g += error * power;
                power *= p.x;
            }
            squared += error * error;
        }
        for (w, g) in self.weights.iter_mut().zip(&gradient) {
            *w += learning_rate * g;
        }
        Some(squared / points.len() as f64)
    }
}

/// `p = sigmoid(w1·x + w2·y + bias)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogisticRegression {
    pub w1: f64,
    pub w2: f64,
    pub bias: f64,
}

impl LogisticRegression {
    pub fn new(w1: f64, w2: f64, bias: f64) -> Self {
        LogisticRegression { w1, w2, bias }
    }

    /// Every parameter uniform in [-1, 1).
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.w1 = rng.random_range(-1.0..1.0);
        self.w2 = rng.random_range(-1.0..1.0);
        self.bias = rng.random_range(-1.0..1.0);
    }

    pub fn predict(&self, x: f64, y: f64) -> f64 {
        sigmoid(self.w1 * x + self.w2 * y + self.bias)
    }

    /// Per-point SGD in the given order. Returns the mean binary
    /// cross-entropy, or `None` for an empty set.
    pub fn train_step(&mut self, points: &[LabeledPoint], learning_rate: f64) -> Option<f64> {
        if points.is_empty() {
            return None;
        }
        let mut total = 0.0;
        for p in points {
            let prediction = self.predict(p.x, p.y);
            let target = p.target();
            let error = target - prediction;
            self.w1 += learning_rate * error * p.x;
            self.w2 += learning_rate * error * p.y;
            self.bias += learning_rate * error;

            let safe = prediction.clamp(BCE_CLAMP.0, BCE_CLAMP.1);
            total += -(target * safe.ln() + (1.0 - target) * (1.0 - safe).ln());
        }
        Some(total / points.len() as f64)
    }

    /// The p = 0.5 line as `(slope, intercept)`, or `None` when it is
    /// (nearly) vertical.
    pub fn decision_boundary(&self) -> Option<(f64, f64)> {
        if self.w2.abs() > 0.001 {
            Some((-self.w1 / self.w2, -self.bias / self.w2))
        } else {
            None
        }
    }

    pub fn parameters(&self) -> [f64; 3] {
        [self.w1, self.w2, self.bias]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisedTask {
    Regression,
    Classification,
}

impl fmt::Display for SupervisedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisedTask::Regression => "regression",
            SupervisedTask::Classification => "classification",
        })
    }
}

impl FromStr for SupervisedTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regression" => Ok(SupervisedTask::Regression),
            "classification" => Ok(SupervisedTask::Classification),
            _ => Err(format!(
                "unknown task '{s}' (expected regression or classification)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisedConfig {
    pub task: SupervisedTask,
    /// Polynomial degree for regression.
    pub degree: usize,
    pub learning_rate: f64,
    pub steps_per_tick: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SupervisedConfig {
    fn default() -> Self {
        SupervisedConfig {
            task: SupervisedTask::Regression,
            degree: 1,
            learning_rate: 0.01,
            steps_per_tick: 5,
            seed: None,
        }
    }
}

impl SupervisedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::Validation(
                "supervised.learning_rate must be > 0".into(),
            ));
        }
        if self.steps_per_tick == 0 {
            return Err(ConfigError::Validation(
                "supervised.steps_per_tick must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// The active model; which one is selected by the task.
#[derive(Debug, Clone, PartialEq)]
pub enum LinearModel {
    Regression(PolynomialRegression),
    Classification(LogisticRegression),
}

impl LinearModel {
    pub fn parameters(&self) -> Vec<f64> {
        match self {
            LinearModel::Regression(m) => m.weights().to_vec(),
            LinearModel::Classification(m) => m.parameters().to_vec(),
        }
    }
}

pub struct SupervisedLab {
    config: SupervisedConfig,
    model: LinearModel,
    points: Vec<LabeledPoint>,
    epoch: usize,
    loss: f64,
    loss_history: SeriesWindow,
    diverged: Option<TrainingError>,
    rng: StdRng,
}

impl SupervisedLab {
    pub fn new(config: SupervisedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = seeded_rng(config.seed);
        let mut lab = SupervisedLab {
            model: LinearModel::Classification(LogisticRegression::default()),
            config,
            points: Vec::new(),
            epoch: 0,
            loss: 0.0,
            loss_history: SeriesWindow::new(),
            diverged: None,
            rng,
        };
        lab.reset();
        Ok(lab)
    }

    /// Switch task. Clears the data and re-randomizes the model.
    pub fn set_task(&mut self, task: SupervisedTask) {
        self.config.task = task;
        self.reset();
    }

    /// Clear points and statistics and draw fresh random parameters.
    pub fn reset(&mut self) {
        self.model = match self.config.task {
            SupervisedTask::Regression => {
                let mut m = PolynomialRegression::new(self.config.degree);
                m.randomize(&mut self.rng);
                LinearModel::Regression(m)
            }
            SupervisedTask::Classification => {
                let mut m = LogisticRegression::default();
                m.randomize(&mut self.rng);
                LinearModel::Classification(m)
            }
        };
        self.points.clear();
        self.epoch = 0;
        self.loss = 0.0;
        self.loss_history.clear();
        self.diverged = None;
    }

    /// Replace the model outright, e.g. to start from known weights.
    pub fn set_model(&mut self, model: LinearModel) {
        self.config.task = match model {
            LinearModel::Regression(_) => SupervisedTask::Regression,
            LinearModel::Classification(_) => SupervisedTask::Classification,
        };
        self.model = model;
        self.diverged = None;
    }

    /// Add a sample. The label only matters for classification.
    pub fn add_point(&mut self, x: f64, y: f64, label: u8) {
        self.points.push(LabeledPoint::new(x, y, label));
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.config.learning_rate = learning_rate;
    }

    /// One training step on the current points. `Ok(None)` with no points.
    pub fn train_step(&mut self) -> Result<Option<f64>, TrainingError> {
        if let Some(err) = &self.diverged {
            return Err(err.clone());
        }
        let lr = self.config.learning_rate;
        let loss = match &mut self.model {
            LinearModel::Regression(m) => {
                let points: Vec<Point2> = self.points.iter().map(|p| Point2::new(p.x, p.y)).collect();
                m.train_step(&points, lr)
            }
            LinearModel::Classification(m) => m.train_step(&self.points, lr),
        };
        let Some(loss) = loss else {
            return Ok(None);
        };
        if let Err(err) = check_finite(self.epoch, loss, &self.model.parameters()) {
            self.diverged = Some(err.clone());
            return Err(err);
        }
        self.loss = loss;
        self.epoch += 1;
        self.loss_history.record(loss);
        Ok(Some(loss))
    }

    /// `steps_per_tick` training steps; returns the last loss. Stops early
    /// on divergence.
    pub fn tick(&mut self) -> Result<Option<f64>, TrainingError> {
        let mut last = None;
        for _ in 0..self.config.steps_per_tick {
            last = self.train_step()?;
            if last.is_none() {
                break;
            }
        }
        Ok(last)
    }

    /// Model output at a point: the regression value at `x`, or the class-1
    /// probability at `(x, y)`.
    pub fn predict(&self, x: f64, y: f64) -> f64 {
        match &self.model {
            LinearModel::Regression(m) => m.predict(x),
            LinearModel::Classification(m) => m.predict(x, y),
        }
    }

    /// Decision line for classification, see [`LogisticRegression::decision_boundary`].
    pub fn decision_boundary(&self) -> Option<(f64, f64)> {
        match &self.model {
            LinearModel::Classification(m) => m.decision_boundary(),
            LinearModel::Regression(_) => None,
        }
    }

    pub fn task(&self) -> SupervisedTask {
        self.config.task
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
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
}

impl Engine for SupervisedLab {
    type Step = Result<Option<f64>, TrainingError>;

    fn name(&self) -> &str {
        "Supervised"
    }

    fn step(&mut self) -> Self::Step {
        self.tick()
    }

    fn is_finished(&self) -> bool {
        self.diverged.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polynomial_predict() {
        let m = PolynomialRegression::with_weights(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.degree(), 2);
        assert_eq!(m.predict(2.0), 1.0 + 4.0 + 12.0);
        assert!(PolynomialRegression::with_weights(vec![]).is_err());
    }

    #[test]
    fn test_polynomial_step_uses_summed_gradient() {
        let mut m = PolynomialRegression::new(1);
        let points = [Point2::new(1.0, 2.0), Point2::new(2.0, 4.0)];
        let loss = m.train_step(&points, 0.1).unwrap();
        // errors 2 and 4 before the update
        assert_eq!(loss, 10.0);
        // w0 += 0.1 * (2 + 4), w1 += 0.1 * (2*1 + 4*2)
        assert!((m.weights()[0] - 0.6).abs() < 1e-12);
        assert!((m.weights()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_points_no_loss() {
        let mut m = PolynomialRegression::new(2);
        assert_eq!(m.train_step(&[], 0.1), None);
        let mut l = LogisticRegression::default();
        assert_eq!(l.train_step(&[], 0.1), None);
    }

    #[test]
    fn test_logistic_updates_point_by_point() {
        let mut l = LogisticRegression::default();
        let points = [LabeledPoint::new(1.0, 0.0, 1), LabeledPoint::new(1.0, 0.0, 1)];
        let loss = l.train_step(&points, 1.0).unwrap();
        // first point: p = 0.5, error 0.5 -> w1 = 0.5, bias = 0.5
        // second point sees the updated weights: p = sigmoid(1.0)
        let p2 = sigmoid(1.0);
        let expected_w1 = 0.5 + (1.0 - p2);
        assert!((l.w1 - expected_w1).abs() < 1e-12);
        assert_eq!(l.w2, 0.0);
        let expected_loss = (-(0.5f64).ln() - p2.ln()) / 2.0;
        assert!((loss - expected_loss).abs() < 1e-12);
    }

    #[test]
    fn test_bce_is_clamped() {
        let mut l = LogisticRegression::new(0.0, 0.0, 1000.0);
        let loss = l.train_step(&[LabeledPoint::new(0.0, 0.0, 0)], 0.0).unwrap();
        assert!(loss.is_finite());
        assert!((loss + (1e-4f64).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_decision_boundary() {
        let l = LogisticRegression::new(1.0, 2.0, -1.0);
        let (slope, intercept) = l.decision_boundary().unwrap();
        assert_eq!(slope, -0.5);
        assert_eq!(intercept, 0.5);
        assert_eq!(LogisticRegression::new(1.0, 0.0005, 0.0).decision_boundary(), None);
    }

    #[test]
    fn test_randomize_ranges() {
        let mut rng = seeded_rng(Some(8));
        let mut m = PolynomialRegression::new(3);
        for _ in 0..50 {
            m.randomize(&mut rng);
            assert!((0.0..1.0).contains(&m.weights()[0]));
            assert!(m.weights()[1..].iter().all(|w| (-0.5..0.5).contains(w)));
        }
    }

    #[test]
    fn test_task_switch_clears_points() {
        let mut lab = SupervisedLab::new(SupervisedConfig {
            seed: Some(1),
            ..Default::default()
        })
        .unwrap();
        lab.add_point(0.2, 0.3, 0);
        lab.train_step().unwrap();
        lab.set_task(SupervisedTask::Classification);
        assert!(lab.points().is_empty());
        assert_eq!(lab.epoch(), 0);
        assert!(matches!(lab.model(), LinearModel::Classification(_)));
        assert_eq!(lab.train_step(), Ok(None));
    }

    #[test]
    fn test_tick_runs_configured_steps() {
        let mut lab = SupervisedLab::new(SupervisedConfig {
            seed: Some(2),
            ..Default::default()
        })
        .unwrap();
        lab.add_point(0.5, 0.5, 0);
        lab.tick().unwrap();
        assert_eq!(lab.epoch(), 5);
    }

    #[test]
    fn test_divergence_halts_lab() {
        let mut lab = SupervisedLab::new(SupervisedConfig {
            learning_rate: 1e200,
            seed: Some(3),
            ..Default::default()
        })
        .unwrap();
        lab.add_point(100.0, 1e100, 0);
        let result = lab.tick();
        assert!(matches!(result, Err(TrainingError::Diverged { .. })));
        assert!(lab.is_finished());
        assert!(lab.train_step().is_err());
    }
}
