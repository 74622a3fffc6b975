use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::presets::KMeansPreset;
use crate::data::Point2;
use crate::engine::Engine;
use crate::error::ConfigError;
use crate::numeric::{seeded_rng, squared_distance};
use crate::training::metrics::SeriesWindow;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub k: usize,
    pub width: f64,
    pub height: f64,
    /// Converged once no centroid moves farther than this in one step.
    pub threshold: f64,
    pub preset: KMeansPreset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        KMeansConfig {
            k: 3,
            width: 800.0,
            height: 600.0,
            threshold: 0.1,
            preset: KMeansPreset::Blobs,
            seed: None,
        }
    }
}

impl KMeansConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_k(self.k)?;
        if !(self.width > 0.0 && self.height > 0.0) || !self.width.is_finite() || !self.height.is_finite() {
            return Err(ConfigError::Validation(
                "kmeans.width and kmeans.height must be finite and > 0".into(),
            ));
        }
        if !(self.threshold > 0.0) {
            return Err(ConfigError::Validation(
                "kmeans.threshold must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn validate_k(k: usize) -> Result<(), ConfigError> {
    if k == 0 {
        Err(ConfigError::Validation("kmeans.k must be > 0".into()))
    } else {
        Ok(())
    }
}

/// A data point and the centroid it is currently assigned to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterPoint {
    pub x: f64,
    pub y: f64,
    /// Index into the centroids; `None` until the first assignment.
    pub cluster: Option<usize>,
}

/// Outcome of one Lloyd iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansStep {
    pub iteration: usize,
    /// Largest centroid displacement in this iteration.
    pub moved_max: f64,
    pub inertia: f64,
    pub converged: bool,
}

/// Lloyd's k-means over points in a `width` x `height` box.
///
/// Initial centroids are drawn uniformly inside the box rather than picked
/// from the data. A centroid that loses all its points stays where it is.
pub struct KMeansEngine {
    points: Vec<ClusterPoint>,
    centroids: Vec<Point2>,
    config: KMeansConfig,
    iteration: usize,
    converged: bool,
    inertia_history: SeriesWindow,
    rng: StdRng,
}

impl KMeansEngine {
    /// Build the engine with the configured preset's points.
    pub fn new(config: KMeansConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut engine = KMeansEngine {
            points: Vec::new(),
            centroids: Vec::new(),
            iteration: 0,
            converged: false,
            inertia_history: SeriesWindow::with_capacity(1000),
            rng: seeded_rng(config.seed),
            config,
        };
        let preset = engine.config.preset;
        engine.load_preset(preset);
        Ok(engine)
    }

    /// Replace the points with a preset layout and restart.
    pub fn load_preset(&mut self, preset: KMeansPreset) {
        self.config.preset = preset;
        let points = preset.generate(self.config.width, self.config.height, &mut self.rng);
        self.set_points(points.into_iter());
    }

    pub fn set_points(&mut self, points: impl Iterator<Item = Point2>) {
        self.points = points
            .map(|p| ClusterPoint {
                x: p.x,
                y: p.y,
                cluster: None,
            })
            .collect();
        self.restart();
    }

    /// Add an unassigned point; it is picked up by the next step.
    pub fn add_point(&mut self, point: Point2) {
        self.points.push(ClusterPoint {
            x: point.x,
            y: point.y,
            cluster: None,
        });
    }

    pub fn clear_points(&mut self) {
        self.points.clear();
        self.restart();
    }

    /// Change k and restart with fresh centroids.
    pub fn reset(&mut self, k: usize) -> Result<(), ConfigError> {
        validate_k(k)?;
        self.config.k = k;
        self.restart();
        Ok(())
    }

    /// Fresh random centroids, all points unassigned, counters cleared.
    pub fn restart(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let rng = &mut self.rng;
        self.centroids = (0..self.config.k)
            .map(|_| Point2::new(rng.random_range(0.0..w), rng.random_range(0.0..h)))
            .collect();
        for p in &mut self.points {
            p.cluster = None;
        }
        self.iteration = 0;
        self.converged = false;
        self.inertia_history.clear();
    }

    /// Point each sample at its nearest centroid; ties go to the lowest index.
    fn assign(&mut self) -> bool {
        let mut changed = false;
        for p in &mut self.points {
            let mut best: Option<(usize, f64)> = None;
            for (i, c) in self.centroids.iter().enumerate() {
                let d = squared_distance(p.x, p.y, c.x, c.y);
                match best {
                    Some((_, b)) if d >= b => {}
                    _ => best = Some((i, d)),
                }
            }
            let cluster = best.map(|(i, _)| i);
            if p.cluster != cluster {
                p.cluster = cluster;
                changed = true;
            }
        }
        changed
    }

    /// Move each centroid to the mean of its points. Returns the largest move.
    fn update(&mut self) -> f64 {
        let mut sums = vec![(0.0, 0.0, 0usize); self.centroids.len()];
        for p in &self.points {
            if let Some(c) = p.cluster {
                sums[c].0 += p.x;
                sums[c].1 += p.y;
                sums[c].2 += 1;
            }
        }
        let mut moved_max: f64 = 0.0;
        for (c, (sx, sy, n)) in self.centroids.iter_mut().zip(sums) {
            if n == 0 {
                continue;
            }
            let next = Point2::new(sx / n as f64, sy / n as f64);
            moved_max = moved_max.max(squared_distance(c.x, c.y, next.x, next.y).sqrt());
            *c = next;
        }
        moved_max
    }

    /// One Lloyd iteration. `None` once converged; further calls change nothing.
    pub fn step(&mut self) -> Option<KMeansStep> {
        if self.converged {
            return None;
        }
        self.iteration += 1;
        self.assign();
        let moved_max = self.update();
        let inertia = self.inertia();
        self.inertia_history.record(inertia);
        if moved_max < self.config.threshold {
            self.converged = true;
            log::info!(
                "k-means (k = {}) converged after {} iterations, inertia {:.2}",
                self.config.k,
                self.iteration,
                inertia
            );
        }
        Some(KMeansStep {
            iteration: self.iteration,
            moved_max,
            inertia,
            converged: self.converged,
        })
    }

    /// Step until converged or `max_iterations` steps. Returns the number of
    /// steps taken.
    pub fn run_to_convergence(&mut self, max_iterations: usize) -> usize {
        let mut taken = 0;
        while taken < max_iterations && self.step().is_some() {
            taken += 1;
        }
        taken
    }

    /// Sum of squared distances from assigned points to their centroid.
    pub fn inertia(&self) -> f64 {
        self.points
            .iter()
            .filter_map(|p| {
                p.cluster.map(|c| {
                    let centroid = &self.centroids[c];
                    squared_distance(p.x, p.y, centroid.x, centroid.y)
                })
            })
            .sum()
    }

    pub fn points(&self) -> &[ClusterPoint] {
        &self.points
    }

    pub fn centroids(&self) -> &[Point2] {
        &self.centroids
    }

    pub fn k(&self) -> usize {
        self.config.k
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn inertia_history(&self) -> &SeriesWindow {
        &self.inertia_history
    }
}

impl Engine for KMeansEngine {
    type Step = Option<KMeansStep>;

    fn name(&self) -> &str {
        "KMeans"
    }

    fn step(&mut self) -> Option<KMeansStep> {
        KMeansEngine::step(self)
    }

    fn is_finished(&self) -> bool {
        self.converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(k: usize, preset: KMeansPreset) -> KMeansEngine {
        KMeansEngine::new(KMeansConfig {
            k,
            preset,
            seed: Some(17),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_k_rejected() {
        let config = KMeansConfig {
            k: 0,
            ..Default::default()
        };
        assert!(KMeansEngine::new(config).is_err());
        let mut e = engine(3, KMeansPreset::Empty);
        assert!(e.reset(0).is_err());
        assert_eq!(e.k(), 3);
    }

    #[test]
    fn test_centroids_start_inside_bounds() {
        let e = engine(5, KMeansPreset::Empty);
        assert_eq!(e.centroids().len(), 5);
        for c in e.centroids() {
            assert!((0.0..800.0).contains(&c.x) && (0.0..600.0).contains(&c.y));
        }
    }

    #[test]
    fn test_two_obvious_clusters() {
        let mut e = engine(2, KMeansPreset::Empty);
        let pts = [
            Point2::new(10.0, 10.0),
            Point2::new(12.0, 10.0),
            Point2::new(700.0, 500.0),
            Point2::new(702.0, 500.0),
        ];
        e.set_points(pts.into_iter());
        e.centroids = vec![Point2::new(0.0, 0.0), Point2::new(800.0, 600.0)];
        let first = e.step().unwrap();
        assert_eq!(e.points()[0].cluster, Some(0));
        assert_eq!(e.points()[3].cluster, Some(1));
        assert_eq!(e.centroids()[0], Point2::new(11.0, 10.0));
        assert!(first.moved_max > 0.1);
        assert_eq!(first.inertia, 4.0);
        let second = e.step().unwrap();
        assert!(second.converged);
        assert_eq!(e.step(), None);
    }

    #[test]
    fn test_empty_cluster_centroid_stays() {
        let mut e = engine(2, KMeansPreset::Empty);
        e.set_points([Point2::new(1.0, 1.0), Point2::new(3.0, 1.0)].into_iter());
        e.centroids = vec![Point2::new(2.0, 1.0), Point2::new(790.0, 590.0)];
        e.step();
        assert_eq!(e.centroids()[1], Point2::new(790.0, 590.0));
    }

    #[test]
    fn test_distance_tie_goes_to_lowest_index() {
        let mut e = engine(2, KMeansPreset::Empty);
        e.set_points([Point2::new(5.0, 0.0)].into_iter());
        e.centroids = vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)];
        e.step();
        assert_eq!(e.points()[0].cluster, Some(0));
    }

    #[test]
    fn test_added_point_is_unassigned_until_step() {
        let mut e = engine(3, KMeansPreset::Blobs);
        e.step();
        e.add_point(Point2::new(1.0, 1.0));
        assert_eq!(e.points().last().unwrap().cluster, None);
        assert_eq!(e.points().len(), 121);
    }

    #[test]
    fn test_run_to_convergence_on_blobs() {
        let mut e = engine(3, KMeansPreset::Blobs);
        let taken = e.run_to_convergence(100);
        assert!(e.is_converged());
        assert!(taken >= 1 && taken <= 100);
        assert_eq!(e.iteration(), taken);
        assert_eq!(e.inertia_history().len(), taken);
    }

    #[test]
    fn test_reset_changes_k() {
        let mut e = engine(3, KMeansPreset::Random);
        e.run_to_convergence(50);
        e.reset(5).unwrap();
        assert_eq!(e.centroids().len(), 5);
        assert_eq!(e.iteration(), 0);
        assert!(!e.is_converged());
        assert!(e.points().iter().all(|p| p.cluster.is_none()));
    }
}
