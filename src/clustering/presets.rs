use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::data::Point2;

/// Built-in point layouts, scaled to the engine's coordinate bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KMeansPreset {
    /// No points; the user adds them.
    Empty,
    /// 100 uniform points.
    Random,
    /// Three Gaussian blobs of 40 points.
    Blobs,
    /// Concentric rings of 50 and 80 points.
    Rings,
    /// A smile arc and two eyes.
    Smiley,
}

const BLOB_SIGMA: f64 = 30.0;

impl KMeansPreset {
    pub const ALL: [KMeansPreset; 5] = [
        KMeansPreset::Empty,
        KMeansPreset::Random,
        KMeansPreset::Blobs,
        KMeansPreset::Rings,
        KMeansPreset::Smiley,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KMeansPreset::Empty => "empty",
            KMeansPreset::Random => "random",
            KMeansPreset::Blobs => "blobs",
            KMeansPreset::Rings => "rings",
            KMeansPreset::Smiley => "smiley",
        }
    }

    pub fn generate<R: Rng + ?Sized>(self, width: f64, height: f64, rng: &mut R) -> Vec<Point2> {
        match self {
            KMeansPreset::Empty => Vec::new(),
            KMeansPreset::Random => (0..100)
                .map(|_| {
                    Point2::new(
                        rng.random_range(0.0..width),
                        rng.random_range(0.0..height),
                    )
                })
                .collect(),
            KMeansPreset::Blobs => blobs(width, height, rng),
            KMeansPreset::Rings => rings(width, height),
            KMeansPreset::Smiley => smiley(width, height, rng),
        }
    }
}

impl fmt::Display for KMeansPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KMeansPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KMeansPreset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown preset '{s}' (expected empty, random, blobs, rings or smiley)")
            })
    }
}

fn blobs<R: Rng + ?Sized>(width: f64, height: f64, rng: &mut R) -> Vec<Point2> {
    let centers = [
        (width * 0.3, height * 0.3),
        (width * 0.7, height * 0.3),
        (width * 0.5, height * 0.7),
    ];
    // Constant, positive sigma.
    let Ok(noise) = Normal::new(0.0, BLOB_SIGMA) else {
        return Vec::new();
    };
    let mut points = Vec::with_capacity(centers.len() * 40);
    for (cx, cy) in centers {
        for _ in 0..40 {
            let dx = noise.sample(&mut *rng);
            let dy = noise.sample(&mut *rng);
            points.push(Point2::new(cx + dx, cy + dy));
        }
    }
    points
}

fn rings(width: f64, height: f64) -> Vec<Point2> {
    let (cx, cy) = (width / 2.0, height / 2.0);
    let ring = |count: usize, radius: f64| {
        (0..count).map(move |i| {
            let angle = i as f64 / count as f64 * 2.0 * PI;
            Point2::new(cx + angle.cos() * radius, cy + angle.sin() * radius)
        })
    };
    ring(50, 50.0).chain(ring(80, 150.0)).collect()
}

fn smiley<R: Rng + ?Sized>(width: f64, height: f64, rng: &mut R) -> Vec<Point2> {
    let (cx, cy) = (width / 2.0, height / 2.0);
    let mut points: Vec<Point2> = (0..60)
        .map(|i| {
            let angle = PI + i as f64 / 60.0 * PI;
            Point2::new(cx + angle.cos() * 100.0, cy + angle.sin() * 100.0 - 20.0)
        })
        .collect();
    for _ in 0..15 {
        for eye_x in [cx - 40.0, cx + 40.0] {
            points.push(Point2::new(
                eye_x + (rng.random::<f64>() - 0.5) * 20.0,
                cy - 50.0 + (rng.random::<f64>() - 0.5) * 20.0,
            ));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::seeded_rng;

    #[test]
    fn test_preset_sizes() {
        let mut rng = seeded_rng(Some(1));
        assert_eq!(KMeansPreset::Empty.generate(800.0, 600.0, &mut rng).len(), 0);
        assert_eq!(KMeansPreset::Random.generate(800.0, 600.0, &mut rng).len(), 100);
        assert_eq!(KMeansPreset::Blobs.generate(800.0, 600.0, &mut rng).len(), 120);
        assert_eq!(KMeansPreset::Rings.generate(800.0, 600.0, &mut rng).len(), 130);
        assert_eq!(KMeansPreset::Smiley.generate(800.0, 600.0, &mut rng).len(), 90);
    }

    #[test]
    fn test_random_points_inside_bounds() {
        let mut rng = seeded_rng(Some(2));
        for p in KMeansPreset::Random.generate(800.0, 600.0, &mut rng) {
            assert!((0.0..800.0).contains(&p.x));
            assert!((0.0..600.0).contains(&p.y));
        }
    }

    #[test]
    fn test_rings_radii() {
        let points = rings(800.0, 600.0);
        let r0 = ((points[0].x - 400.0).powi(2) + (points[0].y - 300.0).powi(2)).sqrt();
        let r1 = ((points[60].x - 400.0).powi(2) + (points[60].y - 300.0).powi(2)).sqrt();
        assert!((r0 - 50.0).abs() < 1e-9);
        assert!((r1 - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_blob_means_near_centers() {
        let mut rng = seeded_rng(Some(3));
        let points = KMeansPreset::Blobs.generate(800.0, 600.0, &mut rng);
        let first = &points[..40];
        let mean_x = first.iter().map(|p| p.x).sum::<f64>() / 40.0;
        // sigma 30 over 40 samples: standard error under 5
        assert!((mean_x - 240.0).abs() < 25.0);
    }
}
