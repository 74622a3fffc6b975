use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::LabeledPoint;

/// Built-in two-class datasets on the unit square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Xor,
    Circle,
    Spiral,
    Moons,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [Dataset::Xor, Dataset::Circle, Dataset::Spiral, Dataset::Moons];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Xor => "xor",
            Dataset::Circle => "circle",
            Dataset::Spiral => "spiral",
            Dataset::Moons => "moons",
        }
    }

    pub fn generate<R: Rng + ?Sized>(self, rng: &mut R) -> Vec<LabeledPoint> {
        match self {
            Dataset::Xor => xor(),
            Dataset::Circle => circle(rng),
            Dataset::Spiral => spiral(),
            Dataset::Moons => moons(),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dataset '{s}' (expected xor, circle, spiral or moons)"))
    }
}

/// Four corners; opposite corners share a label.
pub fn xor() -> Vec<LabeledPoint> {
    vec![
        LabeledPoint::new(0.1, 0.1, 0),
        LabeledPoint::new(0.9, 0.9, 0),
        LabeledPoint::new(0.1, 0.9, 1),
        LabeledPoint::new(0.9, 0.1, 1),
    ]
}

/// 50 uniform points, labelled 1 inside radius 0.35 of the center.
pub fn circle<R: Rng + ?Sized>(rng: &mut R) -> Vec<LabeledPoint> {
    (0..50)
        .map(|_| {
            let x: f64 = rng.random();
            let y: f64 = rng.random();
            let d = ((x - 0.5).powi(2) + (y - 0.5).powi(2)).sqrt();
            LabeledPoint::new(x, y, u8::from(d < 0.35))
        })
        .collect()
}

/// Two interleaved arms of 80 points each.
pub fn spiral() -> Vec<LabeledPoint> {
    let mut points = Vec::with_capacity(160);
    for i in 0..80 {
        let r = i as f64 / 80.0;
        let angle = 3.5 * r * PI;
        points.push(LabeledPoint::new(
            0.5 + r * angle.cos() * 0.45,
            0.5 + r * angle.sin() * 0.45,
            0,
        ));
        points.push(LabeledPoint::new(
            0.5 + r * (angle + PI).cos() * 0.45,
            0.5 + r * (angle + PI).sin() * 0.45,
            1,
        ));
    }
    points
}

/// Two opposing half-circles of 40 points each.
pub fn moons() -> Vec<LabeledPoint> {
    let mut points = Vec::with_capacity(80);
    for i in 0..40 {
        let a = i as f64 / 40.0 * PI;
        points.push(LabeledPoint::new(0.5 + a.cos() * 0.25, 0.3 + a.sin() * 0.25, 0));
        points.push(LabeledPoint::new(
            0.5 + (a + PI).cos() * 0.25,
            0.7 + (a + PI).sin() * 0.25,
            1,
        ));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::seeded_rng;

    #[test]
    fn test_dataset_sizes() {
        let mut rng = seeded_rng(Some(1));
        assert_eq!(Dataset::Xor.generate(&mut rng).len(), 4);
        assert_eq!(Dataset::Circle.generate(&mut rng).len(), 50);
        assert_eq!(Dataset::Spiral.generate(&mut rng).len(), 160);
        assert_eq!(Dataset::Moons.generate(&mut rng).len(), 80);
    }

    #[test]
    fn test_circle_labels_match_radius() {
        let mut rng = seeded_rng(Some(2));
        for p in circle(&mut rng) {
            let inside = ((p.x - 0.5).powi(2) + (p.y - 0.5).powi(2)).sqrt() < 0.35;
            assert_eq!(p.label == 1, inside);
        }
    }

    #[test]
    fn test_points_stay_on_unit_square() {
        for p in spiral().into_iter().chain(moons()) {
            assert!((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y));
        }
    }

    #[test]
    fn test_parse_dataset() {
        assert_eq!("Spiral".parse::<Dataset>(), Ok(Dataset::Spiral));
        assert!("blobs".parse::<Dataset>().is_err());
    }
}
