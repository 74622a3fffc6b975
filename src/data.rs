use serde::{Deserialize, Serialize};

/// An unlabeled 2D sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Point2 { x, y }
    }
}

/// A 2D sample with a binary class label (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub x: f64,
    pub y: f64,
    pub label: u8,
}

impl LabeledPoint {
    pub fn new(x: f64, y: f64, label: u8) -> Self {
        LabeledPoint { x, y, label }
    }

    /// The label as a regression target.
    pub fn target(&self) -> f64 {
        if self.label == 0 {
            0.0
        } else {
            1.0
        }
    }
}
