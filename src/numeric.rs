//! Small numeric primitives shared by the engines.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Logistic sigmoid, range (0, 1).
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative expressed in terms of the sigmoid's output `y`.
pub fn sigmoid_derivative(y: f64) -> f64 {
    y * (1.0 - y)
}

/// Tanh derivative expressed in terms of the tanh output `y`.
pub fn tanh_derivative(y: f64) -> f64 {
    1.0 - y * y
}

pub fn squared_distance(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (ax - bx).powi(2) + (ay - by).powi(2)
}

/// Build a per-instance RNG. `None` seeds from the OS.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the largest value; ties are broken uniformly at random among all
/// indices holding the maximum.
pub fn argmax_random_tie<R: Rng + ?Sized>(values: &[f64], rng: &mut R) -> Option<usize> {
    let max = max_value(values)?;
    let tied: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == max)
        .map(|(i, _)| i)
        .collect();
    if tied.is_empty() {
        // Only reachable when every value is NaN.
        return Some(rng.random_range(0..values.len()));
    }
    Some(tied[rng.random_range(0..tied.len())])
}

pub fn max_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_midpoint_and_derivative() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid_derivative(0.5) - 0.25).abs() < 1e-12);
        assert!(sigmoid(40.0) <= 1.0);
        assert!(sigmoid(-40.0) >= 0.0);
    }

    #[test]
    fn test_tanh_derivative() {
        assert_eq!(tanh_derivative(0.0), 1.0);
        assert_eq!(tanh_derivative(1.0), 0.0);
    }

    #[test]
    fn test_argmax_first_prefers_lowest_index() {
        assert_eq!(argmax_first(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax_first(&[]), None);
    }

    #[test]
    fn test_argmax_random_tie_covers_all_tied() {
        let mut rng = seeded_rng(Some(7));
        let values = [0.0, 5.0, 5.0, 5.0];
        let mut seen = [false; 4];
        for _ in 0..200 {
            let i = argmax_random_tie(&values, &mut rng).unwrap();
            seen[i] = true;
        }
        assert!(!seen[0]);
        assert!(seen[1] && seen[2] && seen[3]);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = seeded_rng(Some(3));
        let mut b = seeded_rng(Some(3));
        let xs: Vec<f64> = (0..5).map(|_| a.random()).collect();
        let ys: Vec<f64> = (0..5).map(|_| b.random()).collect();
        assert_eq!(xs, ys);
    }
}
