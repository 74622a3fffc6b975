use crate::error::TrainingError;

/// Caller-side guard run after every gradient step: a non-finite loss or
/// parameter means the learner has diverged and training must stop.
pub fn check_finite(step: usize, loss: f64, params: &[f64]) -> Result<f64, TrainingError> {
    if loss.is_finite() && params.iter().all(|p| p.is_finite()) {
        Ok(loss)
    } else {
        log::warn!("training diverged at step {step} (loss = {loss})");
        Err(TrainingError::Diverged { step, loss })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_loss_passes() {
        assert_eq!(check_finite(1, 0.5, &[1.0, -2.0]), Ok(0.5));
    }

    #[test]
    fn test_nan_loss_is_divergence() {
        let err = check_finite(3, f64::NAN, &[]).unwrap_err();
        assert!(matches!(err, TrainingError::Diverged { step: 3, .. }));
    }

    #[test]
    fn test_infinite_weight_is_divergence() {
        assert!(check_finite(0, 0.1, &[f64::INFINITY]).is_err());
    }
}
