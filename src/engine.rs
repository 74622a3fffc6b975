/// Common interface for the steppable engines.
///
/// Each call to [`Engine::step`] does a bounded unit of work and returns a
/// result the caller can render. Callers decide how many steps to run per tick.
pub trait Engine {
    /// Result of one step.
    type Step;

    /// Display name for logs.
    fn name(&self) -> &str;

    /// Advance by one unit of work.
    fn step(&mut self) -> Self::Step;

    /// True once further steps would be no-ops.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Step `engine` until it reports finished or `max_steps` is reached.
/// Returns the number of steps taken.
pub fn drive<E: Engine + ?Sized>(engine: &mut E, max_steps: usize) -> usize {
    let mut taken = 0;
    while taken < max_steps && !engine.is_finished() {
        engine.step();
        taken += 1;
    }
    log::debug!("{}: ran {} steps (finished: {})", engine.name(), taken, engine.is_finished());
    taken
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(usize);

    impl Engine for Countdown {
        type Step = usize;

        fn name(&self) -> &str {
            "Countdown"
        }

        fn step(&mut self) -> usize {
            self.0 = self.0.saturating_sub(1);
            self.0
        }

        fn is_finished(&self) -> bool {
            self.0 == 0
        }
    }

    #[test]
    fn test_drive_stops_when_finished() {
        let mut engine = Countdown(3);
        assert_eq!(drive(&mut engine, 10), 3);
        assert!(engine.is_finished());
    }

    #[test]
    fn test_drive_respects_step_limit() {
        let mut engine = Countdown(10);
        assert_eq!(drive(&mut engine, 4), 4);
        assert_eq!(engine.0, 6);
    }
}
