//! Learning-rate schedules for the training loop.
//!
//! The harness steps its scheduler once per training epoch. The default
//! schedule is [`MultiStepLr`]: piecewise-constant decay that multiplies
//! the base rate by `gamma` at each milestone epoch.
//!
//! # Example
//!
//! ```rust
//! use facefold_rs::schedule::{LrScheduler, MultiStepLr};
//!
//! let scheduler = MultiStepLr::new(0.1, vec![5, 10], 0.1);
//! assert!((scheduler.lr_at(0) - 0.1).abs() < 1e-9);
//! assert!((scheduler.lr_at(5) - 0.01).abs() < 1e-9);
//! assert!((scheduler.lr_at(12) - 0.001).abs() < 1e-9);
//! ```

/// Trait for learning-rate schedulers.
pub trait LrScheduler: Send + Sync {
    /// The learning rate to use during `epoch` (0-indexed).
    fn lr_at(&self, epoch: u64) -> f32;

    /// Name of the schedule phase at `epoch`, for logging.
    fn phase_name(&self, epoch: u64) -> &'static str;
}

/// Piecewise-constant decay: the base rate is multiplied by `gamma`
/// once for every milestone at or before the current epoch.
#[derive(Debug, Clone)]
pub struct MultiStepLr {
    base_lr: f32,
    milestones: Vec<u64>,
    gamma: f32,
}

impl MultiStepLr {
    /// Creates the schedule. Milestones are epochs at which decay fires;
    /// they are sorted internally so callers may pass them in any order.
    #[must_use]
    pub fn new(base_lr: f32, mut milestones: Vec<u64>, gamma: f32) -> Self {
        milestones.sort_unstable();
        Self {
            base_lr,
            milestones,
            gamma,
        }
    }

    /// The undecayed base rate.
    #[must_use]
    pub fn base_lr(&self) -> f32 {
        self.base_lr
    }

    /// Number of milestones at or before `epoch`.
    fn decays_applied(&self, epoch: u64) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let applied = self
            .milestones
            .iter()
            .take_while(|&&milestone| milestone <= epoch)
            .count() as u32;
        applied
    }
}

impl LrScheduler for MultiStepLr {
    fn lr_at(&self, epoch: u64) -> f32 {
        self.base_lr * self.gamma.powi(self.decays_applied(epoch) as i32)
    }

    fn phase_name(&self, epoch: u64) -> &'static str {
        match self.decays_applied(epoch) {
            0 => "base",
            _ => "decayed",
        }
    }
}

/// A schedule that never changes the rate.
#[derive(Debug, Clone, Copy)]
pub struct ConstantLr(pub f32);

impl LrScheduler for ConstantLr {
    fn lr_at(&self, _epoch: u64) -> f32 {
        self.0
    }

    fn phase_name(&self, _epoch: u64) -> &'static str {
        "constant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_step_decays_at_milestones() {
        let scheduler = MultiStepLr::new(1.0, vec![5, 10], 0.1);
        assert!((scheduler.lr_at(4) - 1.0).abs() < 1e-9);
        assert!((scheduler.lr_at(5) - 0.1).abs() < 1e-9);
        assert!((scheduler.lr_at(9) - 0.1).abs() < 1e-9);
        assert!((scheduler.lr_at(10) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_milestones_sorted_on_construction() {
        let scheduler = MultiStepLr::new(1.0, vec![10, 5], 0.5);
        assert!((scheduler.lr_at(7) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_phase_name() {
        let scheduler = MultiStepLr::new(1.0, vec![5], 0.1);
        assert_eq!(scheduler.phase_name(0), "base");
        assert_eq!(scheduler.phase_name(6), "decayed");
    }

    #[test]
    fn test_constant_lr() {
        let scheduler = ConstantLr(0.01);
        assert!((scheduler.lr_at(0) - 0.01).abs() < 1e-9);
        assert!((scheduler.lr_at(1000) - 0.01).abs() < 1e-9);
    }
}
