//! Learning Rate Scheduler Module
//!
//! Three schedules are supported:
//! - multi-step decay, stepped once per epoch
//! - exponential decay, stepped once per epoch
//! - warmup followed by a cosine decay, stepped once per optimizer iteration

use serde::{Deserialize, Serialize};

use crate::model::config::{ExperimentConfig, LrScheduleKind, WarmupKind};

/// Multiplier of the warmup + cosine schedule at iteration `iter`
///
/// During warmup (`iter < warmup_iter`) with `alpha = iter / warmup_iter`:
/// - linear: `warmup_ratio + (1 - warmup_ratio) * alpha`
/// - exp: `warmup_ratio ^ (1 - alpha)`
///
/// Afterwards: `cos(7π * (iter - warmup_iter) / (16 * (max_iter - warmup_iter)))`.
pub fn warmup_cosine_ratio(
    iter: usize,
    max_iter: usize,
    warmup_iter: usize,
    warmup_ratio: f64,
    warmup: WarmupKind,
) -> f64 {
    if iter < warmup_iter {
        let alpha = iter as f64 / warmup_iter as f64;
        return match warmup {
            WarmupKind::Linear => warmup_ratio + (1.0 - warmup_ratio) * alpha,
            WarmupKind::Exp => warmup_ratio.powf(1.0 - alpha),
        };
    }

    if max_iter <= warmup_iter {
        return 1.0;
    }
    let real_iter = (iter - warmup_iter) as f64;
    let real_max_iter = (max_iter - warmup_iter) as f64;
    (7.0 * std::f64::consts::PI * real_iter / (16.0 * real_max_iter)).cos()
}

/// Learning rate schedule as a function of its step counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// `base_lr * gamma^(number of milestones <= epoch)`
    MultiStep {
        base_lr: f64,
        milestones: Vec<usize>,
        gamma: f64,
    },

    /// `base_lr * gamma^epoch`
    Exponential { base_lr: f64, gamma: f64 },

    /// `base_lr * warmup_cosine_ratio(iter, ...)`
    WarmupCosine {
        base_lr: f64,
        max_iter: usize,
        warmup_iter: usize,
        warmup_ratio: f64,
        warmup: WarmupKind,
    },
}

impl LrSchedule {
    /// Learning rate after `step` scheduler steps
    pub fn get_lr(&self, step: usize) -> f64 {
        match self {
            Self::MultiStep {
                base_lr,
                milestones,
                gamma,
            } => {
                let passed = milestones.iter().filter(|&&m| step >= m).count();
                base_lr * gamma.powi(passed as i32)
            }

            Self::Exponential { base_lr, gamma } => base_lr * gamma.powi(step as i32),

            Self::WarmupCosine {
                base_lr,
                max_iter,
                warmup_iter,
                warmup_ratio,
                warmup,
            } => base_lr * warmup_cosine_ratio(step, *max_iter, *warmup_iter, *warmup_ratio, *warmup),
        }
    }

    /// Whether the schedule advances every iteration instead of every epoch
    pub fn is_per_iteration(&self) -> bool {
        matches!(self, Self::WarmupCosine { .. })
    }

    /// Get a description of the schedule
    pub fn description(&self) -> String {
        match self {
            Self::MultiStep {
                base_lr,
                milestones,
                gamma,
            } => format!(
                "MultiStep(lr={}, milestones={:?}, gamma={})",
                base_lr, milestones, gamma
            ),
            Self::Exponential { base_lr, gamma } => {
                format!("Exponential(lr={}, gamma={})", base_lr, gamma)
            }
            Self::WarmupCosine {
                base_lr,
                max_iter,
                warmup_iter,
                warmup_ratio,
                warmup,
            } => format!(
                "WarmupCosine(lr={}, max_iter={}, warmup_iter={}, warmup_ratio={}, warmup={})",
                base_lr, max_iter, warmup_iter, warmup_ratio, warmup
            ),
        }
    }
}

/// Stateful scheduler: construction corresponds to step 0
#[derive(Debug, Clone)]
pub struct LrScheduler {
    schedule: LrSchedule,
    last_step: usize,
}

impl LrScheduler {
    pub fn new(schedule: LrSchedule) -> Self {
        Self {
            schedule,
            last_step: 0,
        }
    }

    /// Build the schedule selected in `config`
    ///
    /// The warmup + cosine schedule spans `epochs * iters_per_epoch`
    /// iterations with `warmup * iters_per_epoch` warmup iterations.
    pub fn from_config(config: &ExperimentConfig, iters_per_epoch: usize) -> Self {
        let schedule = match config.lr_schedule {
            LrScheduleKind::MultiStep => LrSchedule::MultiStep {
                base_lr: config.lr,
                milestones: config.milestones.clone(),
                gamma: config.milestone_gamma,
            },
            LrScheduleKind::Exponential => LrSchedule::Exponential {
                base_lr: config.lr,
                gamma: config.gamma,
            },
            LrScheduleKind::WarmupCosine => LrSchedule::WarmupCosine {
                base_lr: config.lr,
                max_iter: config.epochs * iters_per_epoch.max(1),
                warmup_iter: config.warmup * iters_per_epoch.max(1),
                warmup_ratio: config.warmup_ratio,
                warmup: config.warmup_kind,
            },
        };
        Self::new(schedule)
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.schedule.get_lr(self.last_step)
    }

    /// Advance by one step and return the new learning rate
    pub fn step(&mut self) -> f64 {
        self.last_step += 1;
        self.lr()
    }

    pub fn last_step(&self) -> usize {
        self.last_step
    }

    pub fn is_per_iteration(&self) -> bool {
        self.schedule.is_per_iteration()
    }

    pub fn schedule(&self) -> &LrSchedule {
        &self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_cosine_starts_at_warmup_ratio() {
        assert!((warmup_cosine_ratio(0, 100, 10, 5e-4, WarmupKind::Exp) - 5e-4).abs() < 1e-12);
        assert!((warmup_cosine_ratio(0, 100, 10, 5e-4, WarmupKind::Linear) - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_warmup_cosine_continuous_at_boundary() {
        let warmup_iter = 1000;
        for kind in [WarmupKind::Linear, WarmupKind::Exp] {
            let before = warmup_cosine_ratio(warmup_iter - 1, 10_000, warmup_iter, 5e-4, kind);
            let at = warmup_cosine_ratio(warmup_iter, 10_000, warmup_iter, 5e-4, kind);
            assert!((at - 1.0).abs() < 1e-12);
            assert!((at - before).abs() < 1e-2, "{:?}: {} vs {}", kind, before, at);
        }
    }

    #[test]
    fn test_warmup_is_monotonic() {
        let ratios: Vec<f64> = (0..=20)
            .map(|i| warmup_cosine_ratio(i, 100, 20, 5e-4, WarmupKind::Exp))
            .collect();
        assert!(ratios.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cosine_end_value() {
        let end = warmup_cosine_ratio(100, 100, 0, 5e-4, WarmupKind::Exp);
        let expected = (7.0 * std::f64::consts::PI / 16.0).cos();
        assert!((end - expected).abs() < 1e-12);
    }

    #[test]
    fn test_no_decay_span() {
        assert_eq!(warmup_cosine_ratio(5, 5, 5, 5e-4, WarmupKind::Linear), 1.0);
    }

    #[test]
    fn test_multistep_schedule() {
        let schedule = LrSchedule::MultiStep {
            base_lr: 1e-3,
            milestones: vec![10, 90],
            gamma: 0.3,
        };
        assert!((schedule.get_lr(0) - 1e-3).abs() < 1e-12);
        assert!((schedule.get_lr(9) - 1e-3).abs() < 1e-12);
        assert!((schedule.get_lr(10) - 3e-4).abs() < 1e-12);
        assert!((schedule.get_lr(90) - 9e-5).abs() < 1e-12);
        assert!(!schedule.is_per_iteration());
    }

    #[test]
    fn test_exponential_schedule() {
        let schedule = LrSchedule::Exponential {
            base_lr: 0.1,
            gamma: 0.95,
        };
        assert!((schedule.get_lr(2) - 0.1 * 0.95 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_scheduler_from_config_steps() {
        let config = ExperimentConfig {
            lr: 0.01,
            epochs: 10,
            warmup: 2,
            lr_schedule: LrScheduleKind::WarmupCosine,
            warmup_kind: WarmupKind::Linear,
            ..Default::default()
        };
        let mut scheduler = LrScheduler::from_config(&config, 5);
        assert!(scheduler.is_per_iteration());
        assert!((scheduler.lr() - 0.01 * 5e-4).abs() < 1e-12);

        for _ in 0..10 {
            scheduler.step();
        }
        assert_eq!(scheduler.last_step(), 10);
        assert!((scheduler.lr() - 0.01).abs() < 1e-12);
        assert!(scheduler.schedule().description().starts_with("WarmupCosine"));
    }
}
