//! Network shape and training configuration.

use crate::error::{ControllerError, Result};
use crate::head::Head;
use crate::updater::{AdamW, GradientDescent, Momentum, RmsProp, UpdateRule};
use serde::{Deserialize, Serialize};

/// Default weight initialisation half-range
pub const INIT_RANGE: f64 = 0.5;

/// Shape parameters of the controller and output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Hidden neurons (default: 100)
    pub controller_size: usize,
    /// External input width (default: 8)
    pub input_size: usize,
    /// External output width (default: 8)
    pub output_size: usize,
    /// Memory heads (default: 1)
    pub head_count: usize,
    /// Width of one memory cell, M (default: 20)
    pub memory_unit_size: usize,
    /// Weights are drawn from [-init_range, init_range) (default: 0.5)
    pub init_range: f64,
    /// Seed for weight initialisation (default: 42)
    pub seed: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_size: 100,
            input_size: 8,
            output_size: 8,
            head_count: 1,
            memory_unit_size: 20,
            init_range: INIT_RANGE,
            seed: 42,
        }
    }
}

impl ControllerConfig {
    /// Smallest useful network: two hidden neurons, one head of width two
    pub fn tiny() -> Self {
        Self {
            controller_size: 2,
            input_size: 2,
            output_size: 1,
            head_count: 1,
            memory_unit_size: 2,
            ..Self::default()
        }
    }

    /// Copy task over `width`-bit vectors plus two delimiter channels
    pub fn copy_task(width: usize) -> Self {
        Self {
            controller_size: 100,
            input_size: width + 2,
            output_size: width,
            head_count: 1,
            memory_unit_size: 20,
            ..Self::default()
        }
    }

    /// Parameter units per head for this memory width
    pub fn head_unit_size(&self) -> usize {
        Head::unit_size(self.memory_unit_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller_size == 0 {
            return Err(ControllerError::invalid("controller_size", "must be at least 1"));
        }
        if self.output_size == 0 {
            return Err(ControllerError::invalid("output_size", "must be at least 1"));
        }
        if !self.init_range.is_finite() || self.init_range < 0.0 {
            return Err(ControllerError::invalid(
                "init_range",
                format!("must be finite and non-negative, got {}", self.init_range),
            ));
        }
        Ok(())
    }
}

/// Serializable choice of update rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    GradientDescent {
        learning_rate: f64,
    },
    Momentum {
        learning_rate: f64,
        momentum: f64,
    },
    RmsProp {
        learning_rate: f64,
        decay: f64,
        momentum: f64,
        epsilon: f64,
    },
    AdamW {
        learning_rate: f64,
    },
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig::RmsProp {
            learning_rate: 1e-4,
            decay: 0.95,
            momentum: 0.9,
            epsilon: 1e-4,
        }
    }
}

impl RuleConfig {
    pub fn learning_rate(&self) -> f64 {
        match *self {
            RuleConfig::GradientDescent { learning_rate }
            | RuleConfig::Momentum { learning_rate, .. }
            | RuleConfig::RmsProp { learning_rate, .. }
            | RuleConfig::AdamW { learning_rate } => learning_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let lr = self.learning_rate();
        if !lr.is_finite() || lr < 0.0 {
            return Err(ControllerError::invalid(
                "learning_rate",
                format!("must be finite and non-negative, got {}", lr),
            ));
        }
        match *self {
            RuleConfig::Momentum { momentum, .. } if !(0.0..1.0).contains(&momentum) => Err(
                ControllerError::invalid("momentum", format!("must be in [0, 1), got {}", momentum)),
            ),
            RuleConfig::RmsProp { decay, epsilon, .. } if !(0.0..1.0).contains(&decay) || epsilon <= 0.0 => {
                Err(ControllerError::invalid(
                    "rms_prop",
                    format!("decay must be in [0, 1) and epsilon positive, got {} / {}", decay, epsilon),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Instantiate the configured rule with fresh state
    pub fn build(&self) -> UpdateRule {
        match *self {
            RuleConfig::GradientDescent { learning_rate } => {
                UpdateRule::GradientDescent(GradientDescent::new(learning_rate))
            }
            RuleConfig::Momentum {
                learning_rate,
                momentum,
            } => UpdateRule::Momentum(Momentum::new(learning_rate, momentum)),
            RuleConfig::RmsProp {
                learning_rate,
                decay,
                momentum,
                epsilon,
            } => UpdateRule::RmsProp(RmsProp::new(learning_rate, decay, momentum, epsilon)),
            RuleConfig::AdamW { learning_rate } => UpdateRule::AdamW(AdamW::new(learning_rate)),
        }
    }
}

/// Sequence training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Update rule applied once per sequence (default: RMSProp)
    pub rule: RuleConfig,
    /// Sequences between `info!` progress lines (default: 100)
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            rule: RuleConfig::default(),
            log_interval: 100,
        }
    }
}

impl TrainingConfig {
    /// Plain gradient descent at the given rate
    pub fn gradient_descent(learning_rate: f64) -> Self {
        Self {
            rule: RuleConfig::GradientDescent { learning_rate },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rule.validate()
    }
}
