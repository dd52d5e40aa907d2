//! Weight snapshots and JSON serialization.
//!
//! A snapshot stores the shape parameters and the value of every weight.
//! Gradients are transient and never persisted.

use crate::config::ControllerConfig;
use crate::controller::FeedForwardController;
use crate::error::{ControllerError, Result};
use crate::head::Head;
use crate::network::NeuralController;
use crate::output::OutputWeights;
use crate::unit::Unit;
use ndarray::{Array, Array1, Array2, Array3, Dimension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Serializable weight values of a [`NeuralController`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub controller_size: usize,
    pub input_size: usize,
    pub output_size: usize,
    pub head_count: usize,
    pub memory_unit_size: usize,
    /// [neuron][head][cell]
    pub read_weights: Array3<f64>,
    /// [neuron][dim]
    pub input_weights: Array2<f64>,
    /// [neuron]
    pub thresholds: Array1<f64>,
    /// [output][hidden + bias]
    pub output_weights: Array2<f64>,
    /// [head][param][hidden + bias]
    pub head_weights: Array3<f64>,
}

fn values_of<D: Dimension>(units: &Array<Unit, D>) -> Array<f64, D> {
    units.map(|u| u.value)
}

fn units_of<D: Dimension>(values: &Array<f64, D>) -> Array<Unit, D> {
    values.map(|&v| Unit::new(v))
}

fn check_shape(tensor: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ControllerError::ShapeMismatch {
            tensor,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

impl ControllerSnapshot {
    /// Copy the current weight values out of `network`
    pub fn capture(network: &NeuralController) -> Self {
        let config = network.config();
        let controller = network.controller().read();
        let output = network.output_weights().read();

        Self {
            controller_size: config.controller_size,
            input_size: config.input_size,
            output_size: config.output_size,
            head_count: config.head_count,
            memory_unit_size: config.memory_unit_size,
            read_weights: values_of(controller.read_weights()),
            input_weights: values_of(controller.input_weights()),
            thresholds: values_of(controller.thresholds()),
            output_weights: values_of(output.output_weights()),
            head_weights: values_of(output.head_weights()),
        }
    }

    /// Check every tensor against the stored shape parameters
    pub fn validate(&self) -> Result<()> {
        let c = self.controller_size;
        check_shape(
            "read_weights",
            &[c, self.head_count, self.memory_unit_size],
            self.read_weights.shape(),
        )?;
        check_shape("input_weights", &[c, self.input_size], self.input_weights.shape())?;
        check_shape("thresholds", &[c], self.thresholds.shape())?;
        check_shape(
            "output_weights",
            &[self.output_size, c + 1],
            self.output_weights.shape(),
        )?;
        check_shape(
            "head_weights",
            &[self.head_count, Head::unit_size(self.memory_unit_size), c + 1],
            self.head_weights.shape(),
        )?;
        Ok(())
    }

    /// Rebuild a network holding these weight values and zero gradients
    pub fn restore(&self) -> Result<NeuralController> {
        self.validate()?;

        let config = ControllerConfig {
            controller_size: self.controller_size,
            input_size: self.input_size,
            output_size: self.output_size,
            head_count: self.head_count,
            memory_unit_size: self.memory_unit_size,
            ..ControllerConfig::default()
        };
        config.validate()?;

        let controller = FeedForwardController::from_parts(
            units_of(&self.read_weights),
            units_of(&self.input_weights),
            units_of(&self.thresholds),
        );
        let output = OutputWeights::from_parts(
            units_of(&self.output_weights),
            units_of(&self.head_weights),
            self.memory_unit_size,
        );

        Ok(NeuralController::from_parts(config, controller, output))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        debug!(path = %path.display(), "saved controller snapshot");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let snapshot = Self::from_json(&json)?;
        debug!(path = %path.display(), "loaded controller snapshot");
        Ok(snapshot)
    }
}

impl NeuralController {
    /// Save weight values as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        ControllerSnapshot::capture(self).save(path)
    }

    /// Load a network saved with [`NeuralController::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ControllerSnapshot::load(path)?.restore()
    }
}
