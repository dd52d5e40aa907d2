//! Output layer: external outputs and raw head parameters.
//!
//! Two weight tensors map the hidden activations forward:
//! - `output_weights[output][hidden + bias]` feeds sigmoid output neurons
//! - `head_weights[head][param][hidden + bias]` feeds linear head parameters
//!
//! The last slot of every weight row is the bias. The weights live behind a
//! shared handle so that each time step of a sequence can own its own neuron
//! state (via [`OutputLayer::clone_shared`]) while gradients accumulate into
//! one weight set.

use crate::activation::sigmoid;
use crate::factory::UnitFactory;
use crate::head::Head;
use crate::hidden::HiddenLayer;
use crate::unit::{self, Unit};
use crate::updater::{apply, WeightUpdater};
use crate::Shared;
use ndarray::{Array1, Array2, Array3, ArrayView1};
use parking_lot::RwLock;
use std::sync::Arc;

/// Weights from the hidden layer to the outputs and to the heads
#[derive(Debug, Clone)]
pub struct OutputWeights {
    controller_size: usize,
    memory_unit_size: usize,
    /// [output][hidden + bias]
    output_weights: Array2<Unit>,
    /// [head][param][hidden + bias]
    head_weights: Array3<Unit>,
}

impl OutputWeights {
    pub fn new(
        output_size: usize,
        controller_size: usize,
        head_count: usize,
        memory_unit_size: usize,
        factory: &mut UnitFactory,
    ) -> Self {
        let head_unit_size = Head::unit_size(memory_unit_size);
        Self {
            controller_size,
            memory_unit_size,
            output_weights: factory.tensor2(output_size, controller_size + 1),
            head_weights: factory.tensor3(head_count, head_unit_size, controller_size + 1),
        }
    }

    pub(crate) fn from_parts(
        output_weights: Array2<Unit>,
        head_weights: Array3<Unit>,
        memory_unit_size: usize,
    ) -> Self {
        let controller_size = output_weights.ncols().saturating_sub(1);
        assert_eq!(head_weights.dim().1, Head::unit_size(memory_unit_size));
        assert_eq!(head_weights.dim().2, controller_size + 1);

        Self {
            controller_size,
            memory_unit_size,
            output_weights,
            head_weights,
        }
    }

    pub fn output_size(&self) -> usize {
        self.output_weights.nrows()
    }

    pub fn controller_size(&self) -> usize {
        self.controller_size
    }

    pub fn head_count(&self) -> usize {
        self.head_weights.dim().0
    }

    pub fn head_unit_size(&self) -> usize {
        self.head_weights.dim().1
    }

    pub fn memory_unit_size(&self) -> usize {
        self.memory_unit_size
    }

    pub fn output_weights(&self) -> &Array2<Unit> {
        &self.output_weights
    }

    pub fn output_weights_mut(&mut self) -> &mut Array2<Unit> {
        &mut self.output_weights
    }

    pub fn head_weights(&self) -> &Array3<Unit> {
        &self.head_weights
    }

    pub fn head_weights_mut(&mut self) -> &mut Array3<Unit> {
        &mut self.head_weights
    }

    /// Apply `updater` to output weights, then head weights, as one pass
    pub fn update_weights(&mut self, updater: &mut dyn WeightUpdater) {
        updater.begin_pass();
        self.apply_updates(updater);
    }

    /// Traversal without starting a pass, for callers updating several tensors
    pub(crate) fn apply_updates(&mut self, updater: &mut dyn WeightUpdater) {
        apply(updater, self.output_weights.iter_mut());
        apply(updater, self.head_weights.iter_mut());
    }

    pub fn reset_gradients(&mut self) {
        self.output_weights
            .iter_mut()
            .chain(self.head_weights.iter_mut())
            .for_each(Unit::reset_gradient);
    }

    pub fn weight_count(&self) -> usize {
        self.output_weights.len() + self.head_weights.len()
    }
}

/// Σ_j w[j]·h[j] + bias, where the bias is the last entry of `row`
fn weighted_sum(row: ArrayView1<'_, Unit>, hidden: &Array1<Unit>) -> f64 {
    let mut sum = 0.0;
    for (weight, neuron) in row.iter().zip(hidden.iter()) {
        sum += weight.value * neuron.value;
    }
    sum + row[hidden.len()].value
}

/// Output and head neurons of one time step over shared [`OutputWeights`]
#[derive(Debug)]
pub struct OutputLayer {
    weights: Shared<OutputWeights>,
    neurons: Array1<Unit>,
    heads: Vec<Head>,
}

impl OutputLayer {
    /// Allocate weights and zeroed neuron state
    pub fn new(
        output_size: usize,
        controller_size: usize,
        head_count: usize,
        memory_unit_size: usize,
        factory: &mut UnitFactory,
    ) -> Self {
        let weights = OutputWeights::new(
            output_size,
            controller_size,
            head_count,
            memory_unit_size,
            factory,
        );
        Self::with_weights(Arc::new(RwLock::new(weights)))
    }

    /// Zeroed neuron state over existing weights
    pub fn with_weights(weights: Shared<OutputWeights>) -> Self {
        let (output_size, head_count, memory_unit_size) = {
            let w = weights.read();
            (w.output_size(), w.head_count(), w.memory_unit_size())
        };

        Self {
            weights,
            neurons: UnitFactory::neurons(output_size),
            heads: Head::vector(head_count, memory_unit_size),
        }
    }

    /// New layer sharing this layer's weights, with fresh neurons and heads
    pub fn clone_shared(&self) -> Self {
        Self::with_weights(Arc::clone(&self.weights))
    }

    pub fn weights(&self) -> &Shared<OutputWeights> {
        &self.weights
    }

    pub fn neurons(&self) -> &Array1<Unit> {
        &self.neurons
    }

    pub fn neurons_mut(&mut self) -> &mut Array1<Unit> {
        &mut self.neurons
    }

    pub fn heads(&self) -> &[Head] {
        &self.heads
    }

    pub fn heads_mut(&mut self) -> &mut [Head] {
        &mut self.heads
    }

    /// Snapshot of the output neuron values
    pub fn output(&self) -> Vec<f64> {
        unit::values(&self.neurons)
    }

    /// Zero head values before a forward pass that should be the only contribution
    pub fn reset_head_values(&mut self) {
        self.heads.iter_mut().for_each(Head::reset_values);
    }

    // ==================== Forward ====================

    /// Compute outputs (overwritten) and head parameters (accumulated)
    ///
    /// Head parameter values are added to whatever they already hold, so a
    /// head can collect contributions from several calls within a step.
    pub fn forward_propagation(&mut self, hidden: &HiddenLayer) {
        let weights = self.weights.read();
        let hidden = hidden.neurons();
        assert_eq!(
            hidden.len(),
            weights.controller_size,
            "Hidden layer size must match output weights"
        );

        for (neuron, row) in self.neurons.iter_mut().zip(weights.output_weights.outer_iter()) {
            neuron.value = sigmoid(weighted_sum(row, hidden));
        }

        for (head, per_param) in self.heads.iter_mut().zip(weights.head_weights.outer_iter()) {
            for (param, row) in per_param.outer_iter().enumerate() {
                head[param].value += weighted_sum(row, hidden);
            }
        }
    }

    // ==================== Backward ====================

    /// Backpropagate the output error and the head gradients
    ///
    /// Head parameter gradients must already be set by the addressing
    /// component. Output gradients are set to `value - known_output`; all
    /// hidden-neuron and weight gradients are accumulated.
    pub fn backward_error_propagation(&mut self, known_output: &[f64], hidden: &mut HiddenLayer) {
        assert_eq!(
            known_output.len(),
            self.neurons.len(),
            "Known output length must match output size"
        );

        for (neuron, &target) in self.neurons.iter_mut().zip(known_output) {
            neuron.gradient = neuron.value - target;
        }

        let mut weights = self.weights.write();
        let c = weights.controller_size;
        let hidden = hidden.neurons_mut();
        assert_eq!(hidden.len(), c, "Hidden layer size must match output weights");

        // Output error into the hidden layer
        for (neuron, row) in self.neurons.iter().zip(weights.output_weights.outer_iter()) {
            for (h, weight) in hidden.iter_mut().zip(row.iter()) {
                h.gradient += weight.value * neuron.gradient;
            }
        }

        // Head error into the hidden layer
        for (head, per_param) in self.heads.iter().zip(weights.head_weights.outer_iter()) {
            for (param, row) in per_param.outer_iter().enumerate() {
                let unit = &head[param];
                for (h, weight) in hidden.iter_mut().zip(row.iter()) {
                    h.gradient += unit.gradient * weight.value;
                }
            }
        }

        // Output weight gradients
        for (neuron, mut row) in self.neurons.iter().zip(weights.output_weights.outer_iter_mut()) {
            let gradient = neuron.gradient;
            for (weight, h) in row.iter_mut().zip(hidden.iter()) {
                weight.gradient += gradient * h.value;
            }
            row[c].gradient += gradient;
        }

        // Head weight gradients
        for (head, mut per_param) in self.heads.iter().zip(weights.head_weights.outer_iter_mut()) {
            for (param, mut row) in per_param.outer_iter_mut().enumerate() {
                let gradient = head[param].gradient;
                for (weight, h) in row.iter_mut().zip(hidden.iter()) {
                    weight.gradient += gradient * h.value;
                }
                row[c].gradient += gradient;
            }
        }
    }

    /// Apply `updater` to both shared weight tensors
    pub fn update_weights(&self, updater: &mut dyn WeightUpdater) {
        self.weights.write().update_weights(updater);
    }

    /// Zero neuron and head gradients of this step
    pub fn reset_gradients(&mut self) {
        self.neurons.iter_mut().for_each(Unit::reset_gradient);
        self.heads.iter_mut().for_each(Head::reset_gradients);
    }
}
