//! Feed-forward controller: the weights of the hidden layer.
//!
//! Each hidden neuron sums three contributions:
//! - the read vector of every head, through `read_weights[neuron][head][cell]`
//! - the external input, through `input_weights[neuron][dim]`
//! - its own threshold
//!
//! The controller only owns weights. Neuron activations for a time step live
//! in a [`HiddenLayer`](crate::hidden::HiddenLayer), which applies the
//! nonlinearity and shares one controller across every step of a sequence.

use crate::factory::UnitFactory;
use crate::read::ReadData;
use crate::unit::Unit;
use crate::updater::{apply, WeightUpdater};
use ndarray::{Array1, Array2, Array3, Axis};

/// Hidden-layer weights shared by every time step of a sequence
#[derive(Debug, Clone)]
pub struct FeedForwardController {
    controller_size: usize,
    input_size: usize,
    head_count: usize,
    memory_unit_size: usize,
    /// Weights from read data to hidden neurons: [neuron][head][cell]
    read_weights: Array3<Unit>,
    /// Weights from input to hidden neurons: [neuron][dim]
    input_weights: Array2<Unit>,
    /// Hidden neuron thresholds: [neuron]
    thresholds: Array1<Unit>,
}

impl FeedForwardController {
    /// Allocate randomly initialised controller weights
    pub fn new(
        controller_size: usize,
        input_size: usize,
        head_count: usize,
        memory_unit_size: usize,
        factory: &mut UnitFactory,
    ) -> Self {
        let read_weights = factory.tensor3(controller_size, head_count, memory_unit_size);
        let input_weights = factory.tensor2(controller_size, input_size);
        let thresholds = factory.vector(controller_size);

        Self {
            controller_size,
            input_size,
            head_count,
            memory_unit_size,
            read_weights,
            input_weights,
            thresholds,
        }
    }

    /// Rebuild a controller from existing tensors; shapes define the sizes
    pub(crate) fn from_parts(
        read_weights: Array3<Unit>,
        input_weights: Array2<Unit>,
        thresholds: Array1<Unit>,
    ) -> Self {
        let (controller_size, head_count, memory_unit_size) = read_weights.dim();
        let input_size = input_weights.ncols();
        assert_eq!(input_weights.nrows(), controller_size);
        assert_eq!(thresholds.len(), controller_size);

        Self {
            controller_size,
            input_size,
            head_count,
            memory_unit_size,
            read_weights,
            input_weights,
            thresholds,
        }
    }

    pub fn controller_size(&self) -> usize {
        self.controller_size
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn head_count(&self) -> usize {
        self.head_count
    }

    pub fn memory_unit_size(&self) -> usize {
        self.memory_unit_size
    }

    pub fn read_weights(&self) -> &Array3<Unit> {
        &self.read_weights
    }

    pub fn read_weights_mut(&mut self) -> &mut Array3<Unit> {
        &mut self.read_weights
    }

    pub fn input_weights(&self) -> &Array2<Unit> {
        &self.input_weights
    }

    pub fn input_weights_mut(&mut self) -> &mut Array2<Unit> {
        &mut self.input_weights
    }

    pub fn thresholds(&self) -> &Array1<Unit> {
        &self.thresholds
    }

    pub fn thresholds_mut(&mut self) -> &mut Array1<Unit> {
        &mut self.thresholds
    }

    fn check_shapes(&self, input: &[f64], reads: &[ReadData]) {
        assert_eq!(input.len(), self.input_size, "Input length must match input size");
        assert_eq!(reads.len(), self.head_count, "One read vector per head required");
        for read in reads {
            assert_eq!(
                read.len(),
                self.memory_unit_size,
                "Read vector width must match memory unit size"
            );
        }
    }

    // ==================== Forward ====================

    /// Pre-activation sum of one hidden neuron, folded into `temp_sum`
    ///
    /// Contributions are added to the running sum in a fixed order: read data
    /// (head by head, cell by cell), then input, then threshold. The caller
    /// applies the nonlinearity.
    pub fn forward_propagate(
        &self,
        temp_sum: f64,
        neuron: usize,
        input: &[f64],
        reads: &[ReadData],
    ) -> f64 {
        self.check_shapes(input, reads);

        let mut sum = temp_sum;
        sum = self.read_contribution(neuron, reads, sum);
        sum = self.input_contribution(neuron, input, sum);
        sum += self.thresholds[neuron].value;
        sum
    }

    /// Pre-activation sum of one hidden neuron starting from zero
    pub fn pre_activation(&self, neuron: usize, input: &[f64], reads: &[ReadData]) -> f64 {
        self.forward_propagate(0.0, neuron, input, reads)
    }

    fn read_contribution(&self, neuron: usize, reads: &[ReadData], mut sum: f64) -> f64 {
        let per_head = self.read_weights.index_axis(Axis(0), neuron);
        for (head_weights, read) in per_head.outer_iter().zip(reads) {
            for (weight, cell) in head_weights.iter().zip(read.data.iter()) {
                sum += weight.value * cell.value;
            }
        }
        sum
    }

    fn input_contribution(&self, neuron: usize, input: &[f64], mut sum: f64) -> f64 {
        let weights = self.input_weights.row(neuron);
        for (weight, &x) in weights.iter().zip(input) {
            sum += weight.value * x;
        }
        sum
    }

    // ==================== Backward ====================

    /// Scatter hidden-neuron gradients into read data and weight gradients
    ///
    /// `hidden_gradients` must already include the nonlinearity derivative.
    /// Every target is accumulated, never overwritten.
    pub fn backward_propagate(
        &mut self,
        hidden_gradients: &[f64],
        input: &[f64],
        reads: &mut [ReadData],
    ) {
        self.check_shapes(input, reads);
        assert_eq!(
            hidden_gradients.len(),
            self.controller_size,
            "One gradient per hidden neuron required"
        );

        self.read_gradients(hidden_gradients, reads);
        self.input_weight_gradients(hidden_gradients, input);
        self.threshold_gradients(hidden_gradients);
    }

    fn read_gradients(&mut self, hidden_gradients: &[f64], reads: &mut [ReadData]) {
        for (mut per_head, &gradient) in self
            .read_weights
            .outer_iter_mut()
            .zip(hidden_gradients)
        {
            for (mut head_weights, read) in per_head.outer_iter_mut().zip(reads.iter_mut()) {
                for (weight, cell) in head_weights.iter_mut().zip(read.data.iter_mut()) {
                    cell.gradient += gradient * weight.value;
                    weight.gradient += gradient * cell.value;
                }
            }
        }
    }

    fn input_weight_gradients(&mut self, hidden_gradients: &[f64], input: &[f64]) {
        for (mut weights, &gradient) in self.input_weights.outer_iter_mut().zip(hidden_gradients) {
            for (weight, &x) in weights.iter_mut().zip(input) {
                weight.gradient += gradient * x;
            }
        }
    }

    fn threshold_gradients(&mut self, hidden_gradients: &[f64]) {
        for (threshold, &gradient) in self.thresholds.iter_mut().zip(hidden_gradients) {
            threshold.gradient += gradient;
        }
    }

    // ==================== Update ====================

    /// Apply `updater` to read weights, input weights and thresholds as one pass
    pub fn update_weights(&mut self, updater: &mut dyn WeightUpdater) {
        updater.begin_pass();
        self.apply_updates(updater);
    }

    /// Traversal without starting a pass, for callers updating several tensors
    pub(crate) fn apply_updates(&mut self, updater: &mut dyn WeightUpdater) {
        apply(updater, self.read_weights.iter_mut());
        apply(updater, self.input_weights.iter_mut());
        apply(updater, self.thresholds.iter_mut());
    }

    pub fn reset_gradients(&mut self) {
        self.read_weights
            .iter_mut()
            .chain(self.input_weights.iter_mut())
            .chain(self.thresholds.iter_mut())
            .for_each(Unit::reset_gradient);
    }

    /// Total number of trainable units
    pub fn weight_count(&self) -> usize {
        self.read_weights.len() + self.input_weights.len() + self.thresholds.len()
    }
}
