//! The complete controller network and its per-step state.
//!
//! [`NeuralController`] owns the two weight sets (hidden-layer weights and
//! output weights) behind shared handles. Every time step of a sequence gets
//! a [`StepState`] from [`NeuralController::new_step`] that owns only its own
//! neuron storage, so gradients from the whole sequence accumulate into one
//! set of weights.
//!
//! Training a sequence of length T:
//! 1. `new_step()` T times
//! 2. `forward` for t = 0..T
//! 3. `backward` for t = T-1 down to 0, after the addressing component has
//!    set head gradients for step t
//! 4. `update_weights` once, then `reset_gradients`

use crate::config::ControllerConfig;
use crate::controller::FeedForwardController;
use crate::error::Result;
use crate::factory::UnitFactory;
use crate::head::Head;
use crate::hidden::HiddenLayer;
use crate::output::{OutputLayer, OutputWeights};
use crate::read::ReadData;
use crate::unit::Unit;
use crate::updater::WeightUpdater;
use crate::Shared;
use parking_lot::RwLock;
use std::sync::Arc;

/// Address of a single trainable weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightId {
    /// Read data to hidden neuron
    Read { neuron: usize, head: usize, cell: usize },
    /// External input to hidden neuron
    Input { neuron: usize, dim: usize },
    /// Hidden neuron threshold
    Threshold { neuron: usize },
    /// Hidden neuron (or bias when `source == controller_size`) to output
    Output { output: usize, source: usize },
    /// Hidden neuron (or bias when `source == controller_size`) to head parameter
    Head { head: usize, param: usize, source: usize },
}

/// Controller weights plus output weights, shared by every step
#[derive(Debug)]
pub struct NeuralController {
    config: ControllerConfig,
    controller: Shared<FeedForwardController>,
    output: Shared<OutputWeights>,
}

impl NeuralController {
    /// Validate `config` and allocate randomly initialised weights
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;

        let mut factory = UnitFactory::new(config.seed, config.init_range);
        let controller = FeedForwardController::new(
            config.controller_size,
            config.input_size,
            config.head_count,
            config.memory_unit_size,
            &mut factory,
        );
        let output = OutputWeights::new(
            config.output_size,
            config.controller_size,
            config.head_count,
            config.memory_unit_size,
            &mut factory,
        );

        Ok(Self::from_parts(config, controller, output))
    }

    pub(crate) fn from_parts(
        config: ControllerConfig,
        controller: FeedForwardController,
        output: OutputWeights,
    ) -> Self {
        Self {
            config,
            controller: Arc::new(RwLock::new(controller)),
            output: Arc::new(RwLock::new(output)),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn controller(&self) -> &Shared<FeedForwardController> {
        &self.controller
    }

    pub fn output_weights(&self) -> &Shared<OutputWeights> {
        &self.output
    }

    /// Fresh neuron state for one time step over the shared weights
    pub fn new_step(&self) -> StepState {
        StepState {
            hidden: HiddenLayer::new(Arc::clone(&self.controller)),
            output: OutputLayer::with_weights(Arc::clone(&self.output)),
        }
    }

    /// `count` fresh steps, e.g. one per element of a sequence
    pub fn unroll(&self, count: usize) -> Vec<StepState> {
        (0..count).map(|_| self.new_step()).collect()
    }

    /// Apply `updater` to every weight in a fixed order
    ///
    /// Must only be called once all steps of a sequence have run their
    /// backward pass.
    pub fn update_weights(&self, updater: &mut dyn WeightUpdater) {
        updater.begin_pass();
        self.controller.write().apply_updates(updater);
        self.output.write().apply_updates(updater);
    }

    /// Zero every weight gradient
    pub fn reset_gradients(&self) {
        self.controller.write().reset_gradients();
        self.output.write().reset_gradients();
    }

    pub fn weight_count(&self) -> usize {
        self.controller.read().weight_count() + self.output.read().weight_count()
    }

    /// Every weight address, in update traversal order
    pub fn weight_ids(&self) -> Vec<WeightId> {
        let c = &self.config;
        let mut ids = Vec::with_capacity(self.weight_count());

        for neuron in 0..c.controller_size {
            for head in 0..c.head_count {
                for cell in 0..c.memory_unit_size {
                    ids.push(WeightId::Read { neuron, head, cell });
                }
            }
        }
        for neuron in 0..c.controller_size {
            for dim in 0..c.input_size {
                ids.push(WeightId::Input { neuron, dim });
            }
        }
        for neuron in 0..c.controller_size {
            ids.push(WeightId::Threshold { neuron });
        }
        for output in 0..c.output_size {
            for source in 0..=c.controller_size {
                ids.push(WeightId::Output { output, source });
            }
        }
        for head in 0..c.head_count {
            for param in 0..c.head_unit_size() {
                for source in 0..=c.controller_size {
                    ids.push(WeightId::Head { head, param, source });
                }
            }
        }
        ids
    }

    /// Copy of the weight at `id`
    pub fn weight(&self, id: WeightId) -> Unit {
        match id {
            WeightId::Read { neuron, head, cell } => {
                self.controller.read().read_weights()[[neuron, head, cell]]
            }
            WeightId::Input { neuron, dim } => self.controller.read().input_weights()[[neuron, dim]],
            WeightId::Threshold { neuron } => self.controller.read().thresholds()[neuron],
            WeightId::Output { output, source } => self.output.read().output_weights()[[output, source]],
            WeightId::Head { head, param, source } => {
                self.output.read().head_weights()[[head, param, source]]
            }
        }
    }

    /// Overwrite the value of the weight at `id`, leaving its gradient
    pub fn set_weight_value(&self, id: WeightId, value: f64) {
        match id {
            WeightId::Read { neuron, head, cell } => {
                self.controller.write().read_weights_mut()[[neuron, head, cell]].value = value
            }
            WeightId::Input { neuron, dim } => {
                self.controller.write().input_weights_mut()[[neuron, dim]].value = value
            }
            WeightId::Threshold { neuron } => {
                self.controller.write().thresholds_mut()[neuron].value = value
            }
            WeightId::Output { output, source } => {
                self.output.write().output_weights_mut()[[output, source]].value = value
            }
            WeightId::Head { head, param, source } => {
                self.output.write().head_weights_mut()[[head, param, source]].value = value
            }
        }
    }
}

/// Neuron state of one time step
#[derive(Debug)]
pub struct StepState {
    pub hidden: HiddenLayer,
    pub output: OutputLayer,
}

impl StepState {
    /// Hidden then output forward pass
    ///
    /// Head values are zeroed first so that each step carries exactly one
    /// contribution from the output layer.
    pub fn forward(&mut self, input: &[f64], reads: &[ReadData]) {
        self.output.reset_head_values();
        self.hidden.forward_propagation(input, reads);
        self.output.forward_propagation(&self.hidden);
    }

    /// Output then hidden backward pass
    ///
    /// Head gradients of this step must already be populated. Read data
    /// gradients are accumulated into `reads`.
    pub fn backward(&mut self, known_output: &[f64], input: &[f64], reads: &mut [ReadData]) {
        self.output
            .backward_error_propagation(known_output, &mut self.hidden);
        self.hidden.backward_error_propagation(input, reads);
    }

    pub fn output(&self) -> Vec<f64> {
        self.output.output()
    }

    pub fn heads(&self) -> &[Head] {
        self.output.heads()
    }

    pub fn heads_mut(&mut self) -> &mut [Head] {
        self.output.heads_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::GradientDescent;
    use approx::assert_relative_eq;

    fn tiny() -> NeuralController {
        NeuralController::new(ControllerConfig::tiny()).unwrap()
    }

    /// Cross-entropy of a sigmoid output plus a linear head term, whose
    /// gradient with respect to each head parameter is `head_grad`
    fn sequence_loss(
        net: &NeuralController,
        inputs: &[Vec<f64>],
        reads: &[Vec<f64>],
        targets: &[Vec<f64>],
        head_grad: f64,
    ) -> f64 {
        let mut loss = 0.0;
        for ((input, read), target) in inputs.iter().zip(reads).zip(targets) {
            let mut step = net.new_step();
            step.forward(input, &[ReadData::from_values(read)]);
            for (y, t) in step.output().iter().zip(target) {
                loss -= t * y.ln() + (1.0 - t) * (1.0 - y).ln();
            }
            for head in step.heads() {
                loss += head_grad * head.values().iter().sum::<f64>();
            }
        }
        loss
    }

    struct Sequence {
        inputs: Vec<Vec<f64>>,
        reads: Vec<Vec<f64>>,
        targets: Vec<Vec<f64>>,
    }

    fn sequence() -> Sequence {
        Sequence {
            inputs: vec![vec![0.5, -0.3], vec![1.0, 0.0], vec![-0.7, 0.9]],
            reads: vec![vec![0.2, 0.8], vec![-0.4, 0.1], vec![0.6, 0.6]],
            targets: vec![vec![1.0], vec![0.0], vec![1.0]],
        }
    }

    /// Forward all steps, then backward in reverse with constant head gradients
    fn accumulate(net: &NeuralController, seq: &Sequence, head_grad: f64) -> Vec<Vec<ReadData>> {
        let mut steps = net.unroll(seq.inputs.len());
        let mut reads: Vec<Vec<ReadData>> = seq
            .reads
            .iter()
            .map(|r| vec![ReadData::from_values(r)])
            .collect();

        for (t, step) in steps.iter_mut().enumerate() {
            step.forward(&seq.inputs[t], &reads[t]);
        }
        for t in (0..steps.len()).rev() {
            for head in steps[t].heads_mut() {
                for i in 0..head.len() {
                    head[i].gradient = head_grad;
                }
            }
            steps[t].backward(&seq.targets[t], &seq.inputs[t], &mut reads[t]);
        }
        reads
    }

    // ==================== Structure Tests ====================

    #[test]
    fn test_weight_ids_cover_every_weight() {
        let net = tiny();
        let ids = net.weight_ids();
        assert_eq!(ids.len(), net.weight_count());

        let mut order = Vec::new();
        net.update_weights(&mut |u: &mut Unit| order.push(u.value));
        let by_id: Vec<f64> = ids.iter().map(|&id| net.weight(id).value).collect();
        assert_eq!(order, by_id);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ControllerConfig {
            output_size: 0,
            ..ControllerConfig::tiny()
        };
        assert!(NeuralController::new(config).is_err());
    }

    #[test]
    fn test_steps_share_weights() {
        let net = tiny();
        let a = net.new_step();
        let b = net.new_step();
        assert!(Arc::ptr_eq(a.hidden.controller(), b.hidden.controller()));
        assert!(Arc::ptr_eq(a.output.weights(), b.output.weights()));
    }

    // ==================== Forward Tests ====================

    #[test]
    fn test_forward_deterministic() {
        let net = tiny();
        let reads = vec![ReadData::from_values(&[0.3, -0.1])];
        let mut a = net.new_step();
        let mut b = net.new_step();
        a.forward(&[0.2, 0.4], &reads);
        b.forward(&[0.2, 0.4], &reads);

        assert_eq!(a.output(), b.output());
        assert_eq!(a.heads(), b.heads());
        // Forwarding the same step again yields the same heads
        a.forward(&[0.2, 0.4], &reads);
        assert_eq!(a.heads(), b.heads());
    }

    #[test]
    fn test_end_to_end_half_output() {
        let config = ControllerConfig {
            controller_size: 1,
            input_size: 1,
            output_size: 1,
            head_count: 0,
            ..ControllerConfig::default()
        };
        let net = NeuralController::new(config).unwrap();
        net.set_weight_value(WeightId::Input { neuron: 0, dim: 0 }, 0.0);
        net.set_weight_value(WeightId::Threshold { neuron: 0 }, 0.0);
        net.set_weight_value(WeightId::Output { output: 0, source: 0 }, 0.0);
        net.set_weight_value(WeightId::Output { output: 0, source: 1 }, 0.0);

        assert_eq!(net.controller().read().pre_activation(0, &[0.0], &[]), 0.0);

        let mut step = net.new_step();
        step.forward(&[0.0], &[]);
        assert_eq!(step.hidden.values(), vec![0.5]);
        assert_eq!(step.output(), vec![0.5]);
    }

    // ==================== Gradient Tests ====================

    #[test]
    fn test_finite_difference_every_weight() {
        let net = tiny();
        let seq = sequence();
        let head_grad = 0.01;
        accumulate(&net, &seq, head_grad);

        let eps = 1e-5;
        for id in net.weight_ids() {
            let analytic = net.weight(id).gradient;
            let value = net.weight(id).value;

            net.set_weight_value(id, value + eps);
            let plus = sequence_loss(&net, &seq.inputs, &seq.reads, &seq.targets, head_grad);
            net.set_weight_value(id, value - eps);
            let minus = sequence_loss(&net, &seq.inputs, &seq.reads, &seq.targets, head_grad);
            net.set_weight_value(id, value);

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (analytic - numeric).abs() < 1e-7,
                "{:?}: analytic {} vs numeric {}",
                id,
                analytic,
                numeric
            );
        }
    }

    #[test]
    fn test_finite_difference_read_data() {
        let net = tiny();
        let seq = sequence();
        let reads = accumulate(&net, &seq, 0.0);

        let eps = 1e-5;
        for t in 0..seq.reads.len() {
            for cell in 0..2 {
                let mut plus = seq.reads.clone();
                plus[t][cell] += eps;
                let mut minus = seq.reads.clone();
                minus[t][cell] -= eps;

                let numeric = (sequence_loss(&net, &seq.inputs, &plus, &seq.targets, 0.0)
                    - sequence_loss(&net, &seq.inputs, &minus, &seq.targets, 0.0))
                    / (2.0 * eps);
                let analytic = reads[t][0].data[cell].gradient;
                assert_relative_eq!(analytic, numeric, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_gradients_sum_over_steps() {
        let net = tiny();
        let seq = sequence();
        let id = WeightId::Output { output: 0, source: 2 };

        // Bias gradient of a sigmoid output equals Σ_t (y_t - target_t)
        let mut expected = 0.0;
        for t in 0..seq.inputs.len() {
            let mut step = net.new_step();
            step.forward(&seq.inputs[t], &[ReadData::from_values(&seq.reads[t])]);
            expected += step.output()[0] - seq.targets[t][0];
        }

        accumulate(&net, &seq, 0.0);
        assert_relative_eq!(net.weight(id).gradient, expected, epsilon = 1e-12);
    }

    // ==================== Update Tests ====================

    #[test]
    fn test_zero_rate_update_round_trip() {
        let net = tiny();
        let before: Vec<f64> = net.weight_ids().iter().map(|&id| net.weight(id).value).collect();
        accumulate(&net, &sequence(), 0.1);
        assert!(net.weight_ids().iter().any(|&id| net.weight(id).gradient != 0.0));

        net.update_weights(&mut GradientDescent::new(0.0));

        for (&id, &value) in net.weight_ids().iter().zip(&before) {
            let unit = net.weight(id);
            assert_eq!(unit.value, value);
            assert_eq!(unit.gradient, 0.0);
        }
    }

    #[test]
    fn test_gradient_step_reduces_loss() {
        let net = tiny();
        let seq = sequence();
        let before = sequence_loss(&net, &seq.inputs, &seq.reads, &seq.targets, 0.0);

        accumulate(&net, &seq, 0.0);
        net.update_weights(&mut GradientDescent::new(0.05));
        net.reset_gradients();

        let after = sequence_loss(&net, &seq.inputs, &seq.reads, &seq.targets, 0.0);
        assert!(after < before, "loss {} did not drop below {}", after, before);
    }

    #[test]
    fn test_reset_gradients() {
        let net = tiny();
        accumulate(&net, &sequence(), 0.3);
        net.reset_gradients();
        assert!(net.weight_ids().iter().all(|&id| net.weight(id).gradient == 0.0));
    }
}
