//! Sequence training driver.
//!
//! Runs the full training step over one sequence: unroll T steps over the
//! shared weights, forward t = 0..T, backward t = T-1..0, one weight update,
//! then reset every gradient. Memory reads and head gradients come from a
//! [`MemoryPort`], the contract with the external addressing/memory component.

use crate::config::TrainingConfig;
use crate::error::{ControllerError, Result};
use crate::head::Head;
use crate::network::{NeuralController, StepState};
use crate::read::ReadData;
use crate::updater::UpdateRule;
use tracing::{debug, info, warn};

/// Contract with the memory and addressing component
pub trait MemoryPort {
    /// Called before the first step of every sequence
    fn reset(&mut self) {}

    /// Read vectors for `step`, one per head
    ///
    /// `previous_heads` are the head parameters produced at `step - 1` and
    /// are empty for the first step.
    fn reads(&mut self, step: usize, previous_heads: &[Head]) -> Vec<ReadData>;

    /// Set head parameter gradients for `step` before its output backward pass
    ///
    /// `next_reads` are the reads of `step + 1`, whose gradients have already
    /// been accumulated by the hidden layer; `None` for the last step.
    fn backpropagate(&mut self, step: usize, heads: &mut [Head], next_reads: Option<&[ReadData]>);
}

/// Memory that always returns the same read vectors and ignores the heads
#[derive(Debug, Clone)]
pub struct StaticMemory {
    reads: Vec<Vec<f64>>,
}

impl StaticMemory {
    /// One constant read vector per head
    pub fn new(reads: Vec<Vec<f64>>) -> Self {
        Self { reads }
    }

    /// `head_count` zero read vectors of width `memory_unit_size`
    pub fn zeros(head_count: usize, memory_unit_size: usize) -> Self {
        Self::new(vec![vec![0.0; memory_unit_size]; head_count])
    }
}

impl MemoryPort for StaticMemory {
    fn reads(&mut self, _step: usize, _previous_heads: &[Head]) -> Vec<ReadData> {
        self.reads.iter().map(|r| ReadData::from_values(r)).collect()
    }

    fn backpropagate(&mut self, _step: usize, heads: &mut [Head], _next_reads: Option<&[ReadData]>) {
        heads.iter_mut().for_each(Head::reset_gradients);
    }
}

/// Cross-entropy of sigmoid outputs against targets
///
/// Its gradient with respect to each output pre-activation is `y - t`, the
/// delta used by the output layer. Saturated outputs yield infinities.
pub fn cross_entropy(output: &[f64], target: &[f64]) -> f64 {
    output
        .iter()
        .zip(target)
        .map(|(&y, &t)| -(t * y.ln() + (1.0 - t) * (1.0 - y).ln()))
        .sum()
}

/// Sum of squared errors
pub fn squared_error(output: &[f64], target: &[f64]) -> f64 {
    output
        .iter()
        .zip(target)
        .map(|(y, t)| (y - t) * (y - t))
        .sum()
}

/// Forward-pass record of one sequence
struct Unrolled {
    steps: Vec<StepState>,
    reads: Vec<Vec<ReadData>>,
}

/// Loss figures for one trained sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceReport {
    /// Cross-entropy summed over steps and outputs
    pub cross_entropy: f64,
    /// Squared error averaged over steps and outputs
    pub mean_squared_error: f64,
    pub steps: usize,
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingResult {
    pub converged: bool,
    pub iterations: usize,
    pub final_loss: f64,
    pub losses: Vec<f64>,
}

/// Trains a [`NeuralController`] one sequence at a time
pub struct SequenceTrainer {
    pub network: NeuralController,
    pub config: TrainingConfig,
    rule: UpdateRule,
    /// Sequences trained so far
    pub iteration: usize,
}

impl SequenceTrainer {
    pub fn new(network: NeuralController, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let rule = config.rule.build();
        Ok(Self {
            network,
            config,
            rule,
            iteration: 0,
        })
    }

    pub fn rule(&self) -> &UpdateRule {
        &self.rule
    }

    fn unroll(&self, inputs: &[Vec<f64>], memory: &mut dyn MemoryPort) -> Unrolled {
        memory.reset();
        let mut steps = self.network.unroll(inputs.len());
        let mut reads = Vec::with_capacity(inputs.len());

        for (t, input) in inputs.iter().enumerate() {
            let step_reads = match t {
                0 => memory.reads(0, &[]),
                _ => memory.reads(t, steps[t - 1].heads()),
            };
            steps[t].forward(input, &step_reads);
            reads.push(step_reads);
        }

        Unrolled { steps, reads }
    }

    /// Forward pass only; returns the output of every step
    pub fn run_sequence(&self, inputs: &[Vec<f64>], memory: &mut dyn MemoryPort) -> Vec<Vec<f64>> {
        self.unroll(inputs, memory)
            .steps
            .iter()
            .map(StepState::output)
            .collect()
    }

    /// Forward, backward and update over one sequence
    ///
    /// An empty sequence leaves the weights and the update rule untouched.
    pub fn train_sequence(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        memory: &mut dyn MemoryPort,
    ) -> Result<SequenceReport> {
        if inputs.len() != targets.len() {
            return Err(ControllerError::SequenceLength {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if inputs.is_empty() {
            debug!(iteration = self.iteration, "skipped empty sequence");
            return Ok(SequenceReport {
                cross_entropy: 0.0,
                mean_squared_error: 0.0,
                steps: 0,
            });
        }

        let Unrolled { mut steps, mut reads } = self.unroll(inputs, memory);

        let mut ce = 0.0;
        let mut se = 0.0;
        for (step, target) in steps.iter().zip(targets) {
            let output = step.output();
            ce += cross_entropy(&output, target);
            se += squared_error(&output, target);
        }

        // Reverse time order: head gradients at t depend on read gradients at t + 1
        for t in (0..steps.len()).rev() {
            let (current, later) = reads.split_at_mut(t + 1);
            let next_reads = later.first().map(Vec::as_slice);
            memory.backpropagate(t, steps[t].heads_mut(), next_reads);
            steps[t].backward(&targets[t], &inputs[t], &mut current[t]);
        }

        self.network.update_weights(&mut self.rule);
        self.network.reset_gradients();
        self.iteration += 1;

        let outputs = self.network.config().output_size * steps.len();
        let report = SequenceReport {
            cross_entropy: ce,
            mean_squared_error: se / outputs as f64,
            steps: steps.len(),
        };

        if !report.cross_entropy.is_finite() {
            warn!(iteration = self.iteration, loss = report.cross_entropy, "non-finite sequence loss");
        }
        debug!(
            iteration = self.iteration,
            steps = report.steps,
            cross_entropy = report.cross_entropy,
            mse = report.mean_squared_error,
            "trained sequence"
        );
        if self.config.log_interval > 0 && self.iteration % self.config.log_interval == 0 {
            info!(
                iteration = self.iteration,
                rule = self.rule.name(),
                cross_entropy = report.cross_entropy,
                mse = report.mean_squared_error,
                "training progress"
            );
        }

        Ok(report)
    }

    /// Train on sequences from `next_sequence` until the cross-entropy drops
    /// below `target_loss` or `max_iterations` sequences have been used
    pub fn train<F>(
        &mut self,
        mut next_sequence: F,
        memory: &mut dyn MemoryPort,
        max_iterations: usize,
        target_loss: f64,
    ) -> Result<TrainingResult>
    where
        F: FnMut(usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>),
    {
        let mut losses = Vec::new();
        let mut converged = false;

        for i in 0..max_iterations {
            let (inputs, targets) = next_sequence(i);
            let report = self.train_sequence(&inputs, &targets, memory)?;
            losses.push(report.cross_entropy);

            if report.cross_entropy < target_loss {
                converged = true;
                info!(iterations = i + 1, loss = report.cross_entropy, "converged");
                break;
            }
        }

        Ok(TrainingResult {
            converged,
            iterations: losses.len(),
            final_loss: losses.last().copied().unwrap_or(f64::INFINITY),
            losses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, RuleConfig};
    use crate::persistence::ControllerSnapshot;
    use approx::assert_relative_eq;

    fn trainer(config: TrainingConfig) -> SequenceTrainer {
        let network = NeuralController::new(ControllerConfig {
            controller_size: 4,
            input_size: 2,
            output_size: 1,
            head_count: 1,
            memory_unit_size: 2,
            ..ControllerConfig::default()
        })
        .unwrap();
        SequenceTrainer::new(network, config).unwrap()
    }

    /// XOR of the two inputs, one pattern per step
    fn xor_sequence() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let inputs = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        let targets = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
        (inputs, targets)
    }

    /// Records the call sequence and sets a fixed head gradient
    struct RecordingMemory {
        calls: Vec<String>,
        head_gradient: f64,
    }

    impl MemoryPort for RecordingMemory {
        fn reset(&mut self) {
            self.calls.push("reset".to_string());
        }

        fn reads(&mut self, step: usize, previous_heads: &[Head]) -> Vec<ReadData> {
            self.calls.push(format!("read {} {}", step, previous_heads.len()));
            vec![ReadData::from_values(&[0.5, -0.5])]
        }

        fn backpropagate(&mut self, step: usize, heads: &mut [Head], next_reads: Option<&[ReadData]>) {
            let grads_ready = next_reads
                .map(|r| r[0].gradients().iter().any(|&g| g != 0.0))
                .unwrap_or(true);
            self.calls.push(format!("back {} {}", step, grads_ready));
            for head in heads {
                for i in 0..head.len() {
                    head[i].gradient = self.head_gradient;
                }
            }
        }
    }

    #[test]
    fn test_loss_functions() {
        assert_relative_eq!(squared_error(&[0.5, 1.0], &[1.0, 1.0]), 0.25);
        assert_relative_eq!(cross_entropy(&[0.5], &[1.0]), std::f64::consts::LN_2);
        assert_relative_eq!(cross_entropy(&[0.5], &[0.0]), std::f64::consts::LN_2);
    }

    #[test]
    fn test_sequence_length_mismatch() {
        let mut t = trainer(TrainingConfig::default());
        let mut memory = StaticMemory::zeros(1, 2);
        let result = t.train_sequence(&[vec![0.0, 0.0]], &[], &mut memory);
        assert!(matches!(
            result,
            Err(ControllerError::SequenceLength { inputs: 1, targets: 0 })
        ));
        assert_eq!(t.iteration, 0);
    }

    #[test]
    fn test_memory_call_order() {
        let mut t = trainer(TrainingConfig::gradient_descent(0.1));
        let mut memory = RecordingMemory {
            calls: Vec::new(),
            head_gradient: 0.01,
        };
        let (inputs, targets) = xor_sequence();
        t.train_sequence(&inputs[..3], &targets[..3], &mut memory).unwrap();

        assert_eq!(
            memory.calls,
            vec![
                "reset",
                "read 0 0",
                "read 1 1",
                "read 2 1",
                "back 2 true",
                "back 1 true",
                "back 0 true",
            ]
        );
    }

    #[test]
    fn test_gradients_reset_after_sequence() {
        let mut t = trainer(TrainingConfig::default());
        let mut memory = StaticMemory::new(vec![vec![0.3, 0.7]]);
        let (inputs, targets) = xor_sequence();
        t.train_sequence(&inputs, &targets, &mut memory).unwrap();

        let net = &t.network;
        assert!(net.weight_ids().iter().all(|&id| net.weight(id).gradient == 0.0));
        assert_eq!(t.iteration, 1);
    }

    #[test]
    fn test_report_matches_run() {
        let mut t = trainer(TrainingConfig::gradient_descent(0.0));
        let mut memory = StaticMemory::zeros(1, 2);
        let (inputs, targets) = xor_sequence();

        let outputs = t.run_sequence(&inputs, &mut memory);
        let expected: f64 = outputs
            .iter()
            .zip(&targets)
            .map(|(y, target)| cross_entropy(y, target))
            .sum();

        let report = t.train_sequence(&inputs, &targets, &mut memory).unwrap();
        assert_relative_eq!(report.cross_entropy, expected, epsilon = 1e-12);
        assert_eq!(report.steps, 4);
        // Zero learning rate leaves the network unchanged
        assert_eq!(t.run_sequence(&inputs, &mut memory), outputs);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut t = trainer(TrainingConfig::gradient_descent(0.5));
        let mut memory = StaticMemory::zeros(1, 2);

        let result = t.train(|_| xor_sequence(), &mut memory, 300, 0.0).unwrap();
        assert_eq!(result.losses.len(), 300);
        assert!(!result.converged);
        assert!(
            result.final_loss < result.losses[0],
            "loss went from {} to {}",
            result.losses[0],
            result.final_loss
        );
    }

    #[test]
    fn test_train_stops_at_target() {
        let mut t = trainer(TrainingConfig::gradient_descent(0.1));
        let mut memory = StaticMemory::zeros(1, 2);
        let result = t.train(|_| xor_sequence(), &mut memory, 50, f64::INFINITY).unwrap();
        assert!(result.converged);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_iterations_count_per_call() {
        let mut t = trainer(TrainingConfig::gradient_descent(0.1));
        let mut memory = StaticMemory::zeros(1, 2);
        t.train(|_| xor_sequence(), &mut memory, 3, 0.0).unwrap();

        let result = t.train(|_| xor_sequence(), &mut memory, 2, 0.0).unwrap();
        assert_eq!(result.iterations, 2);
        assert_eq!(t.iteration, 5);
    }

    #[test]
    fn test_empty_sequence_leaves_weights() {
        let mut t = trainer(TrainingConfig {
            rule: RuleConfig::Momentum {
                learning_rate: 0.1,
                momentum: 0.9,
            },
            ..TrainingConfig::default()
        });
        let mut memory = StaticMemory::zeros(1, 2);
        let (inputs, targets) = xor_sequence();
        t.train_sequence(&inputs, &targets, &mut memory).unwrap();

        let before = ControllerSnapshot::capture(&t.network);
        let report = t.train_sequence(&[], &[], &mut memory).unwrap();

        assert_eq!(report.steps, 0);
        assert_eq!(report.cross_entropy, 0.0);
        assert_eq!(ControllerSnapshot::capture(&t.network), before);
        assert_eq!(t.iteration, 1);
    }
}
