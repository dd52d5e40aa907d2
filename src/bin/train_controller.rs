//! Controller training demo
//!
//! Trains a small controller on random parity sequences with a constant
//! memory read, then optionally saves the weights.
//!
//! Usage: train_controller [--save <path>] [--rule gd|rmsprop|adamw]
//! Set RUST_LOG=debug for per-sequence loss lines.

use ntm_controller::{
    ControllerConfig, NeuralController, Result, RuleConfig, SequenceTrainer, StaticMemory,
    TrainingConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEQUENCE_LENGTH: usize = 8;

/// Random two-bit inputs with their XOR as target
fn parity_sequence(rng: &mut StdRng) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    (0..SEQUENCE_LENGTH)
        .map(|_| {
            let a = rng.random_bool(0.5);
            let b = rng.random_bool(0.5);
            let bit = |x: bool| if x { 1.0 } else { 0.0 };
            (vec![bit(a), bit(b)], vec![bit(a ^ b)])
        })
        .unzip()
}

fn rule_from_args(args: &[String]) -> RuleConfig {
    let name = args
        .iter()
        .position(|a| a == "--rule")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str);

    match name {
        Some("gd") => RuleConfig::GradientDescent { learning_rate: 0.5 },
        Some("adamw") => RuleConfig::AdamW { learning_rate: 0.01 },
        _ => RuleConfig::RmsProp {
            learning_rate: 0.01,
            decay: 0.95,
            momentum: 0.9,
            epsilon: 1e-4,
        },
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let save_path = args
        .iter()
        .position(|a| a == "--save")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let config = ControllerConfig {
        controller_size: 8,
        ..ControllerConfig::tiny()
    };
    println!("=== Controller Training: XOR sequences ===\n");
    println!(
        "Hidden: {}, inputs: {}, outputs: {}, heads: {} (M = {})",
        config.controller_size,
        config.input_size,
        config.output_size,
        config.head_count,
        config.memory_unit_size
    );

    let network = NeuralController::new(config.clone())?;
    println!("Weights: {}", network.weight_count());

    let training = TrainingConfig {
        rule: rule_from_args(&args),
        log_interval: 250,
    };
    let mut trainer = SequenceTrainer::new(network, training)?;
    println!("Rule: {}\n", trainer.rule().name());

    let mut memory = StaticMemory::zeros(config.head_count, config.memory_unit_size);
    let mut rng = StdRng::seed_from_u64(7);
    let result = trainer.train(|_| parity_sequence(&mut rng), &mut memory, 5000, 0.05)?;

    println!("\nTraining Result:");
    println!("  Converged: {}", result.converged);
    println!("  Sequences: {}", result.iterations);
    println!("  Final Loss: {:.6}", result.final_loss);

    let mut correct = 0;
    let mut total = 0;
    for _ in 0..20 {
        let (inputs, targets) = parity_sequence(&mut rng);
        let outputs = trainer.run_sequence(&inputs, &mut memory);
        for (y, t) in outputs.iter().zip(&targets) {
            total += 1;
            if (y[0] > 0.5) == (t[0] > 0.5) {
                correct += 1;
            }
        }
    }
    println!("  Hard Accuracy: {:.2}%", 100.0 * correct as f64 / total as f64);

    if let Some(path) = save_path {
        trainer.network.save(&path)?;
        println!("\nSaved weights to {}", path);
    }

    Ok(())
}
