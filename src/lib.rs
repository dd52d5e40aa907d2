//! Feed-forward controller for a Neural Turing Machine.
//!
//! One hidden sigmoid layer reads the external input and the memory read
//! vectors; the output layer produces sigmoid outputs plus the raw parameters
//! of every memory head. Weights are shared by all time steps of a sequence
//! and trained with manual reverse-mode backpropagation through time.
//!
//! ```text
//! input ─┐
//!        ├─► hidden (sigmoid) ─┬─► outputs (sigmoid)
//! reads ─┘                     └─► head parameters (linear)
//! ```

pub mod activation;
pub mod config;
pub mod controller;
pub mod error;
pub mod factory;
pub mod head;
pub mod hidden;
pub mod network;
pub mod output;
pub mod persistence;
pub mod read;
pub mod trainer;
pub mod unit;
pub mod updater;

/// Weights owned once and borrowed by every unrolled step
pub type Shared<T> = std::sync::Arc<parking_lot::RwLock<T>>;

pub use config::{ControllerConfig, RuleConfig, TrainingConfig};
pub use controller::FeedForwardController;
pub use error::{ControllerError, Result};
pub use factory::UnitFactory;
pub use head::Head;
pub use hidden::HiddenLayer;
pub use network::{NeuralController, StepState, WeightId};
pub use output::{OutputLayer, OutputWeights};
pub use persistence::ControllerSnapshot;
pub use read::ReadData;
pub use trainer::{MemoryPort, SequenceReport, SequenceTrainer, StaticMemory, TrainingResult};
pub use unit::Unit;
pub use updater::{AdamW, GradientDescent, Momentum, RmsProp, UpdateRule, WeightUpdater};
