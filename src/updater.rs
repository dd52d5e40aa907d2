//! Weight update rules.
//!
//! An update rule consumes each unit's accumulated gradient, adjusts the unit's
//! value and resets the gradient to zero. Rules that keep per-weight state
//! (momentum, RMSProp, AdamW) key that state by traversal position, so the
//! network must always visit its tensors in the same order. A traversal starts
//! with [`WeightUpdater::begin_pass`].

use crate::unit::Unit;

/// Per-unit update applied once per completed sequence
pub trait WeightUpdater {
    /// Called once before each full traversal of the network's weights
    fn begin_pass(&mut self) {}

    /// Update one unit and reset its gradient
    fn update(&mut self, unit: &mut Unit);
}

impl<F> WeightUpdater for F
where
    F: FnMut(&mut Unit),
{
    fn update(&mut self, unit: &mut Unit) {
        self(unit)
    }
}

/// Run `updater` over a tensor's units in iteration order
pub fn apply<'a, I>(updater: &mut dyn WeightUpdater, units: I)
where
    I: IntoIterator<Item = &'a mut Unit>,
{
    for unit in units {
        updater.update(unit);
    }
}

/// Per-weight state slots addressed by traversal position
#[derive(Debug, Clone, Default)]
struct Slots {
    cursor: usize,
    len: usize,
}

impl Slots {
    fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Index for the next unit, and whether its state must be created
    fn next(&mut self) -> (usize, bool) {
        let index = self.cursor;
        self.cursor += 1;
        let fresh = index == self.len;
        if fresh {
            self.len += 1;
        }
        (index, fresh)
    }

    fn clear(&mut self) {
        self.cursor = 0;
        self.len = 0;
    }
}

// ==================== Gradient Descent ====================

/// Fixed-rate gradient descent: value -= lr * gradient
#[derive(Debug, Clone)]
pub struct GradientDescent {
    pub learning_rate: f64,
}

impl GradientDescent {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl WeightUpdater for GradientDescent {
    fn update(&mut self, unit: &mut Unit) {
        unit.value -= self.learning_rate * unit.gradient;
        unit.gradient = 0.0;
    }
}

// ==================== Momentum ====================

/// Classical momentum: v = μv - lr * gradient; value += v
#[derive(Debug, Clone)]
pub struct Momentum {
    pub learning_rate: f64,
    pub momentum: f64,
    velocity: Vec<f64>,
    slots: Slots,
}

impl Momentum {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Vec::new(),
            slots: Slots::default(),
        }
    }

    pub fn reset(&mut self) {
        self.velocity.clear();
        self.slots.clear();
    }
}

impl WeightUpdater for Momentum {
    fn begin_pass(&mut self) {
        self.slots.begin();
    }

    fn update(&mut self, unit: &mut Unit) {
        let (i, fresh) = self.slots.next();
        if fresh {
            self.velocity.push(0.0);
        }

        self.velocity[i] = self.momentum * self.velocity[i] - self.learning_rate * unit.gradient;
        unit.value += self.velocity[i];
        unit.gradient = 0.0;
    }
}

// ==================== RMSProp ====================

/// RMSProp in the form of Graves (2013), with centred second moment and momentum
///
/// n = ρn + (1-ρ)g², ḡ = ρḡ + (1-ρ)g, Δ = μΔ - lr·g / √(n - ḡ² + ε), value += Δ
#[derive(Debug, Clone)]
pub struct RmsProp {
    pub learning_rate: f64,
    /// Decay of the gradient moving averages (ρ)
    pub decay: f64,
    /// Momentum on the applied change (μ)
    pub momentum: f64,
    pub epsilon: f64,
    mean_square: Vec<f64>,
    mean_gradient: Vec<f64>,
    delta: Vec<f64>,
    slots: Slots,
}

impl RmsProp {
    pub fn new(learning_rate: f64, decay: f64, momentum: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            decay,
            momentum,
            epsilon,
            mean_square: Vec::new(),
            mean_gradient: Vec::new(),
            delta: Vec::new(),
            slots: Slots::default(),
        }
    }

    pub fn reset(&mut self) {
        self.mean_square.clear();
        self.mean_gradient.clear();
        self.delta.clear();
        self.slots.clear();
    }
}

impl Default for RmsProp {
    fn default() -> Self {
        Self::new(1e-4, 0.95, 0.9, 1e-4)
    }
}

impl WeightUpdater for RmsProp {
    fn begin_pass(&mut self) {
        self.slots.begin();
    }

    fn update(&mut self, unit: &mut Unit) {
        let (i, fresh) = self.slots.next();
        if fresh {
            self.mean_square.push(0.0);
            self.mean_gradient.push(0.0);
            self.delta.push(0.0);
        }

        let g = unit.gradient;
        self.mean_square[i] = self.decay * self.mean_square[i] + (1.0 - self.decay) * g * g;
        self.mean_gradient[i] = self.decay * self.mean_gradient[i] + (1.0 - self.decay) * g;

        let variance = self.mean_square[i] - self.mean_gradient[i] * self.mean_gradient[i];
        self.delta[i] = self.momentum * self.delta[i]
            - self.learning_rate * g / (variance + self.epsilon).sqrt();

        unit.value += self.delta[i];
        unit.gradient = 0.0;
    }
}

// ==================== AdamW ====================

/// AdamW with decoupled weight decay
#[derive(Debug, Clone)]
pub struct AdamW {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
    /// First moment estimates
    m: Vec<f64>,
    /// Second moment estimates
    v: Vec<f64>,
    /// Completed passes, for bias correction
    t: i32,
    slots: Slots,
}

impl AdamW {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.99,
            epsilon: 1e-8,
            weight_decay: 0.01,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
            slots: Slots::default(),
        }
    }

    pub fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
        self.slots.clear();
    }
}

impl WeightUpdater for AdamW {
    fn begin_pass(&mut self) {
        self.slots.begin();
        self.t += 1;
    }

    fn update(&mut self, unit: &mut Unit) {
        let (i, fresh) = self.slots.next();
        if fresh {
            self.m.push(0.0);
            self.v.push(0.0);
        }
        // t stays 0 when begin_pass was never called
        let t = self.t.max(1);

        let grad = unit.gradient;
        self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * grad;
        self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * grad * grad;

        let m_hat = self.m[i] / (1.0 - self.beta1.powi(t));
        let v_hat = self.v[i] / (1.0 - self.beta2.powi(t));

        unit.value *= 1.0 - self.learning_rate * self.weight_decay;
        unit.value -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        unit.gradient = 0.0;
    }
}

// ==================== Closed Rule Set ====================

/// The update rules a training run can be configured with
#[derive(Debug, Clone)]
pub enum UpdateRule {
    GradientDescent(GradientDescent),
    Momentum(Momentum),
    RmsProp(RmsProp),
    AdamW(AdamW),
}

impl UpdateRule {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateRule::GradientDescent(_) => "gradient_descent",
            UpdateRule::Momentum(_) => "momentum",
            UpdateRule::RmsProp(_) => "rms_prop",
            UpdateRule::AdamW(_) => "adam_w",
        }
    }

    /// Drop any per-weight state
    pub fn reset(&mut self) {
        match self {
            UpdateRule::GradientDescent(_) => {}
            UpdateRule::Momentum(rule) => rule.reset(),
            UpdateRule::RmsProp(rule) => rule.reset(),
            UpdateRule::AdamW(rule) => rule.reset(),
        }
    }
}

impl WeightUpdater for UpdateRule {
    fn begin_pass(&mut self) {
        match self {
            UpdateRule::GradientDescent(rule) => rule.begin_pass(),
            UpdateRule::Momentum(rule) => rule.begin_pass(),
            UpdateRule::RmsProp(rule) => rule.begin_pass(),
            UpdateRule::AdamW(rule) => rule.begin_pass(),
        }
    }

    fn update(&mut self, unit: &mut Unit) {
        match self {
            UpdateRule::GradientDescent(rule) => rule.update(unit),
            UpdateRule::Momentum(rule) => rule.update(unit),
            UpdateRule::RmsProp(rule) => rule.update(unit),
            UpdateRule::AdamW(rule) => rule.update(unit),
        }
    }
}
