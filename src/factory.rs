//! Tensor allocation for weights and neuron layers.
//!
//! Weights are drawn uniformly from `[-init_range, init_range)` using a seeded
//! generator so that two factories with the same seed build identical networks.
//! Neuron storage is always zero-initialised.

use crate::unit::Unit;
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Builds 1-, 2- and 3-dimensional arrays of [`Unit`]
#[derive(Debug, Clone)]
pub struct UnitFactory {
    rng: StdRng,
    init_range: f64,
}

impl UnitFactory {
    /// Create a factory drawing weights from `[-init_range, init_range)`
    pub fn new(seed: u64, init_range: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            init_range,
        }
    }

    fn next_weight(&mut self) -> Unit {
        // An empty range would panic in random_range
        if self.init_range > 0.0 {
            Unit::new(self.rng.random_range(-self.init_range..self.init_range))
        } else {
            Unit::default()
        }
    }

    /// Random weight vector of length `len`
    pub fn vector(&mut self, len: usize) -> Array1<Unit> {
        Array1::from_shape_simple_fn(len, || self.next_weight())
    }

    /// Random weight matrix of shape `(rows, cols)`
    pub fn tensor2(&mut self, rows: usize, cols: usize) -> Array2<Unit> {
        Array2::from_shape_simple_fn((rows, cols), || self.next_weight())
    }

    /// Random weight tensor of shape `(d0, d1, d2)`
    pub fn tensor3(&mut self, d0: usize, d1: usize, d2: usize) -> Array3<Unit> {
        Array3::from_shape_simple_fn((d0, d1, d2), || self.next_weight())
    }

    /// Zeroed neuron storage of length `len`
    pub fn neurons(len: usize) -> Array1<Unit> {
        Array1::from_elem(len, Unit::default())
    }
}
