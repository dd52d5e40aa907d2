//! Data read from memory by one head at one time step.

use crate::factory::UnitFactory;
use crate::unit::Unit;
use ndarray::Array1;

/// One head's read vector for the current time step
///
/// Produced by the memory component. The hidden layer reads `value`s on the
/// forward pass and accumulates into `gradient`s on the backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadData {
    pub data: Array1<Unit>,
}

impl ReadData {
    /// Zeroed read vector of width `memory_unit_size`
    pub fn zeros(memory_unit_size: usize) -> Self {
        Self {
            data: UnitFactory::neurons(memory_unit_size),
        }
    }

    /// Read vector carrying the given values and no gradient
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            data: values.iter().copied().map(Unit::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gradients accumulated by the backward pass, for the memory component
    pub fn gradients(&self) -> Vec<f64> {
        self.data.iter().map(|u| u.gradient).collect()
    }

    pub fn reset_gradients(&mut self) {
        self.data.iter_mut().for_each(Unit::reset_gradient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values() {
        let read = ReadData::from_values(&[0.1, 0.2]);
        assert_eq!(read.len(), 2);
        assert_eq!(read.data[1].value, 0.2);
        assert_eq!(read.gradients(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_reset_gradients() {
        let mut read = ReadData::zeros(3);
        read.data[2].accumulate(1.5);
        assert_eq!(read.gradients(), vec![0.0, 0.0, 1.5]);
        read.reset_gradients();
        assert_eq!(read.gradients(), vec![0.0, 0.0, 0.0]);
    }
}
