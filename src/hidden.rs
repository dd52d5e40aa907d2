//! Hidden-layer activations for one time step.

use crate::activation::{sigmoid, sigmoid_derivative};
use crate::controller::FeedForwardController;
use crate::factory::UnitFactory;
use crate::read::ReadData;
use crate::unit::{self, Unit};
use crate::Shared;
use ndarray::Array1;
use std::sync::Arc;

/// Sigmoid hidden neurons of one time step, backed by shared controller weights
#[derive(Debug)]
pub struct HiddenLayer {
    controller: Shared<FeedForwardController>,
    neurons: Array1<Unit>,
}

impl HiddenLayer {
    /// Zeroed neurons for the given controller
    pub fn new(controller: Shared<FeedForwardController>) -> Self {
        let size = controller.read().controller_size();
        Self {
            controller,
            neurons: UnitFactory::neurons(size),
        }
    }

    /// Fresh neuron storage over the same controller weights
    pub fn clone_shared(&self) -> Self {
        Self::new(Arc::clone(&self.controller))
    }

    pub fn controller(&self) -> &Shared<FeedForwardController> {
        &self.controller
    }

    pub fn neurons(&self) -> &Array1<Unit> {
        &self.neurons
    }

    pub fn neurons_mut(&mut self) -> &mut Array1<Unit> {
        &mut self.neurons
    }

    pub fn values(&self) -> Vec<f64> {
        unit::values(&self.neurons)
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    /// Set every neuron to σ(pre-activation)
    pub fn forward_propagation(&mut self, input: &[f64], reads: &[ReadData]) {
        let controller = self.controller.read();
        for (neuron, unit) in self.neurons.iter_mut().enumerate() {
            let sum = controller.forward_propagate(0.0, neuron, input, reads);
            unit.value = sigmoid(sum);
        }
    }

    /// dLoss/d(pre-activation) for every neuron, from the accumulated neuron gradients
    pub fn pre_activation_gradients(&self) -> Vec<f64> {
        self.neurons
            .iter()
            .map(|u| u.gradient * sigmoid_derivative(u.value))
            .collect()
    }

    /// Push the neuron gradients through the sigmoid into the controller
    ///
    /// Neuron gradients must be complete, i.e. the output layer's backward
    /// pass for this step has already run.
    pub fn backward_error_propagation(&self, input: &[f64], reads: &mut [ReadData]) {
        let gradients = self.pre_activation_gradients();
        self.controller
            .write()
            .backward_propagate(&gradients, input, reads);
    }

    pub fn reset_gradients(&mut self) {
        self.neurons.iter_mut().for_each(Unit::reset_gradient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use parking_lot::RwLock;

    fn shared_controller(size: usize, input: usize, heads: usize, m: usize) -> Shared<FeedForwardController> {
        let mut factory = UnitFactory::new(5, 0.5);
        Arc::new(RwLock::new(FeedForwardController::new(size, input, heads, m, &mut factory)))
    }

    #[test]
    fn test_forward_applies_sigmoid() {
        let controller = shared_controller(3, 2, 1, 2);
        let mut hidden = HiddenLayer::new(Arc::clone(&controller));
        let input = [0.4, -0.2];
        let reads = vec![ReadData::from_values(&[0.3, 0.8])];

        hidden.forward_propagation(&input, &reads);

        let c = controller.read();
        for n in 0..3 {
            let expected = sigmoid(c.pre_activation(n, &input, &reads));
            assert_eq!(hidden.neurons()[n].value, expected);
        }
    }

    #[test]
    fn test_backward_uses_sigmoid_derivative() {
        let controller = shared_controller(2, 1, 0, 1);
        let mut hidden = HiddenLayer::new(Arc::clone(&controller));
        hidden.forward_propagation(&[1.0], &[]);
        hidden.neurons_mut()[0].gradient = 2.0;
        hidden.neurons_mut()[1].gradient = -1.0;

        hidden.backward_error_propagation(&[1.0], &mut []);

        let v0 = hidden.neurons()[0].value;
        let v1 = hidden.neurons()[1].value;
        let c = controller.read();
        assert_relative_eq!(c.thresholds()[0].gradient, 2.0 * v0 * (1.0 - v0));
        assert_relative_eq!(c.thresholds()[1].gradient, -1.0 * v1 * (1.0 - v1));
    }

    #[test]
    fn test_clone_shared_has_fresh_neurons() {
        let controller = shared_controller(2, 1, 0, 1);
        let mut first = HiddenLayer::new(controller);
        first.forward_propagation(&[0.5], &[]);
        first.neurons_mut()[0].gradient = 3.0;

        let second = first.clone_shared();
        assert!(second.neurons().iter().all(|u| *u == Unit::default()));
        assert!(Arc::ptr_eq(first.controller(), second.controller()));
        assert_eq!(first.neurons()[0].gradient, 3.0);
    }
}
