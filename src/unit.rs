//! Gradient unit: the atomic trainable element.
//!
//! Every weight, neuron, read cell and head parameter is a [`Unit`] holding
//! a forward value and the gradient accumulated for it during backpropagation.

/// A scalar value paired with its accumulated gradient
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Unit {
    /// Forward value (set by forward passes, adjusted by update rules)
    pub value: f64,
    /// dLoss/dvalue, accumulated with `+=` during backward passes
    pub gradient: f64,
}

impl Unit {
    /// Create a unit with the given value and no gradient
    #[inline]
    pub fn new(value: f64) -> Self {
        Self {
            value,
            gradient: 0.0,
        }
    }

    /// Add a contribution to the accumulated gradient
    #[inline]
    pub fn accumulate(&mut self, delta: f64) {
        self.gradient += delta;
    }

    #[inline]
    pub fn reset_gradient(&mut self) {
        self.gradient = 0.0;
    }
}

impl From<f64> for Unit {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// Copy the values of a unit sequence into a plain vector
pub fn values<'a, I>(units: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Unit>,
{
    units.into_iter().map(|u| u.value).collect()
}
