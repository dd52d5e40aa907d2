//! Logistic activation used by the hidden and output neurons.

/// σ(x) = 1 / (1 + e^-x), in double precision
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of the sigmoid expressed through its output: σ'(x) = y(1 - y)
#[inline]
pub fn sigmoid_derivative(y: f64) -> f64 {
    y * (1.0 - y)
}
