//! Raw (pre-addressing) control parameters for one memory head.
//!
//! The output layer treats a head as an opaque run of `unit_size` units. The
//! addressing component interprets the run with the layout below, where `m` is
//! the memory unit width:
//!
//! | range             | parameter                     |
//! |-------------------|-------------------------------|
//! | `[0, m)`          | key vector                    |
//! | `m`               | key strength (beta)           |
//! | `m + 1`           | interpolation gate            |
//! | `[m + 2, m + 5)`  | shift distribution (-1, 0, 1) |
//! | `m + 5`           | sharpening factor (gamma)     |
//! | `[m + 6, 2m + 6)` | erase vector                  |
//! | `[2m + 6, 3m + 6)`| add vector                    |

use crate::factory::UnitFactory;
use crate::unit::Unit;
use ndarray::{s, Array1, ArrayView1, ArrayViewMut1};
use std::ops::{Index, IndexMut, Range};

/// Width of the shift distribution (shifts of -1, 0 and +1)
pub const SHIFT_WIDTH: usize = 3;

/// Per-head parameter vector written by the output layer
#[derive(Debug, Clone, PartialEq)]
pub struct Head {
    units: Array1<Unit>,
    memory_unit_size: usize,
}

impl Head {
    /// Number of parameter units a head needs for memory width `m`
    pub const fn unit_size(memory_unit_size: usize) -> usize {
        3 * memory_unit_size + SHIFT_WIDTH + 3
    }

    /// Zeroed head for memory width `memory_unit_size`
    pub fn new(memory_unit_size: usize) -> Self {
        Self {
            units: UnitFactory::neurons(Self::unit_size(memory_unit_size)),
            memory_unit_size,
        }
    }

    /// `count` zeroed heads
    pub fn vector(count: usize, memory_unit_size: usize) -> Vec<Head> {
        (0..count).map(|_| Head::new(memory_unit_size)).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn memory_unit_size(&self) -> usize {
        self.memory_unit_size
    }

    pub fn units(&self) -> ArrayView1<'_, Unit> {
        self.units.view()
    }

    pub fn units_mut(&mut self) -> ArrayViewMut1<'_, Unit> {
        self.units.view_mut()
    }

    pub fn values(&self) -> Vec<f64> {
        self.units.iter().map(|u| u.value).collect()
    }

    /// Zero every value; forward passes accumulate into head values
    pub fn reset_values(&mut self) {
        self.units.iter_mut().for_each(|u| u.value = 0.0);
    }

    pub fn reset_gradients(&mut self) {
        self.units.iter_mut().for_each(Unit::reset_gradient);
    }

    fn key_range(&self) -> Range<usize> {
        0..self.memory_unit_size
    }

    fn shift_range(&self) -> Range<usize> {
        let start = self.memory_unit_size + 2;
        start..start + SHIFT_WIDTH
    }

    fn erase_range(&self) -> Range<usize> {
        let start = self.memory_unit_size + SHIFT_WIDTH + 3;
        start..start + self.memory_unit_size
    }

    fn add_range(&self) -> Range<usize> {
        let start = 2 * self.memory_unit_size + SHIFT_WIDTH + 3;
        start..start + self.memory_unit_size
    }

    pub fn key(&self) -> ArrayView1<'_, Unit> {
        self.units.slice(s![self.key_range()])
    }

    pub fn key_mut(&mut self) -> ArrayViewMut1<'_, Unit> {
        let range = self.key_range();
        self.units.slice_mut(s![range])
    }

    pub fn beta(&self) -> &Unit {
        &self.units[self.memory_unit_size]
    }

    pub fn beta_mut(&mut self) -> &mut Unit {
        &mut self.units[self.memory_unit_size]
    }

    pub fn gate(&self) -> &Unit {
        &self.units[self.memory_unit_size + 1]
    }

    pub fn gate_mut(&mut self) -> &mut Unit {
        &mut self.units[self.memory_unit_size + 1]
    }

    pub fn shift(&self) -> ArrayView1<'_, Unit> {
        self.units.slice(s![self.shift_range()])
    }

    pub fn shift_mut(&mut self) -> ArrayViewMut1<'_, Unit> {
        let range = self.shift_range();
        self.units.slice_mut(s![range])
    }

    pub fn gamma(&self) -> &Unit {
        &self.units[self.memory_unit_size + SHIFT_WIDTH + 2]
    }

    pub fn gamma_mut(&mut self) -> &mut Unit {
        &mut self.units[self.memory_unit_size + SHIFT_WIDTH + 2]
    }

    pub fn erase(&self) -> ArrayView1<'_, Unit> {
        self.units.slice(s![self.erase_range()])
    }

    pub fn erase_mut(&mut self) -> ArrayViewMut1<'_, Unit> {
        let range = self.erase_range();
        self.units.slice_mut(s![range])
    }

    pub fn add(&self) -> ArrayView1<'_, Unit> {
        self.units.slice(s![self.add_range()])
    }

    pub fn add_mut(&mut self) -> ArrayViewMut1<'_, Unit> {
        let range = self.add_range();
        self.units.slice_mut(s![range])
    }
}

impl Index<usize> for Head {
    type Output = Unit;

    fn index(&self, index: usize) -> &Unit {
        &self.units[index]
    }
}

impl IndexMut<usize> for Head {
    fn index_mut(&mut self, index: usize) -> &mut Unit {
        &mut self.units[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_size() {
        assert_eq!(Head::unit_size(0), 6);
        assert_eq!(Head::unit_size(2), 12);
        assert_eq!(Head::unit_size(20), 66);
        assert_eq!(Head::new(4).len(), Head::unit_size(4));
    }

    #[test]
    fn test_layout_covers_every_unit_once() {
        let m = 3;
        let mut head = Head::new(m);
        for i in 0..head.len() {
            head[i].value = i as f64;
        }

        let mut seen: Vec<f64> = Vec::new();
        seen.extend(head.key().iter().map(|u| u.value));
        seen.push(head.beta().value);
        seen.push(head.gate().value);
        seen.extend(head.shift().iter().map(|u| u.value));
        seen.push(head.gamma().value);
        seen.extend(head.erase().iter().map(|u| u.value));
        seen.extend(head.add().iter().map(|u| u.value));

        let expected: Vec<f64> = (0..Head::unit_size(m)).map(|i| i as f64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_mutable_views_write_through() {
        let mut head = Head::new(2);
        head.key_mut()[1].value = 4.0;
        head.gamma_mut().gradient = 2.0;
        head.add_mut()[0].value = -1.0;

        assert_eq!(head[1].value, 4.0);
        assert_eq!(head[2 + SHIFT_WIDTH + 2].gradient, 2.0);
        assert_eq!(head[2 * 2 + SHIFT_WIDTH + 3].value, -1.0);
    }

    #[test]
    fn test_reset() {
        let mut head = Head::new(1);
        head[0].value = 1.0;
        head[0].gradient = 1.0;
        head.reset_values();
        assert_eq!(head[0].value, 0.0);
        assert_eq!(head[0].gradient, 1.0);
        head.reset_gradients();
        assert_eq!(head[0].gradient, 0.0);
    }
}
