// Exponential smoothing for raw angle and speed measurements

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Smoothing factor in (0, 1]. 1.0 passes the raw input through.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct FilterFactor(f32);

impl FilterFactor {
    pub const UNFILTERED: Self = Self(1.0);

    pub fn new(factor: f32) -> Result<Self, ConfigError> {
        // NaN fails the comparison and is rejected too
        if factor > 0.0 && factor <= 1.0 {
            Ok(Self(factor))
        } else {
            Err(ConfigError::InvalidFilterFactor(factor))
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for FilterFactor {
    fn default() -> Self {
        Self::UNFILTERED
    }
}

impl TryFrom<f32> for FilterFactor {
    type Error = ConfigError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FilterFactor> for f32 {
    fn from(factor: FilterFactor) -> Self {
        factor.0
    }
}

/// First-order low-pass filter (exponential moving average)
#[derive(Debug, Clone, Default)]
pub struct ExpFilter {
    value: f32,
}

impl ExpFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `filtered = factor * raw + (1 - factor) * filtered`
    pub fn update(&mut self, raw: f32, factor: FilterFactor) -> f32 {
        let k = factor.get();
        self.value = k * raw + (1.0 - k) * self.value;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_bounds() {
        assert!(FilterFactor::new(1.0).is_ok());
        assert!(FilterFactor::new(0.01).is_ok());
        assert!(FilterFactor::new(0.0).is_err());
        assert!(FilterFactor::new(-0.5).is_err());
        assert!(FilterFactor::new(1.01).is_err());
        assert!(FilterFactor::new(f32::NAN).is_err());
    }

    #[test]
    fn test_unit_factor_passes_raw_through() {
        let mut filter = ExpFilter::new();
        assert_eq!(filter.update(3.5, FilterFactor::UNFILTERED), 3.5);
        assert_eq!(filter.update(-1.25, FilterFactor::UNFILTERED), -1.25);
    }

    #[test]
    fn test_single_step() {
        let mut filter = ExpFilter::new();
        let factor = FilterFactor::new(0.25).unwrap();
        assert_eq!(filter.update(4.0, factor), 1.0);
        assert_eq!(filter.update(4.0, factor), 1.75);
    }

    #[test]
    fn test_converges_to_constant_input() {
        for &k in &[0.05, 0.3, 0.9, 1.0] {
            let factor = FilterFactor::new(k).unwrap();
            let mut filter = ExpFilter::new();
            // Start far away from the target
            filter.update(-50.0, FilterFactor::UNFILTERED);
            for _ in 0..2000 {
                filter.update(2.0, factor);
            }
            assert!(
                (filter.value() - 2.0).abs() < 1e-4,
                "factor {} did not converge: {}",
                k,
                filter.value()
            );
        }
    }
}
