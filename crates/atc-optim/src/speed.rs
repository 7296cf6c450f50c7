//! The finite set of speeds a sampler may command.

use crate::error::{OptimError, Result};
use atc_core::DEFAULT_SPEEDS;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedSet {
    values: Vec<f64>,
}

impl Default for SpeedSet {
    fn default() -> Self {
        Self {
            values: DEFAULT_SPEEDS.to_vec(),
        }
    }
}

impl SpeedSet {
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(OptimError::invalid("speeds", "at least one speed is required"));
        }
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(OptimError::invalid("speeds", format!("{bad} is not a positive speed")));
        }
        Ok(Self { values })
    }

    /// Every speed from `min` to `max` inclusive, `step` apart.
    pub fn from_range(min: f64, max: f64, step: f64) -> Result<Self> {
        if !(step > 0.0 && min > 0.0 && max >= min) {
            return Err(OptimError::invalid(
                "speeds",
                format!("bad range min={min} max={max} step={step}"),
            ));
        }
        let count = ((max - min) / step + 1e-9).floor() as usize + 1;
        Self::new((0..count).map(|i| min + step * i as f64).collect())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.values[rng.random_range(0..self.values.len())]
    }
}
