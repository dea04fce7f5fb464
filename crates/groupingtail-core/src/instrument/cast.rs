//! Conversion of captured text into metric values.

use crate::error::AppendError;

/// Modulus for fixed-width counter wraparound.
pub const NUM32: i128 = 1 << 32;

/// How captured text (and accumulated values at read time) become numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCast {
    /// Plain floating point.
    Float,
    /// Integer reduced modulo 2^32, emulating a 32-bit counter.
    Wrap32,
}

impl ValueCast {
    /// Parse captured text.
    pub fn parse(self, text: &str) -> Result<f64, AppendError> {
        let trimmed = text.trim();
        let conversion = || AppendError::Conversion {
            text: text.to_string(),
        };
        match self {
            ValueCast::Float => trimmed.parse::<f64>().map_err(|_| conversion()),
            ValueCast::Wrap32 => trimmed
                .parse::<i128>()
                .map(|n| n.rem_euclid(NUM32) as f64)
                .map_err(|_| conversion()),
        }
    }

    /// Re-apply the cast to an accumulated value.
    ///
    /// For `Wrap32` the value is truncated toward zero before wrapping.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            ValueCast::Float => value,
            ValueCast::Wrap32 if value.is_finite() => {
                (value.trunc() as i128).rem_euclid(NUM32) as f64
            }
            ValueCast::Wrap32 => value,
        }
    }
}
