//! Window statistics and the acceptable-range policies built on them.

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Bound multiplier applied to the spread in both policies
const SIGMA_MULTIPLIER: f64 = 3.0;

/// Scale of the relative spread inside the exponential margin
const RELATIVE_SPREAD_GAIN: f64 = 10.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericDomainError {
    #[error("window mean is zero, the relative-exponential margin is undefined")]
    ZeroMean,
    #[error("window is empty")]
    EmptyWindow,
    #[error("computed bound is not a finite number")]
    NonFiniteBound,
}

/// Mean and population standard deviation of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (divisor N)
    pub stddev: f64,
}

impl WindowStats {
    /// Compute statistics over `values`.
    ///
    /// Values are shifted by the first entry before summing, so a window of
    /// identical values yields exactly that value as mean and zero spread.
    /// Returns None if the window is empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let first = *values.first()?;
        let n = values.len() as f64;

        let offset = values.iter().map(|v| v - first).sum::<f64>() / n;
        let variance = values
            .iter()
            .map(|v| {
                let d = (v - first) - offset;
                d * d
            })
            .sum::<f64>()
            / n;

        Some(Self {
            count: values.len(),
            mean: first + offset,
            stddev: libm::sqrt(variance),
        })
    }
}

/// Inclusive acceptable range of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// True when `value` lies strictly outside the range.
    /// A value equal to either bound is within range.
    pub fn is_violated_by(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Shape of the auto-mode bounds around the window mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    /// `mean ± 3σ`
    #[default]
    Linear,
    /// `mean ± 3·exp(10σ / mean)`; undefined for a zero mean
    RelativeExponential,
}

impl BoundsPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::RelativeExponential => "relative-exponential",
        }
    }

    pub fn bounds(self, stats: &WindowStats) -> Result<Bounds, NumericDomainError> {
        let margin = match self {
            Self::Linear => SIGMA_MULTIPLIER * stats.stddev,
            Self::RelativeExponential => {
                if stats.mean == 0.0 {
                    return Err(NumericDomainError::ZeroMean);
                }
                SIGMA_MULTIPLIER * libm::exp(RELATIVE_SPREAD_GAIN * stats.stddev / stats.mean)
            }
        };

        let bounds = Bounds::new(stats.mean - margin, stats.mean + margin);
        if !bounds.lower.is_finite() || !bounds.upper.is_finite() {
            return Err(NumericDomainError::NonFiniteBound);
        }

        Ok(bounds)
    }

    /// Statistics and bounds in one step.
    pub fn compute(self, window: &[f64]) -> Result<Bounds, NumericDomainError> {
        let stats = WindowStats::from_values(window).ok_or(NumericDomainError::EmptyWindow)?;
        self.bounds(&stats)
    }
}
