//! Progressive attention thresholds.
//!
//! A page is attributed every time its total attention reaches the next
//! entry of its schedule. After the finite part runs out, thresholds keep
//! coming at a fixed step.

use thiserror::Error;

use crate::domains::Category;

/// One year of continuous attention; anything above is a bug upstream.
pub const MAX_ATTENTION_SECS: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ThresholdError {
    #[error("invalid attention value {0}")]
    InvalidAttention(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    thresholds: &'static [f64],
    step: f64,
}

pub const DEFAULT_SCHEDULE: Schedule = Schedule {
    thresholds: &[50.0, 100.0, 200.0, 400.0, 800.0],
    step: 800.0,
};

pub const VIDEO_SCHEDULE: Schedule = Schedule {
    thresholds: &[150.0, 300.0, 600.0, 1200.0, 2400.0],
    step: 2400.0,
};

impl Schedule {
    pub fn for_category(category: Category) -> &'static Schedule {
        match category {
            Category::Default => &DEFAULT_SCHEDULE,
            Category::Video => &VIDEO_SCHEDULE,
        }
    }

    /// `(previous, next)` thresholds around `attention`. Reaching a threshold
    /// exactly counts as having passed it.
    fn bounds(&self, attention: f64) -> Result<(f64, f64), ThresholdError> {
        if !attention.is_finite() || !(0.0..=MAX_ATTENTION_SECS).contains(&attention) {
            return Err(ThresholdError::InvalidAttention(attention));
        }

        let mut previous = 0.0;
        for &threshold in self.thresholds {
            if attention < threshold {
                return Ok((previous, threshold));
            }
            previous = threshold;
        }

        let steps_past = ((attention - previous) / self.step).floor() + 1.0;
        let next = previous + steps_past * self.step;
        Ok((next - self.step, next))
    }

    /// Fraction of the way from the previous to the next threshold, in `[0, 1)`.
    pub fn progress(&self, attention: f64) -> Result<f64, ThresholdError> {
        let (previous, next) = self.bounds(attention)?;
        Ok((attention - previous) / (next - previous))
    }

    /// Seconds still needed to reach the next threshold.
    pub fn remaining(&self, attention: f64) -> Result<f64, ThresholdError> {
        let (_, next) = self.bounds(attention)?;
        Ok(next - attention)
    }

    /// The first threshold strictly above `attention`.
    pub fn next(&self, attention: f64) -> Result<f64, ThresholdError> {
        self.bounds(attention).map(|(_, next)| next)
    }
}

pub fn progress(entity: &str, is_audio: bool, attention: f64) -> Result<f64, ThresholdError> {
    Schedule::for_category(Category::of(entity, is_audio)).progress(attention)
}

pub fn remaining(entity: &str, is_audio: bool, attention: f64) -> Result<f64, ThresholdError> {
    Schedule::for_category(Category::of(entity, is_audio)).remaining(attention)
}

pub fn next_threshold(entity: &str, is_audio: bool, attention: f64) -> Result<f64, ThresholdError> {
    Schedule::for_category(Category::of(entity, is_audio)).next(attention)
}
