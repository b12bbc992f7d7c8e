//! Exact media timestamps.
//!
//! [`Timestamp`] stores a time offset as a rational number of seconds
//! (`value / timescale`), the same representation video containers use for
//! presentation timestamps. Comparisons cross-multiply instead of going
//! through floating point, so two marks taken at the same instant always
//! compare equal regardless of the time base they were recorded in.
//!
//! # Example
//!
//! ```
//! use framemark::Timestamp;
//!
//! let mark: Timestamp = "01:15.5".parse()?;
//! assert_eq!(mark.to_string(), "01:15.50");
//! assert_eq!(mark, Timestamp::new(45_300, 600)?);
//! # Ok::<(), framemark::FrameMarkError>(())
//! ```

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::FrameMarkError;

/// Time base used by players when sampling the playhead (1/600 s).
pub const DEFAULT_TIMESCALE: u32 = 600;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A non-negative offset into a video, in `value / timescale` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timestamp {
    value: u64,
    timescale: u32,
}

impl Timestamp {
    /// The start of the video.
    pub const ZERO: Timestamp = Timestamp {
        value: 0,
        timescale: DEFAULT_TIMESCALE,
    };

    /// Create a timestamp of `value` ticks at `timescale` ticks per second.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::InvalidTimestamp`] when `timescale` is zero.
    pub fn new(value: u64, timescale: u32) -> Result<Self, FrameMarkError> {
        if timescale == 0 {
            return Err(FrameMarkError::InvalidTimestamp(format!(
                "{value}/0 has a zero timescale"
            )));
        }
        Ok(Self { value, timescale })
    }

    /// Build a timestamp from a [`Duration`] without losing precision.
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            value: duration.as_nanos().min(u64::MAX as u128) as u64,
            timescale: NANOS_PER_SECOND,
        }
    }

    /// Round fractional seconds to the nearest tick of `timescale`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::InvalidTimestamp`] for negative, NaN or
    /// infinite input, or a zero timescale.
    pub fn from_seconds_f64(seconds: f64, timescale: u32) -> Result<Self, FrameMarkError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(FrameMarkError::InvalidTimestamp(format!(
                "{seconds} is not a non-negative number of seconds"
            )));
        }
        Self::new((seconds * timescale as f64).round() as u64, timescale)
    }

    /// Raw tick count.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Ticks per second.
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    /// Lossy conversion to floating-point seconds, for display and UI maths.
    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Convert to a [`Duration`], truncating below one nanosecond.
    pub fn as_duration(&self) -> Duration {
        let nanos = self.value as u128 * NANOS_PER_SECOND as u128 / self.timescale as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Re-express this timestamp in another time base, rounding to the
    /// nearest tick.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::InvalidTimestamp`] when `timescale` is zero.
    pub fn rescale(&self, timescale: u32) -> Result<Self, FrameMarkError> {
        if timescale == 0 {
            return Self::new(self.value, 0);
        }
        let numerator = self.value as u128 * timescale as u128;
        let denominator = self.timescale as u128;
        let rounded = (numerator + denominator / 2) / denominator;
        Self::new(rounded.min(u64::MAX as u128) as u64, timescale)
    }

    /// `self - other`, clamped at zero.
    pub fn saturating_sub(&self, other: Timestamp) -> Timestamp {
        if *self <= other {
            return Timestamp::ZERO.with_timescale_of(self);
        }
        let (left, right, timescale) = self.common_base(&other);
        Self::from_wide(left - right, timescale)
    }

    /// `self + step`, clamped to `upper`.
    ///
    /// Used for the fixed-size seek steps a player offers, where seeking
    /// past the end lands on the last position.
    pub fn clamped_add(&self, step: Timestamp, upper: Timestamp) -> Timestamp {
        let (left, right, timescale) = self.common_base(&step);
        let sum = Self::from_wide(left + right, timescale);
        if sum > upper { upper } else { sum }
    }

    fn with_timescale_of(self, other: &Timestamp) -> Timestamp {
        Timestamp {
            value: self.value,
            timescale: other.timescale,
        }
    }

    /// Both values expressed over `lhs.timescale * rhs.timescale`.
    fn common_base(&self, other: &Timestamp) -> (u128, u128, u128) {
        if self.timescale == other.timescale {
            return (
                self.value as u128,
                other.value as u128,
                self.timescale as u128,
            );
        }
        (
            self.value as u128 * other.timescale as u128,
            other.value as u128 * self.timescale as u128,
            self.timescale as u128 * other.timescale as u128,
        )
    }

    fn from_wide(value: u128, timescale: u128) -> Timestamp {
        if timescale <= u32::MAX as u128 && value <= u64::MAX as u128 {
            return Timestamp {
                value: value as u64,
                timescale: timescale as u32,
            };
        }
        // Fall back to nanoseconds when the product time base overflows.
        let nanos = value * NANOS_PER_SECOND as u128 / timescale;
        Timestamp {
            value: nanos.min(u64::MAX as u128) as u64,
            timescale: NANOS_PER_SECOND,
        }
    }

    fn total_hundredths(&self) -> u128 {
        self.value as u128 * 100 / self.timescale as u128
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right, _) = self.common_base(other);
        left.cmp(&right)
    }
}

/// Formats as `MM:SS.hh`. Minutes are not wrapped into hours.
impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let hundredths = self.total_hundredths();
        let seconds = hundredths / 100;
        write!(
            f,
            "{:02}:{:02}.{:02}",
            seconds / 60,
            seconds % 60,
            hundredths % 100
        )
    }
}

/// Parses plain seconds (`"75"`, `"75.25"`), `MM:SS[.fff]` or
/// `HH:MM:SS[.fff]`. Fractions are kept exact by choosing a decimal
/// timescale.
impl FromStr for Timestamp {
    type Err = FrameMarkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameMarkError::InvalidTimestamp(format!("invalid time format: {value}"));

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FrameMarkError::InvalidTimestamp(
                "time value cannot be empty".to_string(),
            ));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let (hours, minutes, seconds_str) = match parts.as_slice() {
            [seconds] => (0_u64, 0_u64, *seconds),
            [minutes, seconds] => (0, minutes.parse().map_err(|_| invalid())?, *seconds),
            [hours, minutes, seconds] => (
                hours.parse().map_err(|_| invalid())?,
                minutes.parse().map_err(|_| invalid())?,
                *seconds,
            ),
            _ => return Err(invalid()),
        };

        let (whole_str, fraction_str) = seconds_str.split_once('.').unwrap_or((seconds_str, ""));
        if fraction_str.len() > 9 || !fraction_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: u64 = if whole_str.is_empty() && !fraction_str.is_empty() {
            0
        } else {
            whole_str.parse().map_err(|_| invalid())?
        };
        let fraction: u64 = if fraction_str.is_empty() {
            0
        } else {
            fraction_str.parse().map_err(|_| invalid())?
        };

        let timescale = 10_u32.pow(fraction_str.len() as u32);
        let total_seconds = hours
            .checked_mul(3600)
            .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
            .and_then(|hm| hm.checked_add(whole))
            .ok_or_else(invalid)?;
        let ticks = total_seconds
            .checked_mul(timescale as u64)
            .and_then(|t| t.checked_add(fraction))
            .ok_or_else(invalid)?;

        Self::new(ticks, timescale)
    }
}
