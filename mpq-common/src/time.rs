//! Time value helpers
//!
//! All media positions are signed microseconds. Values that may be unknown are
//! carried as `Option<TimeUs>`; positions that may refer to the end of the
//! source use [`EndPosition`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Microseconds on a period or renderer time axis
pub type TimeUs = i64;

/// Microseconds per second
pub const MICROS_PER_SECOND: TimeUs = 1_000_000;

/// End of a media period relative to its timeline period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndPosition {
    /// Plays to the end of the timeline period
    Unset,
    /// Stops at the given period position
    At(TimeUs),
    /// Stops at the end of the source, ahead of a postroll ad group
    EndOfSource,
}

impl fmt::Display for EndPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndPosition::Unset => write!(f, "unset"),
            EndPosition::At(us) => write!(f, "{}", format_us(*us)),
            EndPosition::EndOfSource => write!(f, "end-of-source"),
        }
    }
}

/// Format microseconds as `S.mmmmmms` for log output
///
/// Negative values keep their sign, which makes renderer offsets of periods
/// that start mid-way readable.
pub fn format_us(micros: TimeUs) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    format!(
        "{}{}.{:06}s",
        sign,
        abs / MICROS_PER_SECOND as u64,
        abs % MICROS_PER_SECOND as u64
    )
}

/// Format an optional duration, rendering `None` as `unset`
pub fn format_opt_us(micros: Option<TimeUs>) -> String {
    micros.map(format_us).unwrap_or_else(|| "unset".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_us() {
        assert_eq!(format_us(0), "0.000000s");
        assert_eq!(format_us(1_000_001), "1.000001s");
        assert_eq!(format_us(-250_000), "-0.250000s");
    }

    #[test]
    fn test_format_opt_us() {
        assert_eq!(format_opt_us(None), "unset");
        assert_eq!(format_opt_us(Some(2_000_000)), "2.000000s");
    }

    #[test]
    fn test_end_position_display() {
        assert_eq!(EndPosition::Unset.to_string(), "unset");
        assert_eq!(EndPosition::At(1_500_000).to_string(), "1.500000s");
        assert_eq!(EndPosition::EndOfSource.to_string(), "end-of-source");
    }
}
