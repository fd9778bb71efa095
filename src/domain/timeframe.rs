//! Timeframe labels such as `1m`, `15m`, `4h`, `1d`, `1w`, `1M`.

use crate::domain::error::TacalcError;
use chrono::Duration;
use std::fmt;
use std::str::FromStr;

const MAX_COUNT: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    fn suffix(self) -> char {
        match self {
            TimeUnit::Minute => 'm',
            TimeUnit::Hour => 'h',
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
            TimeUnit::Month => 'M',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    pub count: u32,
    pub unit: TimeUnit,
}

impl Timeframe {
    pub fn new(count: u32, unit: TimeUnit) -> Self {
        Self { count, unit }
    }

    /// Exact length of one period; `None` for calendar months.
    pub fn fixed_duration(&self) -> Option<Duration> {
        let n = i64::from(self.count);
        match self.unit {
            TimeUnit::Minute => Some(Duration::minutes(n)),
            TimeUnit::Hour => Some(Duration::hours(n)),
            TimeUnit::Day => Some(Duration::days(n)),
            TimeUnit::Week => Some(Duration::weeks(n)),
            TimeUnit::Month => None,
        }
    }

    /// Upper bound on the length of one period (31-day months).
    pub fn max_duration(&self) -> Duration {
        self.fixed_duration()
            .unwrap_or_else(|| Duration::days(31 * i64::from(self.count)))
    }
}

impl FromStr for Timeframe {
    type Err = TacalcError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let mut chars = label.chars();
        let unit = match chars.next_back() {
            Some('m') => TimeUnit::Minute,
            Some('h') => TimeUnit::Hour,
            Some('d') => TimeUnit::Day,
            Some('w') => TimeUnit::Week,
            Some('M') => TimeUnit::Month,
            _ => {
                return Err(TacalcError::invalid_timeframe(
                    label,
                    "expected <count><unit> with unit one of m, h, d, w, M",
                ));
            }
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(TacalcError::invalid_timeframe(
                label,
                "count must be a positive integer",
            ));
        }
        let count: u32 = digits
            .parse()
            .map_err(|_| TacalcError::invalid_timeframe(label, "count out of range"))?;
        if count == 0 {
            return Err(TacalcError::invalid_timeframe(
                label,
                "count must be a positive integer",
            ));
        }
        if count > MAX_COUNT {
            return Err(TacalcError::invalid_timeframe(label, "count out of range"));
        }
        Ok(Timeframe { count, unit })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        for (label, unit) in [
            ("1m", TimeUnit::Minute),
            ("4h", TimeUnit::Hour),
            ("1d", TimeUnit::Day),
            ("2w", TimeUnit::Week),
            ("3M", TimeUnit::Month),
        ] {
            let tf: Timeframe = label.parse().unwrap();
            assert_eq!(tf.unit, unit);
            assert_eq!(tf.to_string(), label);
        }
    }

    #[test]
    fn minute_and_month_are_case_sensitive() {
        let m: Timeframe = "15m".parse().unwrap();
        let mm: Timeframe = "15M".parse().unwrap();
        assert_eq!(m.unit, TimeUnit::Minute);
        assert_eq!(mm.unit, TimeUnit::Month);
    }

    #[test]
    fn rejects_malformed_labels() {
        for label in ["", "m", "0m", "5", "5x", "-5m", "5 m", "1.5h", "5mm", "99999999999m"] {
            let err = label.parse::<Timeframe>().unwrap_err();
            assert!(
                matches!(err, TacalcError::InvalidTimeframe { .. }),
                "{label}: {err}"
            );
        }
    }

    #[test]
    fn durations() {
        let tf: Timeframe = "5m".parse().unwrap();
        assert_eq!(tf.fixed_duration(), Some(Duration::minutes(5)));
        let month: Timeframe = "2M".parse().unwrap();
        assert_eq!(month.fixed_duration(), None);
        assert_eq!(month.max_duration(), Duration::days(62));
    }
}
