//! Timeframe resampling of base-resolution bars into coarser candles.
//!
//! Buckets are aligned the way a calendar reader expects: minute, hour and
//! day buckets count from midnight UTC of the first bar's day, week buckets
//! from the Monday of the first bar's week, and month buckets from the first
//! bar's calendar month. A bucket is only emitted when every base period it
//! spans has a bar; incomplete buckets are dropped, never partially filled.

use crate::domain::error::TacalcError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::timeframe::{TimeUnit, Timeframe};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

pub fn resample(bars: &[PriceBar], label: &str) -> Result<Vec<PriceBar>, TacalcError> {
    let target: Timeframe = label.parse()?;
    if bars.is_empty() {
        return Ok(Vec::new());
    }

    let base_label = bars[0].timeframe.as_str();
    if let Some(other) = bars.iter().find(|b| b.timeframe != base_label) {
        return Err(TacalcError::invalid_timeframe(
            label,
            format!(
                "bars mix base timeframes '{}' and '{}'",
                base_label, other.timeframe
            ),
        ));
    }
    let base: Timeframe = base_label.parse()?;

    let mut sorted = bars.to_vec();
    sorted.sort_by_key(|b| b.timestamp);
    let before = sorted.len();
    sorted.dedup_by_key(|b| b.timestamp);
    if sorted.len() != before {
        tracing::warn!(
            duplicates = before - sorted.len(),
            "duplicate bar timestamps ignored during resample"
        );
    }

    if base == target {
        return Ok(sorted);
    }
    check_multiple(base, target, label)?;

    let bucketing = Bucketing::new(target, sorted[0].timestamp, label)?;
    let mut out = Vec::new();
    let mut dropped = 0usize;
    let mut start = 0usize;

    while start < sorted.len() {
        let (bucket_start, bucket_end) = bucketing.bounds(sorted[start].timestamp, label)?;
        let mut end = start;
        while end < sorted.len() && sorted[end].timestamp < bucket_end {
            end += 1;
        }
        let group = &sorted[start..end];
        let expected = expected_constituents(base, target, bucket_start, bucket_end);
        if group.len() == expected {
            out.push(aggregate(group, bucket_start, target));
        } else {
            dropped += 1;
        }
        start = end;
    }

    if dropped > 0 {
        tracing::warn!(dropped, target = %target, "incomplete resample buckets dropped");
    }
    Ok(out)
}

fn check_multiple(base: Timeframe, target: Timeframe, label: &str) -> Result<(), TacalcError> {
    match (base.fixed_duration(), target.fixed_duration()) {
        (Some(b), Some(t)) => {
            let (b, t) = (b.num_seconds(), t.num_seconds());
            if t <= b || t % b != 0 {
                return Err(TacalcError::invalid_timeframe(
                    label,
                    format!("not a coarser multiple of base timeframe {}", base),
                ));
            }
        }
        (Some(b), None) => {
            if Duration::days(1).num_seconds() % b.num_seconds() != 0 {
                return Err(TacalcError::invalid_timeframe(
                    label,
                    format!("base timeframe {} does not divide a calendar day", base),
                ));
            }
        }
        (None, Some(_)) => {
            return Err(TacalcError::invalid_timeframe(
                label,
                format!("finer than base timeframe {}", base),
            ));
        }
        (None, None) => {
            if target.count <= base.count || target.count % base.count != 0 {
                return Err(TacalcError::invalid_timeframe(
                    label,
                    format!("not a coarser multiple of base timeframe {}", base),
                ));
            }
        }
    }
    Ok(())
}

fn expected_constituents(
    base: Timeframe,
    target: Timeframe,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> usize {
    match base.fixed_duration() {
        Some(b) => ((end - start).num_seconds() / b.num_seconds()) as usize,
        None => (target.count / base.count) as usize,
    }
}

fn aggregate(group: &[PriceBar], bucket_start: DateTime<Utc>, target: Timeframe) -> PriceBar {
    let first = &group[0];
    let last = &group[group.len() - 1];
    PriceBar {
        symbol: first.symbol.clone(),
        timestamp: bucket_start,
        timeframe: target.to_string(),
        open: first.open,
        high: group.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
        low: group.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
        close: last.close,
        volume: group.iter().map(|b| b.volume).sum(),
    }
}

struct Bucketing {
    target: Timeframe,
    origin: DateTime<Utc>,
    origin_month: i64,
}

impl Bucketing {
    fn new(target: Timeframe, first: DateTime<Utc>, label: &str) -> Result<Self, TacalcError> {
        let day = first.date_naive();
        let origin_day = match target.unit {
            TimeUnit::Week => day - Duration::days(i64::from(day.weekday().num_days_from_monday())),
            TimeUnit::Month => NaiveDate::from_ymd_opt(day.year(), day.month(), 1)
                .ok_or_else(|| TacalcError::invalid_timeframe(label, "date out of range"))?,
            _ => day,
        };
        Ok(Self {
            target,
            origin: origin_day.and_time(NaiveTime::MIN).and_utc(),
            origin_month: month_index(origin_day),
        })
    }

    fn bounds(
        &self,
        ts: DateTime<Utc>,
        label: &str,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), TacalcError> {
        match self.target.fixed_duration() {
            Some(width) => {
                let secs = width.num_seconds();
                let offset = (ts - self.origin).num_seconds().div_euclid(secs);
                let start = self.origin + Duration::seconds(offset * secs);
                Ok((start, start + width))
            }
            None => {
                let count = i64::from(self.target.count);
                let k = (month_index(ts.date_naive()) - self.origin_month).div_euclid(count);
                let start_index = self.origin_month + k * count;
                Ok((
                    month_start(start_index, label)?,
                    month_start(start_index + count, label)?,
                ))
            }
        }
    }
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn month_start(index: i64, label: &str) -> Result<DateTime<Utc>, TacalcError> {
    let year = i32::try_from(index.div_euclid(12))
        .map_err(|_| TacalcError::invalid_timeframe(label, "date out of range"))?;
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .ok_or_else(|| TacalcError::invalid_timeframe(label, "date out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minute_bar(minute: i64, close: f64) -> PriceBar {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        PriceBar {
            symbol: "BTCUSDT".into(),
            timestamp: ts,
            timeframe: "1m".into(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    fn day_bar(date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            symbol: "ETHUSDT".into(),
            timestamp: date.and_time(NaiveTime::MIN).and_utc(),
            timeframe: "1d".into(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn ten_minutes_make_two_five_minute_bars() {
        let bars: Vec<PriceBar> = (0..10).map(|i| minute_bar(i, 100.0 + i as f64)).collect();
        let out = resample(&bars, "5m").unwrap();
        assert_eq!(out.len(), 2);

        let first = &out[0];
        assert_eq!(first.timestamp, bars[0].timestamp);
        assert_eq!(first.timeframe, "5m");
        assert_eq!(first.open, 99.5);
        assert_eq!(first.close, 104.0);
        assert_eq!(first.high, 105.0);
        assert_eq!(first.low, 99.0);
        assert_eq!(first.volume, 50.0);

        assert_eq!(out[1].timestamp, bars[5].timestamp);
        assert_eq!(out[1].close, 109.0);
    }

    #[test]
    fn bucket_missing_a_bar_is_dropped() {
        let bars: Vec<PriceBar> = (0..10)
            .filter(|&i| i != 7)
            .map(|i| minute_bar(i, 100.0))
            .collect();
        let out = resample(&bars, "5m").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, bars[0].timestamp);
    }

    #[test]
    fn leading_partial_bucket_is_dropped() {
        let bars: Vec<PriceBar> = (3..15).map(|i| minute_bar(i, 100.0)).collect();
        let out = resample(&bars, "5m").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, minute_bar(5, 0.0).timestamp);
        assert_eq!(out[1].timestamp, minute_bar(10, 0.0).timestamp);
    }

    #[test]
    fn unsorted_input_is_ordered_first() {
        let mut bars: Vec<PriceBar> = (0..5).map(|i| minute_bar(i, 100.0 + i as f64)).collect();
        bars.reverse();
        let out = resample(&bars, "5m").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].close, 104.0);
    }

    #[test]
    fn same_timeframe_is_identity() {
        let bars: Vec<PriceBar> = (0..3).map(|i| minute_bar(i, 100.0)).collect();
        assert_eq!(resample(&bars, "1m").unwrap(), bars);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(resample(&[], "1h").unwrap().is_empty());
    }

    #[test]
    fn invalid_label_rejected_even_without_bars() {
        assert!(matches!(
            resample(&[], "5x"),
            Err(TacalcError::InvalidTimeframe { .. })
        ));
    }

    #[test]
    fn non_multiple_target_rejected() {
        let mut bars: Vec<PriceBar> = (0..10).map(|i| minute_bar(i, 100.0)).collect();
        for b in &mut bars {
            b.timeframe = "2m".into();
        }
        let err = resample(&bars, "3m").unwrap_err();
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn finer_target_rejected() {
        let bars = vec![day_bar(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 1.0)];
        assert!(matches!(
            resample(&bars, "1h"),
            Err(TacalcError::InvalidTimeframe { .. })
        ));
    }

    #[test]
    fn mixed_base_timeframes_rejected() {
        let mut bars: Vec<PriceBar> = (0..2).map(|i| minute_bar(i, 100.0)).collect();
        bars[1].timeframe = "5m".into();
        assert!(matches!(
            resample(&bars, "1h"),
            Err(TacalcError::InvalidTimeframe { .. })
        ));
    }

    #[test]
    fn weekly_buckets_start_on_monday() {
        // 2024-01-01 is a Monday.
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<PriceBar> = (0..14)
            .map(|i| day_bar(start + Duration::days(i), i as f64 + 1.0))
            .collect();
        let out = resample(&bars, "1w").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].close, 7.0);
        assert_eq!(out[1].open, 8.0);
        assert_eq!(out[1].volume, 7.0);
    }

    #[test]
    fn monthly_buckets_follow_calendar() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        // February 2024 has 29 days; include all of February plus 10 days of March.
        let bars: Vec<PriceBar> = (0..39)
            .map(|i| day_bar(start + Duration::days(i), 1.0))
            .collect();
        let out = resample(&bars, "1M").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].volume, 29.0);
        assert_eq!(out[0].timeframe, "1M");
    }

    #[test]
    fn hourly_from_minutes() {
        let bars: Vec<PriceBar> = (0..120).map(|i| minute_bar(i, 50.0)).collect();
        let out = resample(&bars, "1h").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].volume, 600.0);
    }
}
