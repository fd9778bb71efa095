//! Price bar representation and its columnar frame view.

use crate::domain::error::TacalcError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Names of the five base price columns, in canonical order.
pub const BASE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub timeframe: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Check the OHLCV invariants: low <= open/close <= high, nothing negative.
    pub fn validate(&self) -> Result<(), TacalcError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(TacalcError::InvalidBar {
                    reason: format!(
                        "{} {} at {}: {} must be finite and non-negative",
                        self.symbol, self.timeframe, self.timestamp, name
                    ),
                });
            }
        }
        if self.low > self.high
            || self.open < self.low
            || self.open > self.high
            || self.close < self.low
            || self.close > self.high
        {
            return Err(TacalcError::InvalidBar {
                reason: format!(
                    "{} {} at {}: open/close must lie within [low, high]",
                    self.symbol, self.timeframe, self.timestamp
                ),
            });
        }
        Ok(())
    }
}

/// Columnar view over a run of bars: one timestamp axis, named numeric columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFrame {
    pub timestamps: Vec<DateTime<Utc>>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl PriceFrame {
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.insert(name.to_string(), values);
        self
    }

    pub fn from_bars(bars: &[PriceBar]) -> Self {
        let mut open = Vec::with_capacity(bars.len());
        let mut high = Vec::with_capacity(bars.len());
        let mut low = Vec::with_capacity(bars.len());
        let mut close = Vec::with_capacity(bars.len());
        let mut volume = Vec::with_capacity(bars.len());
        for bar in bars {
            open.push(bar.open);
            high.push(bar.high);
            low.push(bar.low);
            close.push(bar.close);
            volume.push(bar.volume);
        }
        Self::new(bars.iter().map(|b| b.timestamp).collect())
            .with_column("open", open)
            .with_column("high", high)
            .with_column("low", low)
            .with_column("close", close)
            .with_column("volume", volume)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> PriceBar {
        PriceBar {
            symbol: "BTCUSDT".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            timeframe: "1m".into(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50.5,
        }
    }

    #[test]
    fn valid_bar_passes() {
        assert!(sample_bar().validate().is_ok());
    }

    #[test]
    fn close_above_high_rejected() {
        let mut bar = sample_bar();
        bar.close = 111.0;
        assert!(matches!(bar.validate(), Err(TacalcError::InvalidBar { .. })));
    }

    #[test]
    fn negative_volume_rejected() {
        let mut bar = sample_bar();
        bar.volume = -1.0;
        let err = bar.validate().unwrap_err();
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn nan_price_rejected() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.validate().is_err());
    }

    #[test]
    fn frame_from_bars_has_all_base_columns() {
        let frame = PriceFrame::from_bars(&[sample_bar(), sample_bar()]);
        assert_eq!(frame.len(), 2);
        for name in BASE_COLUMNS {
            assert_eq!(frame.column(name).map(|c| c.len()), Some(2), "{name}");
        }
        assert_eq!(frame.column("close"), Some(&[105.0, 105.0][..]));
    }

    #[test]
    fn hand_built_frame_may_omit_columns() {
        let frame = PriceFrame::new(vec![]).with_column("close", vec![]);
        assert!(frame.is_empty());
        assert!(frame.column("volume").is_none());
    }
}
