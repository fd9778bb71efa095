//! Named indicator evaluation.
//!
//! Loads a definition, fetches base bars, resamples them to the requested
//! timeframe, runs the exec plan and shapes the result into one output point
//! per timestamp.

use crate::domain::config_validation::EngineSettings;
use crate::domain::definition::JsonMap;
use crate::domain::error::TacalcError;
use crate::domain::exec_plan;
use crate::domain::ohlcv::PriceFrame;
use crate::domain::registry::FunctionRegistry;
use crate::domain::resample::resample;
use crate::domain::timeframe::Timeframe;
use crate::domain::value::Value;
use crate::ports::bar_port::PriceBarPort;
use crate::ports::definition_port::DefinitionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One evaluated point; serializes as `null`, a number, or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputPoint {
    Missing,
    Scalar(f64),
    Vector(Vec<Option<f64>>),
}

impl OutputPoint {
    fn scalar(v: f64) -> Self {
        if v.is_finite() {
            OutputPoint::Scalar(v)
        } else {
            OutputPoint::Missing
        }
    }
}

pub type IndicatorOutput = BTreeMap<DateTime<Utc>, OutputPoint>;

#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    /// Definition id or name.
    pub indicator: String,
    pub symbol: String,
    pub timeframe: String,
    /// Number of output points; the configured default when `None`.
    pub lookback: Option<usize>,
    pub overrides: JsonMap,
}

pub fn evaluate_named_indicator<S, B>(
    store: &S,
    bars: &B,
    registry: &FunctionRegistry,
    settings: &EngineSettings,
    request: &EvaluationRequest,
) -> Result<IndicatorOutput, TacalcError>
where
    S: DefinitionStore + ?Sized,
    B: PriceBarPort + ?Sized,
{
    let definition = store
        .read(&request.indicator)?
        .ok_or_else(|| TacalcError::NotFound {
            id: request.indicator.clone(),
        })?;

    let target: Timeframe = request.timeframe.parse()?;
    let lookback = request.lookback.unwrap_or(settings.default_lookback);
    if lookback == 0 {
        return Err(TacalcError::evaluation("lookback must be at least 1"));
    }

    let base = settings.base_timeframe;
    let base_label = base.to_string();
    let series = if target == base {
        bars.fetch_bars(&request.symbol, &base_label, lookback)?
    } else {
        let limit = base_bars_needed(base, target, lookback)?;
        let raw = bars.fetch_bars(&request.symbol, &base_label, limit)?;
        resample(&raw, &request.timeframe)?
    };

    let frame = PriceFrame::from_bars(&series);
    let value = exec_plan::run(&definition, &frame, registry, &request.overrides)?;
    let points = shape(value, frame.len())?;

    let skip = frame.len().saturating_sub(lookback);
    let output: IndicatorOutput = frame
        .timestamps
        .into_iter()
        .zip(points)
        .skip(skip)
        .collect();

    tracing::info!(
        indicator = %definition.indicator_name,
        symbol = %request.symbol,
        timeframe = %request.timeframe,
        points = output.len(),
        "indicator evaluated"
    );
    Ok(output)
}

/// Base bars covering `lookback` target buckets plus one leading partial bucket.
fn base_bars_needed(
    base: Timeframe,
    target: Timeframe,
    lookback: usize,
) -> Result<usize, TacalcError> {
    let base_secs = base
        .fixed_duration()
        .map(|d| d.num_seconds())
        .filter(|s| *s > 0)
        .ok_or_else(|| {
            TacalcError::invalid_timeframe(&base.to_string(), "base timeframe has no fixed length")
        })?;
    let target_secs = target.max_duration().num_seconds();
    let per_bucket = (target_secs + base_secs - 1) / base_secs;
    Ok((lookback.saturating_add(1)).saturating_mul(per_bucket.max(1) as usize))
}

/// Turn an evaluation result into one output point per timestamp.
///
/// A number is broadcast to every timestamp and a series maps point for
/// point. A list becomes one vector per timestamp with one column per item;
/// number items are broadcast like a bare number. An element-wise
/// comprehension such as `[x * 2 for x in close]` therefore yields N
/// constant columns, and every timestamp carries the whole N-vector. Write
/// `close * 2` for a per-timestamp series.
pub fn shape(value: Value, len: usize) -> Result<Vec<OutputPoint>, TacalcError> {
    match value {
        Value::Number(v) => Ok(vec![OutputPoint::scalar(v); len]),
        Value::Series(s) => {
            check_len(s.len(), len)?;
            Ok(s.into_iter().map(OutputPoint::scalar).collect())
        }
        Value::List(items) => {
            let columns = items
                .into_iter()
                .map(|item| match item {
                    Value::Number(v) => Ok(vec![v; len]),
                    Value::Series(s) => {
                        check_len(s.len(), len)?;
                        Ok(s)
                    }
                    other => Err(TacalcError::evaluation(format!(
                        "list output may only hold numbers or series, found {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((0..len)
                .map(|i| {
                    OutputPoint::Vector(
                        columns
                            .iter()
                            .map(|c| Some(c[i]).filter(|v| v.is_finite()))
                            .collect(),
                    )
                })
                .collect())
        }
        Value::Text(_) => Err(TacalcError::evaluation(
            "indicator produced text, expected numbers",
        )),
    }
}

fn check_len(actual: usize, expected: usize) -> Result<(), TacalcError> {
    if actual != expected {
        return Err(TacalcError::evaluation(format!(
            "series has {} points for {} timestamps",
            actual, expected
        )));
    }
    Ok(())
}
