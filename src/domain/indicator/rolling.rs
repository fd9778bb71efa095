//! Rolling-window statistics: maximum, minimum and sample standard deviation.

use crate::domain::error::TacalcError;
use crate::domain::indicator::{expect_arity, series_arg, window_arg, windowed};
use crate::domain::value::Value;

pub fn calculate_rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    windowed(values, period, |w| w.iter().copied().fold(f64::MIN, f64::max))
}

pub fn calculate_rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    windowed(values, period, |w| w.iter().copied().fold(f64::MAX, f64::min))
}

/// Sample standard deviation (n - 1 denominator); a window of one is missing.
pub fn calculate_stdev(values: &[f64], period: usize) -> Vec<f64> {
    windowed(values, period, |w| {
        if w.len() < 2 {
            return f64::NAN;
        }
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let variance = w
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / (w.len() - 1) as f64;
        variance.sqrt()
    })
}

fn rolling(args: &[Value], f: fn(&[f64], usize) -> Vec<f64>) -> Result<Value, TacalcError> {
    expect_arity(args, 2)?;
    let values = series_arg(args, 0)?;
    let period = window_arg(args, 1)?;
    Ok(Value::Series(f(values, period)))
}

/// `rolling_max(series, n)`
pub fn rolling_max(args: &[Value]) -> Result<Value, TacalcError> {
    rolling(args, calculate_rolling_max)
}

/// `rolling_min(series, n)`
pub fn rolling_min(args: &[Value]) -> Result<Value, TacalcError> {
    rolling(args, calculate_rolling_min)
}

/// `stdev(series, n)`
pub fn stdev(args: &[Value]) -> Result<Value, TacalcError> {
    rolling(args, calculate_stdev)
}
