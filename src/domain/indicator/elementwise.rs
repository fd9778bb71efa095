//! Pointwise transforms: differences, running sums, extrema, absolute value
//! and lag.

use crate::domain::error::TacalcError;
use crate::domain::indicator::{expect_arity, integer_arg, series_arg};
use crate::domain::value::Value;

pub fn calculate_diff(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

/// Running sum that passes over missing points, leaving them missing.
pub fn calculate_cumsum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f64::NAN
            } else {
                total += v;
                total
            }
        })
        .collect()
}

/// Lag by `n` points; negative `n` leads.
pub fn calculate_shift(values: &[f64], n: i64) -> Vec<f64> {
    let len = values.len() as i64;
    (0..len)
        .map(|i| {
            let src = i - n;
            if (0..len).contains(&src) {
                values[src as usize]
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// `diff(series)`
pub fn diff(args: &[Value]) -> Result<Value, TacalcError> {
    expect_arity(args, 1)?;
    Ok(Value::Series(calculate_diff(series_arg(args, 0)?)))
}

/// `cumsum(series)`
pub fn cumsum(args: &[Value]) -> Result<Value, TacalcError> {
    expect_arity(args, 1)?;
    Ok(Value::Series(calculate_cumsum(series_arg(args, 0)?)))
}

/// `shift(series, n)`
pub fn shift(args: &[Value]) -> Result<Value, TacalcError> {
    expect_arity(args, 2)?;
    let values = series_arg(args, 0)?;
    let n = integer_arg(args, 1)?;
    Ok(Value::Series(calculate_shift(values, n)))
}

/// `abs(x)` for a number or a series.
pub fn abs(args: &[Value]) -> Result<Value, TacalcError> {
    expect_arity(args, 1)?;
    match &args[0] {
        Value::Number(v) => Ok(Value::Number(v.abs())),
        Value::Series(values) => Ok(Value::Series(values.iter().map(|v| v.abs()).collect())),
        other => Err(TacalcError::evaluation(format!(
            "argument 1 must be a number or series, got {}",
            other.type_name()
        ))),
    }
}

/// `max(a, b)` elementwise.
pub fn max(args: &[Value]) -> Result<Value, TacalcError> {
    pairwise(args, |a, b| if a >= b { a } else { b })
}

/// `min(a, b)` elementwise.
pub fn min(args: &[Value]) -> Result<Value, TacalcError> {
    pairwise(args, |a, b| if a <= b { a } else { b })
}

/// Combine two numbers or series with scalar broadcast. Missing propagates.
fn pairwise(args: &[Value], pick: fn(f64, f64) -> f64) -> Result<Value, TacalcError> {
    expect_arity(args, 2)?;
    let f = |a: f64, b: f64| {
        if a.is_nan() || b.is_nan() {
            f64::NAN
        } else {
            pick(a, b)
        }
    };
    match (&args[0], &args[1]) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a, *b))),
        (Value::Series(a), Value::Number(b)) => {
            Ok(Value::Series(a.iter().map(|&x| f(x, *b)).collect()))
        }
        (Value::Number(a), Value::Series(b)) => {
            Ok(Value::Series(b.iter().map(|&y| f(*a, y)).collect()))
        }
        (Value::Series(a), Value::Series(b)) => {
            if a.len() != b.len() {
                return Err(TacalcError::evaluation(format!(
                    "series length mismatch: {} vs {}",
                    a.len(),
                    b.len()
                )));
            }
            Ok(Value::Series(
                a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect(),
            ))
        }
        (a, b) => Err(TacalcError::evaluation(format!(
            "arguments must be numbers or series, got {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}
