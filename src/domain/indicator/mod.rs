//! Native time-series transforms backing the function registry.
//!
//! Every transform takes evaluated arguments and returns a [`Value`]. Series
//! outputs are aligned with their input; points without a complete window
//! are `NaN`.
//!
//! - `moving`: `sma`, `ema`, `wilder`
//! - `rolling`: `rolling_max`, `rolling_min`, `stdev`
//! - `elementwise`: `diff`, `cumsum`, `max`, `min`, `abs`, `shift`

pub mod elementwise;
pub mod moving;
pub mod rolling;

use crate::domain::error::TacalcError;
use crate::domain::value::Value;

const MAX_WINDOW: f64 = 1_000_000.0;

pub(crate) fn expect_arity(args: &[Value], expected: usize) -> Result<(), TacalcError> {
    if args.len() != expected {
        return Err(TacalcError::evaluation(format!(
            "expected {} argument{}, got {}",
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn series_arg(args: &[Value], index: usize) -> Result<&[f64], TacalcError> {
    match &args[index] {
        Value::Series(values) => Ok(values),
        other => Err(TacalcError::evaluation(format!(
            "argument {} must be a series, got {}",
            index + 1,
            other.type_name()
        ))),
    }
}

pub(crate) fn integer_arg(args: &[Value], index: usize) -> Result<i64, TacalcError> {
    match &args[index] {
        Value::Number(v) if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_WINDOW => {
            Ok(*v as i64)
        }
        other => Err(TacalcError::evaluation(format!(
            "argument {} must be an integer, got {}",
            index + 1,
            describe(other)
        ))),
    }
}

/// A window length: an integer of at least 1.
pub(crate) fn window_arg(args: &[Value], index: usize) -> Result<usize, TacalcError> {
    let n = integer_arg(args, index)?;
    if n < 1 {
        return Err(TacalcError::evaluation(format!(
            "window must be a positive integer, got {}",
            n
        )));
    }
    Ok(n as usize)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(v) => v.to_string(),
        other => other.type_name().to_string(),
    }
}

/// Apply `f` to each full window of `period` finite values.
pub(crate) fn windowed(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_finite()) {
            out[i] = f(window);
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn arity_check() {
        assert!(expect_arity(&[num(1.0)], 1).is_ok());
        let err = expect_arity(&[num(1.0)], 2).unwrap_err();
        assert!(err.to_string().contains("expected 2 arguments, got 1"));
    }

    #[test]
    fn window_must_be_positive_integer() {
        assert_eq!(window_arg(&[num(3.0)], 0).unwrap(), 3);
        for bad in [0.0, -2.0, 2.5, f64::NAN, f64::INFINITY, 1e12] {
            assert!(window_arg(&[num(bad)], 0).is_err(), "{bad}");
        }
        assert!(window_arg(&[series(&[3.0])], 0).is_err());
    }

    #[test]
    fn integer_allows_negative() {
        assert_eq!(integer_arg(&[num(-2.0)], 0).unwrap(), -2);
    }

    #[test]
    fn series_arg_type() {
        let args = [series(&[1.0]), num(2.0)];
        assert!(series_arg(&args, 0).is_ok());
        let err = series_arg(&args, 1).unwrap_err();
        assert!(err.to_string().contains("argument 2 must be a series"));
    }

    #[test]
    fn windowed_requires_finite_window() {
        let out = windowed(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2, |w| w.iter().sum());
        assert_series_eq(&out, &[f64::NAN, f64::NAN, f64::NAN, 7.0, 9.0]);
    }

    #[test]
    fn windowed_longer_than_input() {
        let out = windowed(&[1.0, 2.0], 5, |w| w[0]);
        assert_series_eq(&out, &[f64::NAN, f64::NAN]);
    }
}
