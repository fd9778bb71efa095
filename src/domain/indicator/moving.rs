//! Moving averages: simple, exponential and Wilder smoothing.
//!
//! EMA: k = 2/(n+1), seed with the SMA of the first n finite points, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k).
//! Wilder: same seed, then W[i] = (W[i-1]*(n-1) + x[i]) / n.
//! A missing point after the seed yields a missing output and leaves the
//! running state unchanged.

use crate::domain::error::TacalcError;
use crate::domain::indicator::{expect_arity, series_arg, window_arg, windowed};
use crate::domain::value::Value;

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    windowed(values, period, |w| w.iter().sum::<f64>() / period as f64)
}

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let k = 2.0 / (period as f64 + 1.0);
    smooth(values, period, |prev, x| x * k + prev * (1.0 - k))
}

pub fn calculate_wilder(values: &[f64], period: usize) -> Vec<f64> {
    let n = period as f64;
    smooth(values, period, |prev, x| (prev * (n - 1.0) + x) / n)
}

fn smooth(values: &[f64], period: usize, step: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let mut state: Option<f64> = None;
    let mut run_sum = 0.0;
    let mut run_len = 0;

    for (i, &x) in values.iter().enumerate() {
        match state {
            None => {
                if !x.is_finite() {
                    run_sum = 0.0;
                    run_len = 0;
                    continue;
                }
                run_sum += x;
                run_len += 1;
                if run_len == period {
                    let seed = run_sum / period as f64;
                    state = Some(seed);
                    out[i] = seed;
                }
            }
            Some(prev) => {
                if x.is_finite() {
                    let next = step(prev, x);
                    state = Some(next);
                    out[i] = next;
                }
            }
        }
    }
    out
}

fn series_window_transform(
    args: &[Value],
    f: fn(&[f64], usize) -> Vec<f64>,
) -> Result<Value, TacalcError> {
    expect_arity(args, 2)?;
    let values = series_arg(args, 0)?;
    let period = window_arg(args, 1)?;
    Ok(Value::Series(f(values, period)))
}

/// `sma(series, n)`
pub fn sma(args: &[Value]) -> Result<Value, TacalcError> {
    series_window_transform(args, calculate_sma)
}

/// `ema(series, n)`
pub fn ema(args: &[Value]) -> Result<Value, TacalcError> {
    series_window_transform(args, calculate_ema)
}

/// `wilder(series, n)`
pub fn wilder(args: &[Value]) -> Result<Value, TacalcError> {
    series_window_transform(args, calculate_wilder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::*;

    const NAN: f64 = f64::NAN;

    #[test]
    fn sma_warmup_then_mean() {
        let out = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_series_eq(&out, &[NAN, NAN, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_period_1_is_identity() {
        let out = calculate_sma(&[10.0, 20.0], 1);
        assert_series_eq(&out, &[10.0, 20.0]);
    }

    #[test]
    fn sma_gap_invalidates_windows_covering_it() {
        let out = calculate_sma(&[1.0, 2.0, NAN, 4.0, 5.0, 6.0], 2);
        assert_series_eq(&out, &[NAN, 1.5, NAN, NAN, 4.5, 5.5]);
    }

    #[test]
    fn ema_seed_is_sma() {
        let out = calculate_ema(&[10.0, 20.0, 30.0], 3);
        assert_series_eq(&out, &[NAN, NAN, 20.0]);
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        let k = 2.0 / 4.0;
        let sma = 20.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);
        assert_series_eq(&out, &[NAN, NAN, sma, ema_3, ema_4]);
    }

    #[test]
    fn ema_skips_leading_missing() {
        let out = calculate_ema(&[NAN, NAN, 2.0, 4.0, 6.0], 2);
        let k = 2.0 / 3.0;
        assert_series_eq(&out, &[NAN, NAN, NAN, 3.0, 6.0 * k + 3.0 * (1.0 - k)]);
    }

    #[test]
    fn ema_gap_after_seed_keeps_state() {
        let out = calculate_ema(&[2.0, 4.0, NAN, 6.0], 2);
        let k = 2.0 / 3.0;
        assert_series_eq(&out, &[NAN, 3.0, NAN, 6.0 * k + 3.0 * (1.0 - k)]);
    }

    #[test]
    fn ema_equal_prices() {
        let out = calculate_ema(&[100.0; 5], 3);
        assert_series_eq(&out, &[NAN, NAN, 100.0, 100.0, 100.0]);
    }

    #[test]
    fn wilder_smoothing() {
        let out = calculate_wilder(&[1.0, 2.0, 3.0, 6.0], 3);
        let seed = 2.0;
        let next = (seed * 2.0 + 6.0) / 3.0;
        assert_series_eq(&out, &[NAN, NAN, seed, next]);
    }

    #[test]
    fn insufficient_points_are_all_missing() {
        let out = calculate_wilder(&[1.0, 2.0], 3);
        assert_series_eq(&out, &[NAN, NAN]);
        assert!(calculate_ema(&[], 3).is_empty());
    }

    #[test]
    fn transform_arguments_checked() {
        assert!(sma(&[series(&[1.0, 2.0]), num(2.0)]).is_ok());
        assert!(sma(&[series(&[1.0, 2.0])]).is_err());
        assert!(ema(&[num(1.0), num(2.0)]).is_err());
        assert!(wilder(&[series(&[1.0]), num(0.0)]).is_err());
        assert!(wilder(&[series(&[1.0]), num(1.5)]).is_err());
    }
}
