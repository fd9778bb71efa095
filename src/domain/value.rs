//! Runtime values produced by evaluation.
//!
//! Series are aligned to the price frame's timestamps; missing points are `NaN`.

use crate::domain::error::TacalcError;
use crate::domain::expr::ArithOp;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Series(Vec<f64>),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Series(_) => "series",
            Value::List(_) => "list",
        }
    }

    /// Non-zero finite numbers and non-empty text, series and lists are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(v) => v.is_finite() && *v != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Series(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            Value::Series(s) => Some(s),
            _ => None,
        }
    }

    pub fn negate(self) -> Result<Value, TacalcError> {
        match self {
            Value::Number(v) => Ok(Value::Number(-v)),
            Value::Series(s) => Ok(Value::Series(s.into_iter().map(|v| -v).collect())),
            Value::List(items) => items
                .into_iter()
                .map(Value::negate)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Text(_) => Err(TacalcError::evaluation("cannot negate text")),
        }
    }

    /// Apply an arithmetic operator with scalar broadcasting.
    ///
    /// Series must match in length; lists combine elementwise with equal-length
    /// lists and broadcast against anything else.
    pub fn binary(op: ArithOp, left: Value, right: Value) -> Result<Value, TacalcError> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(apply(op, a, b))),
            (Value::Series(a), Value::Number(b)) => Ok(Value::Series(
                a.into_iter().map(|x| apply(op, x, b)).collect(),
            )),
            (Value::Number(a), Value::Series(b)) => Ok(Value::Series(
                b.into_iter().map(|x| apply(op, a, x)).collect(),
            )),
            (Value::Series(a), Value::Series(b)) => {
                if a.len() != b.len() {
                    return Err(TacalcError::evaluation(format!(
                        "series length mismatch for '{}': {} vs {}",
                        op,
                        a.len(),
                        b.len()
                    )));
                }
                Ok(Value::Series(
                    a.into_iter()
                        .zip(b)
                        .map(|(x, y)| apply(op, x, y))
                        .collect(),
                ))
            }
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Err(TacalcError::evaluation(format!(
                        "list length mismatch for '{}': {} vs {}",
                        op,
                        a.len(),
                        b.len()
                    )));
                }
                a.into_iter()
                    .zip(b)
                    .map(|(x, y)| Value::binary(op, x, y))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            (Value::List(a), other) if !matches!(other, Value::Text(_)) => a
                .into_iter()
                .map(|x| Value::binary(op, x, other.clone()))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (other, Value::List(b)) if !matches!(other, Value::Text(_)) => b
                .into_iter()
                .map(|y| Value::binary(op, other.clone(), y))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (a, b) => Err(TacalcError::evaluation(format!(
                "unsupported operand types for '{}': {} and {}",
                op,
                a.type_name(),
                b.type_name()
            ))),
        }
    }
}

fn apply(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => floored_mod(a, b),
        ArithOp::Pow => a.powf(b),
    }
}

/// Remainder taking the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}
