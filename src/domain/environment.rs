//! Per-evaluation name bindings.
//!
//! Seeded from the base price columns and merged parameters, then grown by
//! one binding per executed step. Never shared between evaluations.

use crate::domain::error::TacalcError;
use crate::domain::ohlcv::{BASE_COLUMNS, PriceFrame};
use crate::domain::validator::NameSet;
use crate::domain::value::Value;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

/// Legacy column names bound alongside the base columns.
pub const COLUMN_ALIASES: [(&str, &str); 4] = [
    ("open_price", "open"),
    ("high_price", "high"),
    ("low_price", "low"),
    ("close_price", "close"),
];

#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: BTreeMap<String, Value>,
    /// Declared names whose value is null.
    unset: BTreeSet<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every base column (and its alias) from `frame`.
    pub fn from_frame(frame: &PriceFrame) -> Result<Self, TacalcError> {
        let mut env = Self::new();
        for name in BASE_COLUMNS {
            let column = frame.column(name).ok_or_else(|| {
                TacalcError::environment(format!("price data has no '{}' column", name))
            })?;
            if column.len() != frame.len() {
                return Err(TacalcError::environment(format!(
                    "column '{}' has {} values for {} timestamps",
                    name,
                    column.len(),
                    frame.len()
                )));
            }
            env.insert(name, Value::Series(column.to_vec()));
        }
        for (alias, name) in COLUMN_ALIASES {
            if let Some(value) = env.get(name).cloned() {
                env.insert(alias, value);
            }
        }
        Ok(env)
    }

    /// Bind parameters; a parameter may not shadow a price column.
    pub fn bind_parameters(&mut self, params: &Map<String, JsonValue>) -> Result<(), TacalcError> {
        for (name, raw) in params {
            if is_price_column(name) {
                return Err(TacalcError::environment(format!(
                    "parameter '{}' would shadow a price column",
                    name
                )));
            }
            match json_to_value(name, raw)? {
                Some(value) => {
                    self.unset.remove(name);
                    self.insert(name, value);
                }
                None => {
                    self.values.remove(name);
                    self.unset.insert(name.clone());
                }
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// True if `name` is bound or declared.
    pub fn is_bound(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.unset.contains(name)
    }

    pub fn is_unset(&self, name: &str) -> bool {
        self.unset.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values
            .keys()
            .chain(self.unset.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.unset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NameSet for Environment {
    fn contains_name(&self, name: &str) -> bool {
        self.is_bound(name)
    }
}

pub fn is_price_column(name: &str) -> bool {
    BASE_COLUMNS.contains(&name) || COLUMN_ALIASES.iter().any(|(alias, _)| *alias == name)
}

fn json_to_value(name: &str, raw: &JsonValue) -> Result<Option<Value>, TacalcError> {
    match raw {
        JsonValue::Null => Ok(None),
        JsonValue::Bool(b) => Ok(Some(Value::Number(if *b { 1.0 } else { 0.0 }))),
        JsonValue::Number(n) => n.as_f64().map(|v| Some(Value::Number(v))).ok_or_else(|| {
            TacalcError::environment(format!("parameter '{}' is not representable", name))
        }),
        JsonValue::String(s) => Ok(Some(Value::Text(s.clone()))),
        JsonValue::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match json_to_value(name, item)? {
                    Some(v) => values.push(v),
                    None => values.push(Value::Number(f64::NAN)),
                }
            }
            Ok(Some(Value::List(values)))
        }
        JsonValue::Object(_) => Err(TacalcError::environment(format!(
            "parameter '{}' must be a number, string or list",
            name
        ))),
    }
}
