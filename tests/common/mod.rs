#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use tacalc::domain::definition::{
    ExecPlan, IndicatorDefinition, IndicatorPatch, JsonMap, NewIndicator, Step, now_micros,
};
use tacalc::domain::error::TacalcError;
pub use tacalc::domain::ohlcv::PriceBar;
use tacalc::ports::bar_port::PriceBarPort;
use tacalc::ports::definition_port::DefinitionStore;

pub struct MockBarPort {
    pub data: HashMap<(String, String), Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
    pub requests: RefCell<Vec<(String, String, usize)>>,
}

impl MockBarPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, bars: Vec<PriceBar>) -> Self {
        if let Some(first) = bars.first() {
            let key = (first.symbol.clone(), first.timeframe.clone());
            self.data.insert(key, bars);
        }
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl PriceBarPort for MockBarPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<PriceBar>, TacalcError> {
        self.requests
            .borrow_mut()
            .push((symbol.to_string(), timeframe.to_string(), limit));
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TacalcError::Database {
                reason: reason.clone(),
            });
        }
        let bars = self
            .data
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_default();
        let skip = bars.len().saturating_sub(limit);
        Ok(bars.into_iter().skip(skip).collect())
    }
}

/// In-memory definition store keyed by id.
pub struct MockStore {
    pub definitions: RefCell<Vec<IndicatorDefinition>>,
    pub delete_error: Option<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            definitions: RefCell::new(Vec::new()),
            delete_error: None,
        }
    }

    pub fn with_delete_error(mut self, reason: &str) -> Self {
        self.delete_error = Some(reason.to_string());
        self
    }
}

impl DefinitionStore for MockStore {
    fn create(&self, new: NewIndicator) -> Result<IndicatorDefinition, TacalcError> {
        new.validate()?;
        let mut defs = self.definitions.borrow_mut();
        if defs.iter().any(|d| d.indicator_name == new.indicator_name) {
            return Err(TacalcError::DuplicateName {
                name: new.indicator_name,
            });
        }
        let def = new.into_definition(format!("id-{}", defs.len() + 1), now_micros());
        defs.push(def.clone());
        Ok(def)
    }

    fn read(&self, id_or_name: &str) -> Result<Option<IndicatorDefinition>, TacalcError> {
        let defs = self.definitions.borrow();
        Ok(defs
            .iter()
            .find(|d| d.id == id_or_name)
            .or_else(|| defs.iter().find(|d| d.indicator_name == id_or_name))
            .cloned())
    }

    fn update(&self, id: &str, patch: IndicatorPatch) -> Result<IndicatorDefinition, TacalcError> {
        let mut defs = self.definitions.borrow_mut();
        let def = defs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| TacalcError::NotFound { id: id.to_string() })?;
        patch.apply(def, now_micros())?;
        Ok(def.clone())
    }

    fn try_delete(&self, id: &str) -> Result<bool, TacalcError> {
        if let Some(reason) = &self.delete_error {
            return Err(TacalcError::DatabaseQuery {
                reason: reason.clone(),
            });
        }
        let mut defs = self.definitions.borrow_mut();
        let before = defs.len();
        defs.retain(|d| d.id != id);
        Ok(defs.len() != before)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndicatorDefinition>, TacalcError> {
        let mut defs = self.definitions.borrow().clone();
        defs.sort_by(|a, b| a.indicator_name.cmp(&b.indicator_name));
        Ok(defs.into_iter().skip(offset).take(limit).collect())
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn make_bar(symbol: &str, timeframe: &str, ts: DateTime<Utc>, close: f64) -> PriceBar {
    PriceBar {
        symbol: symbol.to_string(),
        timestamp: ts,
        timeframe: timeframe.to_string(),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 10.0,
    }
}

/// Consecutive one-minute bars from midnight with closes `start`, `start + 1`, ...
pub fn minute_bars(symbol: &str, count: usize, start: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| {
            make_bar(
                symbol,
                "1m",
                t0() + Duration::minutes(i as i64),
                start + i as f64,
            )
        })
        .collect()
}

pub fn object(value: serde_json::Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}

pub fn plan(steps: &[(&str, &str)], formula: &str) -> ExecPlan {
    ExecPlan {
        steps: steps
            .iter()
            .map(|(name, expr)| Step {
                name: name.to_string(),
                expr: expr.to_string(),
            })
            .collect(),
        formula: formula.to_string(),
    }
}

pub fn indicator(name: &str, plan: Option<ExecPlan>, parameters: JsonMap) -> NewIndicator {
    NewIndicator {
        indicator_name: name.to_string(),
        category: "test".to_string(),
        description: String::new(),
        formula: plan
            .as_ref()
            .map(|p| p.formula.clone())
            .unwrap_or_else(|| "close".to_string()),
        dependencies: object(json!({})),
        parameters,
        exec_plan: plan,
    }
}
