//! Indicator definitions and their create/update payloads.

use crate::domain::error::TacalcError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub type JsonMap = Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub expr: String,
}

/// Ordered named steps plus a terminal formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecPlan {
    #[serde(default)]
    pub steps: Vec<Step>,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDefinition {
    pub id: String,
    pub indicator_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub formula: String,
    #[serde(default)]
    pub dependencies: JsonMap,
    #[serde(default)]
    pub parameters: JsonMap,
    #[serde(default)]
    pub exec_plan: Option<ExecPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewIndicator {
    pub indicator_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub formula: String,
    #[serde(default)]
    pub dependencies: JsonMap,
    #[serde(default)]
    pub parameters: JsonMap,
    #[serde(default)]
    pub exec_plan: Option<ExecPlan>,
}

/// Partial update; `None` fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPatch {
    #[serde(default)]
    pub indicator_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub dependencies: Option<JsonMap>,
    #[serde(default)]
    pub parameters: Option<JsonMap>,
    #[serde(default)]
    pub exec_plan: Option<ExecPlan>,
}

/// Current time at the microsecond precision the stores keep.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn require_non_empty(field: &str, value: &str) -> Result<(), TacalcError> {
    if value.trim().is_empty() {
        return Err(TacalcError::InvalidDefinition {
            reason: format!("{} must not be empty", field),
        });
    }
    Ok(())
}

impl NewIndicator {
    pub fn validate(&self) -> Result<(), TacalcError> {
        require_non_empty("indicator_name", &self.indicator_name)?;
        require_non_empty("formula", &self.formula)
    }

    /// Assign identity and timestamps.
    pub fn into_definition(self, id: String, now: DateTime<Utc>) -> IndicatorDefinition {
        IndicatorDefinition {
            id,
            indicator_name: self.indicator_name,
            category: self.category,
            description: self.description,
            formula: self.formula,
            dependencies: self.dependencies,
            parameters: self.parameters,
            exec_plan: self.exec_plan,
            created_at: now,
            updated_at: now,
        }
    }
}

impl IndicatorPatch {
    pub fn is_empty(&self) -> bool {
        self == &IndicatorPatch::default()
    }

    /// Merge present fields into `definition` and bump `updated_at`.
    pub fn apply(
        self,
        definition: &mut IndicatorDefinition,
        now: DateTime<Utc>,
    ) -> Result<(), TacalcError> {
        if let Some(name) = &self.indicator_name {
            require_non_empty("indicator_name", name)?;
        }
        if let Some(formula) = &self.formula {
            require_non_empty("formula", formula)?;
        }
        if let Some(v) = self.indicator_name {
            definition.indicator_name = v;
        }
        if let Some(v) = self.category {
            definition.category = v;
        }
        if let Some(v) = self.description {
            definition.description = v;
        }
        if let Some(v) = self.formula {
            definition.formula = v;
        }
        if let Some(v) = self.dependencies {
            definition.dependencies = v;
        }
        if let Some(v) = self.parameters {
            definition.parameters = v;
        }
        if let Some(v) = self.exec_plan {
            definition.exec_plan = Some(v);
        }
        definition.updated_at = now;
        Ok(())
    }
}
