//! Exec plan executor.
//!
//! Runs an indicator's ordered steps against a price frame. Each step is
//! validated against the names bound so far, so a step can only see the base
//! environment and earlier steps. Any failure aborts the whole run.

use crate::domain::definition::{IndicatorDefinition, JsonMap};
use crate::domain::environment::{COLUMN_ALIASES, Environment};
use crate::domain::error::TacalcError;
use crate::domain::eval::evaluate;
use crate::domain::expr::Expr;
use crate::domain::ohlcv::{BASE_COLUMNS, PriceFrame};
use crate::domain::registry::FunctionRegistry;
use crate::domain::validator::validate;
use crate::domain::value::Value;
use std::collections::BTreeSet;

/// Definition parameters overlaid with caller overrides.
pub fn merge_parameters(parameters: &JsonMap, overrides: &JsonMap) -> JsonMap {
    let mut merged = parameters.clone();
    for (name, value) in overrides {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

pub fn run(
    definition: &IndicatorDefinition,
    frame: &PriceFrame,
    registry: &FunctionRegistry,
    overrides: &JsonMap,
) -> Result<Value, TacalcError> {
    let plan = definition
        .exec_plan
        .as_ref()
        .ok_or_else(|| TacalcError::MissingExecPlan {
            indicator: definition.indicator_name.clone(),
        })?;

    let mut env = Environment::from_frame(frame)?;
    env.bind_parameters(&merge_parameters(&definition.parameters, overrides))?;

    for step in &plan.steps {
        check_step_name(&step.name)?;
        if env.is_bound(&step.name) {
            return Err(TacalcError::InvalidDefinition {
                reason: format!("step '{}' rebinds an existing name", step.name),
            });
        }
        let expr = validate(&step.expr, registry, &env)?;
        require_set(&expr, &env, &step.name)?;
        let value = evaluate(&expr, &env, registry)?;
        tracing::debug!(
            indicator = %definition.indicator_name,
            step = %step.name,
            kind = value.type_name(),
            "exec step evaluated"
        );
        env.insert(&step.name, value);
    }

    let expr = validate(&plan.formula, registry, &env)?;
    require_set(&expr, &env, "formula")?;
    evaluate(&expr, &env, registry)
}

/// Validate every step of a plan without price data.
pub fn check_definition(
    definition: &IndicatorDefinition,
    registry: &FunctionRegistry,
) -> Result<(), TacalcError> {
    let plan = definition
        .exec_plan
        .as_ref()
        .ok_or_else(|| TacalcError::MissingExecPlan {
            indicator: definition.indicator_name.clone(),
        })?;

    let mut names: BTreeSet<String> = BASE_COLUMNS
        .iter()
        .chain(COLUMN_ALIASES.iter().map(|(alias, _)| alias))
        .map(|s| s.to_string())
        .collect();
    for name in definition.parameters.keys() {
        if names.contains(name) {
            return Err(TacalcError::environment(format!(
                "parameter '{}' would shadow a price column",
                name
            )));
        }
        names.insert(name.clone());
    }

    for step in &plan.steps {
        check_step_name(&step.name)?;
        if names.contains(&step.name) {
            return Err(TacalcError::InvalidDefinition {
                reason: format!("step '{}' rebinds an existing name", step.name),
            });
        }
        validate(&step.expr, registry, &names)?;
        names.insert(step.name.clone());
    }
    validate(&plan.formula, registry, &names)?;
    Ok(())
}

fn check_step_name(name: &str) -> Result<(), TacalcError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        return Err(TacalcError::InvalidDefinition {
            reason: format!("step name '{}' is not an identifier", name),
        });
    }
    Ok(())
}

/// A step may not read a parameter declared with a null value.
fn require_set(expr: &Expr, env: &Environment, step: &str) -> Result<(), TacalcError> {
    if let Some(name) = expr.free_variables().iter().find(|n| env.is_unset(n)) {
        return Err(TacalcError::environment(format!(
            "'{}' reads parameter '{}' which has no value",
            step, name
        )));
    }
    Ok(())
}
