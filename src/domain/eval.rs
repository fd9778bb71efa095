//! Tree-walking evaluator over validated expressions.
//!
//! Comprehension targets live in child scopes layered over the environment;
//! a child scope is dropped after each element so bindings never leak.

use crate::domain::environment::Environment;
use crate::domain::error::TacalcError;
use crate::domain::expr::{Expr, Literal};
use crate::domain::registry::FunctionRegistry;
use crate::domain::value::Value;

enum Scope<'a> {
    Root(&'a Environment),
    Child {
        name: &'a str,
        value: &'a Value,
        parent: &'a Scope<'a>,
    },
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        match self {
            Scope::Root(env) => env.get(name),
            Scope::Child {
                name: bound,
                value,
                parent,
            } => {
                if *bound == name {
                    Some(value)
                } else {
                    parent.lookup(name)
                }
            }
        }
    }
}

pub fn evaluate(
    expr: &Expr,
    env: &Environment,
    registry: &FunctionRegistry,
) -> Result<Value, TacalcError> {
    eval_in(expr, &Scope::Root(env), registry)
}

fn eval_in(
    expr: &Expr,
    scope: &Scope<'_>,
    registry: &FunctionRegistry,
) -> Result<Value, TacalcError> {
    match expr {
        Expr::Literal(Literal::Number(v)) => Ok(Value::Number(*v)),
        Expr::Literal(Literal::Text(s)) => Ok(Value::Text(s.clone())),
        Expr::Var(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| TacalcError::evaluation(format!("name '{}' is not bound", name))),
        Expr::Neg(inner) => eval_in(inner, scope, registry)?.negate(),
        Expr::Binary { op, left, right } => {
            let left = eval_in(left, scope, registry)?;
            let right = eval_in(right, scope, registry)?;
            Value::binary(*op, left, right)
        }
        Expr::Call { name, args } => {
            let transform = registry.get(name).ok_or_else(|| {
                TacalcError::evaluation(format!("function '{}' is not registered", name))
            })?;
            let args = args
                .iter()
                .map(|arg| eval_in(arg, scope, registry))
                .collect::<Result<Vec<_>, _>>()?;
            transform.call(&args).map_err(|e| match e {
                TacalcError::EvaluationError { reason } => {
                    TacalcError::evaluation(format!("{}: {}", name, reason))
                }
                other => other,
            })
        }
        Expr::List(items) => items
            .iter()
            .map(|item| eval_in(item, scope, registry))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Comprehension {
            element,
            target,
            iter,
            filters,
        } => {
            let items = match eval_in(iter, scope, registry)? {
                Value::List(items) => items,
                Value::Series(points) => points.into_iter().map(Value::Number).collect(),
                other => {
                    return Err(TacalcError::evaluation(format!(
                        "cannot iterate over {}",
                        other.type_name()
                    )));
                }
            };
            for filter in filters {
                if !eval_in(filter, scope, registry)?.is_truthy() {
                    return Ok(Value::List(Vec::new()));
                }
            }

            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                let child = Scope::Child {
                    name: target.as_str(),
                    value: item,
                    parent: scope,
                };
                out.push(eval_in(element, &child, registry)?);
            }
            Ok(Value::List(out))
        }
    }
}
