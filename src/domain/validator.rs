//! Default-deny grammar validator.
//!
//! Converts a parsed [`Node`] into a restricted [`Expr`]. Only the constructs
//! matched explicitly below are accepted; every other node kind is rejected
//! with `SyntaxRejected` at its source position. Validation is the only
//! barrier between author-supplied text and evaluation.

use crate::domain::error::{ParseError, TacalcError};
use crate::domain::expr::{ArithOp, Expr, Literal};
use crate::domain::expr_parser;
use crate::domain::syntax::{BinaryOperator, Node, NodeKind, UnaryOperator};
use std::collections::{BTreeSet, HashSet};

/// A set of permitted identifiers.
pub trait NameSet {
    fn contains_name(&self, name: &str) -> bool;
}

impl NameSet for HashSet<String> {
    fn contains_name(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl NameSet for BTreeSet<String> {
    fn contains_name(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl NameSet for [&str] {
    fn contains_name(&self, name: &str) -> bool {
        self.contains(&name)
    }
}

impl<const N: usize> NameSet for [&str; N] {
    fn contains_name(&self, name: &str) -> bool {
        self.contains(&name)
    }
}

impl<T: NameSet + ?Sized> NameSet for &T {
    fn contains_name(&self, name: &str) -> bool {
        (**self).contains_name(name)
    }
}

/// Parse and validate `source`, returning the restricted tree on success.
pub fn validate(
    source: &str,
    functions: &dyn NameSet,
    variables: &dyn NameSet,
) -> Result<Expr, TacalcError> {
    let node = expr_parser::parse(source)?;
    validate_node(&node, functions, variables)
}

pub fn validate_node(
    node: &Node,
    functions: &dyn NameSet,
    variables: &dyn NameSet,
) -> Result<Expr, TacalcError> {
    let mut validator = Validator {
        functions,
        variables,
        bound: Vec::new(),
        in_comprehension: false,
    };
    validator.visit(node)
}

struct Validator<'a> {
    functions: &'a dyn NameSet,
    variables: &'a dyn NameSet,
    bound: Vec<String>,
    in_comprehension: bool,
}

fn rejected(message: impl Into<String>, position: usize) -> TacalcError {
    TacalcError::SyntaxRejected(ParseError::new(message, position))
}

fn arith_op(op: BinaryOperator) -> Option<ArithOp> {
    match op {
        BinaryOperator::Add => Some(ArithOp::Add),
        BinaryOperator::Sub => Some(ArithOp::Sub),
        BinaryOperator::Mul => Some(ArithOp::Mul),
        BinaryOperator::Div => Some(ArithOp::Div),
        BinaryOperator::Mod => Some(ArithOp::Mod),
        BinaryOperator::Pow => Some(ArithOp::Pow),
        BinaryOperator::FloorDiv => None,
    }
}

impl Validator<'_> {
    fn visit(&mut self, node: &Node) -> Result<Expr, TacalcError> {
        match &node.kind {
            NodeKind::Number(v) => Ok(Expr::Literal(Literal::Number(*v))),
            NodeKind::Text(s) => Ok(Expr::Literal(Literal::Text(s.clone()))),
            NodeKind::Name(name) => {
                if self.bound.iter().any(|b| b == name) || self.variables.contains_name(name) {
                    Ok(Expr::Var(name.clone()))
                } else {
                    Err(TacalcError::UnknownVariable { name: name.clone() })
                }
            }
            NodeKind::Unary {
                op: UnaryOperator::Neg,
                operand,
            } => Ok(Expr::Neg(Box::new(self.visit(operand)?))),
            NodeKind::Binary { op, left, right } => {
                let op = arith_op(*op)
                    .ok_or_else(|| rejected("floor division is not allowed", node.position))?;
                let left = self.visit(left)?;
                let right = self.visit(right)?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            NodeKind::Call {
                func,
                args,
                keywords,
            } => {
                let name = match &func.kind {
                    NodeKind::Name(name) => name,
                    _ => {
                        return Err(rejected(
                            "only calls to a bare function name are allowed",
                            func.position,
                        ));
                    }
                };
                if let Some((_, value)) = keywords.first() {
                    return Err(rejected("keyword arguments are not allowed", value.position));
                }
                if !self.functions.contains_name(name) {
                    return Err(TacalcError::UnknownFunction { name: name.clone() });
                }
                let args = args
                    .iter()
                    .map(|arg| self.visit(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Call {
                    name: name.clone(),
                    args,
                })
            }
            NodeKind::List(items) | NodeKind::Tuple(items) => items
                .iter()
                .map(|item| self.visit(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Expr::List),
            NodeKind::Comprehension {
                element,
                generators,
            } => {
                if self.in_comprehension {
                    return Err(rejected(
                        "nested comprehensions are not allowed",
                        node.position,
                    ));
                }
                let clause = match generators.as_slice() {
                    [clause] => clause,
                    [_, second, ..] => {
                        return Err(rejected(
                            "only a single 'for' clause is allowed",
                            second.position,
                        ));
                    }
                    [] => return Err(rejected("comprehension without 'for'", node.position)),
                };
                let target = match clause.targets.as_slice() {
                    [target] => target,
                    _ => {
                        return Err(rejected(
                            "comprehension must bind exactly one name",
                            clause.position,
                        ));
                    }
                };

                self.in_comprehension = true;
                let result =
                    self.visit_comprehension(element, target, &clause.iter, &clause.conditions);
                self.in_comprehension = false;
                result
            }
            other => Err(rejected(
                format!("{} is not allowed", describe(other)),
                node.position,
            )),
        }
    }

    fn visit_comprehension(
        &mut self,
        element: &Node,
        target: &str,
        iter: &Node,
        conditions: &[Node],
    ) -> Result<Expr, TacalcError> {
        let iter = self.visit(iter)?;
        let filters = conditions
            .iter()
            .map(|c| self.visit(c))
            .collect::<Result<Vec<_>, _>>()?;

        self.bound.push(target.to_string());
        let element = self.visit(element);
        self.bound.pop();

        Ok(Expr::Comprehension {
            element: Box::new(element?),
            target: target.to_string(),
            iter: Box::new(iter),
            filters,
        })
    }
}

fn describe(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Unary { op, .. } => {
            let symbol = match op {
                UnaryOperator::Neg => "-",
                UnaryOperator::Pos => "+",
                UnaryOperator::Invert => "~",
                UnaryOperator::Not => "not",
            };
            format!("unary operator '{}'", symbol)
        }
        other => other.describe().to_string(),
    }
}
