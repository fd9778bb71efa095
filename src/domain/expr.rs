//! Restricted expression tree.
//!
//! An [`Expr`] can only be obtained from [`crate::domain::validator::validate`],
//! so every tree the evaluator sees is built from allow-listed constructs.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "**",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
    /// `element for target in iter [if filter]*`
    Comprehension {
        element: Box<Expr>,
        target: String,
        iter: Box<Expr>,
        filters: Vec<Expr>,
    },
}

/// Canonical form: binary operations fully parenthesized.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Literal::Number(n)) => write!(f, "{}", n),
            Expr::Literal(Literal::Text(t)) => write!(f, "{:?}", t),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                write_joined(f, args)?;
                write!(f, ")")
            }
            Expr::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Expr::Comprehension {
                element,
                target,
                iter,
                filters,
            } => {
                write!(f, "[{} for {} in {}", element, target, iter)?;
                for filter in filters {
                    write!(f, " if {}", filter)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Expr {
    /// Names read from the enclosing environment, excluding comprehension targets.
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut free = BTreeSet::new();
        let mut bound = Vec::new();
        self.collect_free(&mut bound, &mut free);
        free
    }

    fn collect_free(&self, bound: &mut Vec<String>, free: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                if !bound.iter().any(|b| b == name) {
                    free.insert(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_free(bound, free),
            Expr::Binary { left, right, .. } => {
                left.collect_free(bound, free);
                right.collect_free(bound, free);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_free(bound, free);
                }
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_free(bound, free);
                }
            }
            Expr::Comprehension {
                element,
                target,
                iter,
                filters,
            } => {
                iter.collect_free(bound, free);
                for filter in filters {
                    filter.collect_free(bound, free);
                }
                bound.push(target.clone());
                element.collect_free(bound, free);
                bound.pop();
            }
        }
    }

    /// Names of every function the expression calls.
    pub fn called_functions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_calls(&mut names);
        names
    }

    fn collect_calls(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) | Expr::Var(_) => {}
            Expr::Neg(inner) => inner.collect_calls(names),
            Expr::Binary { left, right, .. } => {
                left.collect_calls(names);
                right.collect_calls(names);
            }
            Expr::Call { name, args } => {
                names.insert(name.clone());
                for arg in args {
                    arg.collect_calls(names);
                }
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_calls(names);
                }
            }
            Expr::Comprehension {
                element,
                iter,
                filters,
                ..
            } => {
                iter.collect_calls(names);
                for filter in filters {
                    filter.collect_calls(names);
                }
                element.collect_calls(names);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn display_is_fully_parenthesized() {
        let expr = Expr::Binary {
            op: ArithOp::Mul,
            left: Box::new(Expr::Binary {
                op: ArithOp::Add,
                left: Box::new(var("a")),
                right: Box::new(Expr::Literal(Literal::Number(2.0))),
            }),
            right: Box::new(Expr::Call {
                name: "sma".into(),
                args: vec![var("close"), Expr::Literal(Literal::Number(3.0))],
            }),
        };
        assert_eq!(expr.to_string(), "((a + 2) * sma(close, 3))");
    }

    #[test]
    fn free_variables_of_arithmetic() {
        let expr = Expr::Binary {
            op: ArithOp::Add,
            left: Box::new(var("a")),
            right: Box::new(Expr::Neg(Box::new(var("b")))),
        };
        let free: Vec<String> = expr.free_variables().into_iter().collect();
        assert_eq!(free, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn comprehension_target_is_not_free_in_element() {
        let expr = Expr::Comprehension {
            element: Box::new(Expr::Call {
                name: "sma".into(),
                args: vec![var("close"), var("n")],
            }),
            target: "n".into(),
            iter: Box::new(var("windows")),
            filters: vec![],
        };
        let free = expr.free_variables();
        assert!(free.contains("close"));
        assert!(free.contains("windows"));
        assert!(!free.contains("n"));
    }

    #[test]
    fn comprehension_target_is_free_in_its_own_iterable_and_filter() {
        let expr = Expr::Comprehension {
            element: Box::new(var("x")),
            target: "x".into(),
            iter: Box::new(var("x")),
            filters: vec![var("x")],
        };
        assert!(expr.free_variables().contains("x"));
    }

    #[test]
    fn called_functions_are_collected() {
        let expr = Expr::Call {
            name: "ema".into(),
            args: vec![
                Expr::Call {
                    name: "diff".into(),
                    args: vec![var("close")],
                },
                Expr::Literal(Literal::Number(3.0)),
            ],
        };
        let names: Vec<String> = expr.called_functions().into_iter().collect();
        assert_eq!(names, vec!["diff".to_string(), "ema".to_string()]);
    }

    #[test]
    fn arith_op_display() {
        assert_eq!(ArithOp::Pow.to_string(), "**");
        assert_eq!(ArithOp::Mod.to_string(), "%");
    }
}
