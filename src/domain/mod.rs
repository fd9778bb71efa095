//! Core domain types and logic.
//!
//! Expression pipeline: [`expr_parser`] builds a [`syntax`] tree, [`validator`]
//! lowers it to an [`expr::Expr`] under a default-deny allow-list, and [`eval`]
//! evaluates it against an [`environment`] and the function [`registry`].

pub mod ohlcv;
pub mod timeframe;
pub mod resample;
pub mod syntax;
pub mod expr_parser;
pub mod expr;
pub mod value;
pub mod validator;
pub mod environment;
pub mod eval;
pub mod indicator;
pub mod registry;
pub mod definition;
pub mod exec_plan;
pub mod evaluation;
pub mod config_validation;
pub mod error;
