//! Template interpolation for computed variables and default values.
//!
//! Templates embed expressions as `${expr}`; `$${` escapes a literal `${`.
//! Expressions support literals, dotted variable names, indexing, unary and
//! binary operators, a `?:` conditional and built-in functions
//! (`str.truncate`, `json.marshal`, `config`, ...).

mod eval;
mod functions;
mod lexer;
mod parser;

pub use eval::{eval, render, Evaluator};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown variable accessed: {0}")]
    UnknownVariable(String),
    #[error("unknown function called: {0}")]
    UnknownFunction(String),
    #[error("{name}: {message}")]
    Function { name: String, message: String },
    #[error("{0}")]
    Type(String),
}
