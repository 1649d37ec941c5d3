// src/template/condition/mod.rs

//! Boolean conditions gating whether a probe runs.
//!
//! Conditions are a deliberately small language: literals, `{name}`
//! placeholders, comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`), membership
//! (`in`, `not in`) and boolean connectives (`and`/`&&`, `or`/`||`,
//! `not`/`!`). Placeholders are resolved to bound values at evaluation time
//! and are never re-parsed as syntax.
//!
//! ```text
//! {changed} == true and {complexity} > 10
//! {branch} in ["main", "release"]
//! not ({lint} == false)
//! ```

mod lexer;
mod parser;

use std::cmp::Ordering;

use crate::errors::{ProbeDagError, Result};
use crate::template::substitute;
use crate::types::Value;

use parser::{CmpOp, Expr, Parser};

/// A parsed condition expression.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    List(Vec<Scalar>),
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lexer::tokenize(source)?;
        let expr = Parser::new(tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `lookup`, which returns the bound value of a name or
    /// `None` if the name is unbound (the placeholder then reads as its own
    /// literal text).
    pub fn evaluate<F>(&self, lookup: F) -> Result<bool>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let value = eval(&self.expr, &lookup)?;
        Ok(truthy(&value))
    }
}

/// Parse and evaluate in one go.
pub fn evaluate<F>(source: &str, lookup: F) -> Result<bool>
where
    F: Fn(&str) -> Option<Value>,
{
    Condition::parse(source)?.evaluate(lookup)
}

fn eval<F>(expr: &Expr, lookup: &F) -> Result<Scalar>
where
    F: Fn(&str) -> Option<Value>,
{
    Ok(match expr {
        Expr::Or(lhs, rhs) => {
            Scalar::Bool(truthy(&eval(lhs, lookup)?) || truthy(&eval(rhs, lookup)?))
        }
        Expr::And(lhs, rhs) => {
            Scalar::Bool(truthy(&eval(lhs, lookup)?) && truthy(&eval(rhs, lookup)?))
        }
        Expr::Not(inner) => Scalar::Bool(!truthy(&eval(inner, lookup)?)),
        Expr::Cmp(lhs, op, rhs) => {
            let lhs = eval(lhs, lookup)?;
            let rhs = eval(rhs, lookup)?;
            Scalar::Bool(compare(&lhs, *op, &rhs)?)
        }
        Expr::List(items) => Scalar::List(
            items
                .iter()
                .map(|item| eval(item, lookup))
                .collect::<Result<Vec<_>>>()?,
        ),
        Expr::Bool(b) => Scalar::Bool(*b),
        Expr::Null => Scalar::Null,
        Expr::Num(n) => Scalar::Num(*n),
        Expr::Text(template) => {
            Scalar::Str(substitute(template, |name| lookup(name).map(|v| v.to_string())))
        }
        Expr::Var(name) => match lookup(name) {
            Some(Value::Text(s)) => Scalar::Str(s),
            Some(Value::Failed) => Scalar::Bool(false),
            Some(Value::Skipped) => Scalar::Null,
            None => Scalar::Str(format!("{{{name}}}")),
        },
    })
}

fn truthy(value: &Scalar) -> bool {
    match value {
        Scalar::Bool(b) => *b,
        Scalar::Null => false,
        Scalar::Num(n) => *n != 0.0,
        Scalar::Str(s) => {
            let s = s.trim();
            !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
        }
        Scalar::List(items) => !items.is_empty(),
    }
}

fn as_number(value: &Scalar) -> Option<f64> {
    match value {
        Scalar::Num(n) => Some(*n),
        Scalar::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_bool(value: &Scalar) -> Option<bool> {
    match value {
        Scalar::Bool(b) => Some(*b),
        Scalar::Str(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        Scalar::Num(n) => Some(*n != 0.0),
        _ => None,
    }
}

fn loosely_equal(lhs: &Scalar, rhs: &Scalar) -> bool {
    match (lhs, rhs) {
        (Scalar::Null, Scalar::Null) => true,
        (Scalar::Null, _) | (_, Scalar::Null) => false,
        (Scalar::Bool(_), _) | (_, Scalar::Bool(_)) => match (as_bool(lhs), as_bool(rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Scalar::List(a), Scalar::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loosely_equal(x, y))
        }
        (Scalar::List(_), _) | (_, Scalar::List(_)) => false,
        (Scalar::Str(a), Scalar::Str(b)) => match (as_number(lhs), as_number(rhs)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => match (as_number(lhs), as_number(rhs)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn ordering(lhs: &Scalar, rhs: &Scalar) -> Result<Ordering> {
    if let (Some(x), Some(y)) = (as_number(lhs), as_number(rhs)) {
        return x.partial_cmp(&y).ok_or_else(|| {
            ProbeDagError::Condition("cannot order NaN".to_string())
        });
    }
    match (lhs, rhs) {
        (Scalar::Str(a), Scalar::Str(b)) => Ok(a.cmp(b)),
        _ => Err(ProbeDagError::Condition(format!(
            "cannot order {lhs:?} against {rhs:?}"
        ))),
    }
}

fn display(value: &Scalar) -> String {
    match value {
        Scalar::Str(s) => s.clone(),
        Scalar::Num(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Null => String::new(),
        Scalar::List(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
    }
}

fn contains(needle: &Scalar, haystack: &Scalar) -> Result<bool> {
    match haystack {
        Scalar::List(items) => Ok(items.iter().any(|item| loosely_equal(needle, item))),
        Scalar::Str(s) => Ok(s.contains(display(needle).as_str())),
        other => Err(ProbeDagError::Condition(format!(
            "right side of `in` must be a list or string, got {other:?}"
        ))),
    }
}

fn compare(lhs: &Scalar, op: CmpOp, rhs: &Scalar) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => loosely_equal(lhs, rhs),
        CmpOp::Ne => !loosely_equal(lhs, rhs),
        CmpOp::Lt => ordering(lhs, rhs)? == Ordering::Less,
        CmpOp::Le => ordering(lhs, rhs)? != Ordering::Greater,
        CmpOp::Gt => ordering(lhs, rhs)? == Ordering::Greater,
        CmpOp::Ge => ordering(lhs, rhs)? != Ordering::Less,
        CmpOp::In => contains(lhs, rhs)?,
        CmpOp::NotIn => !contains(lhs, rhs)?,
    })
}
