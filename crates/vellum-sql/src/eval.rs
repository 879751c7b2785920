//! Expression evaluation.
//!
//! Expressions evaluate against an [`Environment`] under three-valued
//! logic: null propagates through comparisons and arithmetic, and
//! boolean contexts treat null as false. Comparisons between values of
//! incompatible types evaluate to false rather than erroring; the codec
//! keeps its strict typed comparison, and the index matcher stays
//! conservative on its own.

use std::cmp::Ordering;

use vellum_common::{Error, Result};
use vellum_core::encoding::decode_value;
use vellum_core::{Document, Value};

use crate::ast::{BinaryOp, Expr, UnaryOp};

/// Evaluation context of one expression.
#[derive(Default, Clone, Copy)]
pub struct Environment<'a> {
    /// The current document, if any.
    pub document: Option<&'a Document>,
    /// The encoded primary key of the current document, for `pk()`.
    pub key: Option<&'a [u8]>,
    /// Positional parameter values.
    pub params: &'a [Value],
}

impl<'a> Environment<'a> {
    /// An environment with only parameters bound.
    pub fn with_params(params: &'a [Value]) -> Self {
        Environment {
            document: None,
            key: None,
            params,
        }
    }
}

/// Evaluates an expression to a value.
pub fn evaluate(expr: &Expr, env: &Environment<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Path(path) => Ok(env
            .document
            .and_then(|doc| path.get_in_document(doc))
            .cloned()
            .unwrap_or(Value::Null)),

        Expr::Param(i) => env
            .params
            .get(*i)
            .cloned()
            .ok_or_else(|| Error::Parse(format!("no value bound for parameter {}", i + 1))),

        Expr::Pk => match env.key {
            Some(key) => decode_value(key),
            None => Ok(Value::Null),
        },

        Expr::Cast { expr, target } => {
            let value = evaluate(expr, env)?;
            value.cast_to(*target)
        }

        Expr::Unary { op, expr } => {
            let value = evaluate(expr, env)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => value.neg(),
            }
        }

        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, env),

        Expr::IsNull { expr, negated } => {
            let value = evaluate(expr, env)?;
            Ok(Value::Bool(value.is_null() != *negated))
        }

        Expr::Between { expr, low, high } => {
            let value = evaluate(expr, env)?;
            let low = evaluate(low, env)?;
            let high = evaluate(high, env)?;
            if value.is_null() || low.is_null() || high.is_null() {
                return Ok(Value::Null);
            }
            let in_range = loose_compare(&value, &low).is_some_and(|o| o != Ordering::Less)
                && loose_compare(&value, &high).is_some_and(|o| o != Ordering::Greater);
            Ok(Value::Bool(in_range))
        }

        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let value = evaluate(expr, env)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let candidate = evaluate(item, env)?;
                if candidate.is_null() {
                    saw_null = true;
                    continue;
                }
                if loose_compare(&value, &candidate) == Some(Ordering::Equal) {
                    return Ok(Value::Bool(!negated));
                }
            }
            if saw_null {
                return Ok(Value::Null);
            }
            Ok(Value::Bool(*negated))
        }

        Expr::Array(items) => {
            let values: Result<Vec<Value>> =
                items.iter().map(|item| evaluate(item, env)).collect();
            Ok(Value::Array(values?))
        }

        Expr::Object(pairs) => {
            let mut doc = Document::new();
            for (name, item) in pairs {
                doc.set(name.clone(), evaluate(item, env)?);
            }
            Ok(Value::Object(doc))
        }
    }
}

/// Evaluates an expression and coerces the result to a boolean; null is
/// false.
pub fn evaluate_truthy(expr: &Expr, env: &Environment<'_>) -> Result<bool> {
    Ok(evaluate(expr, env)?.is_truthy())
}

fn evaluate_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &Environment<'_>) -> Result<Value> {
    // Logical operators short-circuit under three-valued logic.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = bool3(&evaluate(left, env)?);
        match (op, lhs) {
            (BinaryOp::And, Some(false)) => return Ok(Value::Bool(false)),
            (BinaryOp::Or, Some(true)) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let rhs = bool3(&evaluate(right, env)?);
        return Ok(match op {
            BinaryOp::And => match (lhs, rhs) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            },
            BinaryOp::Or => match (lhs, rhs) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            },
            _ => unreachable!(),
        });
    }

    let lhs = evaluate(left, env)?;
    let rhs = evaluate(right, env)?;
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }

    if op.is_comparison() {
        let result = match loose_compare(&lhs, &rhs) {
            Some(ordering) => match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::NotEq => ordering != Ordering::Equal,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::GtEq => ordering != Ordering::Less,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::LtEq => ordering != Ordering::Greater,
                _ => unreachable!(),
            },
            // Incomparable types: only != holds.
            None => op == BinaryOp::NotEq,
        };
        return Ok(Value::Bool(result));
    }

    match op {
        BinaryOp::Add => lhs.add(&rhs),
        BinaryOp::Sub => lhs.sub(&rhs),
        BinaryOp::Mul => lhs.mul(&rhs),
        BinaryOp::Div => lhs.div(&rhs),
        BinaryOp::Mod => lhs.rem(&rhs),
        BinaryOp::BitAnd => lhs.bitwise_and(&rhs),
        BinaryOp::BitOr => lhs.bitwise_or(&rhs),
        BinaryOp::BitXor => lhs.bitwise_xor(&rhs),
        _ => unreachable!(),
    }
}

fn bool3(value: &Value) -> Option<bool> {
    if value.is_null() {
        None
    } else {
        Some(value.is_truthy())
    }
}

/// Compares two values, returning `None` when their types are
/// incomparable instead of erroring.
pub(crate) fn loose_compare(a: &Value, b: &Value) -> Option<Ordering> {
    a.compare(b).ok()
}
