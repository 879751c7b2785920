//! Index matcher.
//!
//! Inspects a WHERE expression for predicate shapes an index can serve:
//! `path OP constant`, `constant OP path`, `path BETWEEN a AND b` and
//! `path IN (constants)`, conjoined by AND. When a usable index exists
//! on the path with a compatible type, the matcher returns it together
//! with the value range to scan. The matcher is conservative: anything
//! ambiguous or mixed-type falls back to a full scan rather than risking
//! missed rows.

use std::cmp::Ordering;

use vellum_core::{Path, Value};
use vellum_db::IndexConfig;

use crate::ast::{BinaryOp, Expr};
use crate::eval::loose_compare;

/// A value range over one indexed path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRange {
    /// Lower bound and whether it is inclusive.
    pub lower: Option<(Value, bool)>,
    /// Upper bound and whether it is inclusive.
    pub upper: Option<(Value, bool)>,
    /// Exact candidates; when set, the bounds are unused.
    pub eq_set: Option<Vec<Value>>,
}

/// A chosen index and the range to scan.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    /// The index serving the predicate.
    pub index: IndexConfig,
    /// The value range to scan.
    pub range: ValueRange,
}

/// One indexable predicate extracted from the filter.
enum Predicate {
    Compare(BinaryOp, Value),
    Between(Value, Value),
    In(Vec<Value>),
}

/// Finds an index able to accelerate `filter`, if any.
pub fn match_index(
    indexes: &[IndexConfig],
    filter: &Expr,
    params: &[Value],
) -> Option<IndexMatch> {
    if indexes.is_empty() {
        return None;
    }

    let mut conjuncts = Vec::new();
    collect_conjuncts(filter, &mut conjuncts);

    // Paths appear in predicate order; the first path with a usable
    // index and a coherent range wins.
    let mut candidate_paths: Vec<&Path> = Vec::new();
    for conjunct in &conjuncts {
        if let Some((path, _)) = extract_predicate(conjunct, params) {
            if !candidate_paths.contains(&path) {
                candidate_paths.push(path);
            }
        }
    }

    for path in candidate_paths {
        let Some(index) = indexes.iter().find(|cfg| &cfg.path == path) else {
            continue;
        };

        let mut range = ValueRange::default();
        let mut usable = true;
        for conjunct in &conjuncts {
            match extract_predicate(conjunct, params) {
                Some((p, predicate)) if p == path => {
                    if !merge(&mut range, predicate) {
                        usable = false;
                        break;
                    }
                }
                _ => {}
            }
        }

        if !usable || !range_coherent(&range) {
            continue;
        }
        if let Some(ty) = index.ty {
            // A typed index only stores convertible values; anything
            // else cannot be in the index at all, so stay conservative
            // and scan.
            let bounds_convertible = range
                .eq_set
                .iter()
                .flatten()
                .chain(range.lower.iter().map(|(v, _)| v))
                .chain(range.upper.iter().map(|(v, _)| v))
                .all(|v| v.cast_to(ty).is_ok());
            if !bounds_convertible {
                continue;
            }
        }
        if range.eq_set.is_none() && range.lower.is_none() && range.upper.is_none() {
            continue;
        }

        return Some(IndexMatch {
            index: index.clone(),
            range,
        });
    }

    None
}

fn collect_conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

/// Resolves a constant operand: a literal or a bound parameter.
fn constant(expr: &Expr, params: &[Value]) -> Option<Value> {
    match expr {
        Expr::Literal(v) if !v.is_null() => Some(v.clone()),
        Expr::Param(i) => params.get(*i).filter(|v| !v.is_null()).cloned(),
        _ => None,
    }
}

fn extract_predicate<'e>(expr: &'e Expr, params: &[Value]) -> Option<(&'e Path, Predicate)> {
    match expr {
        Expr::Binary { op, left, right } if op.is_comparison() && *op != BinaryOp::NotEq => {
            if let (Expr::Path(path), Some(value)) = (left.as_ref(), constant(right, params)) {
                return Some((path, Predicate::Compare(*op, value)));
            }
            if let (Some(value), Expr::Path(path)) = (constant(left, params), right.as_ref()) {
                return Some((path, Predicate::Compare(op.flip(), value)));
            }
            None
        }
        Expr::Between { expr, low, high } => {
            let Expr::Path(path) = expr.as_ref() else {
                return None;
            };
            let low = constant(low, params)?;
            let high = constant(high, params)?;
            Some((path, Predicate::Between(low, high)))
        }
        Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            let Expr::Path(path) = expr.as_ref() else {
                return None;
            };
            let values: Option<Vec<Value>> =
                list.iter().map(|item| constant(item, params)).collect();
            Some((path, Predicate::In(values?)))
        }
        _ => None,
    }
}

/// Tightens `range` with one more predicate on the same path. Returns
/// false when the combination is ambiguous or mixed-type.
fn merge(range: &mut ValueRange, predicate: Predicate) -> bool {
    match predicate {
        Predicate::Compare(BinaryOp::Eq, value) => merge_eq_set(range, vec![value]),
        Predicate::In(values) => {
            if values.is_empty() {
                return false;
            }
            merge_eq_set(range, values)
        }
        Predicate::Compare(op, value) => {
            if range.eq_set.is_some() {
                // Equality already pins the values; a coherent extra
                // bound adds nothing, an incoherent one is ambiguous.
                return false;
            }
            match op {
                BinaryOp::Gt => tighten_lower(range, value, false),
                BinaryOp::GtEq => tighten_lower(range, value, true),
                BinaryOp::Lt => tighten_upper(range, value, false),
                BinaryOp::LtEq => tighten_upper(range, value, true),
                _ => false,
            }
        }
        Predicate::Between(low, high) => {
            if range.eq_set.is_some() {
                return false;
            }
            tighten_lower(range, low, true) && tighten_upper(range, high, true)
        }
    }
}

/// Returns true when every value of the range is comparable with every
/// other, so the scan covers a single type family.
fn range_coherent(range: &ValueRange) -> bool {
    let values: Vec<&Value> = range
        .eq_set
        .iter()
        .flatten()
        .chain(range.lower.iter().map(|(v, _)| v))
        .chain(range.upper.iter().map(|(v, _)| v))
        .collect();
    let Some(first) = values.first() else {
        return true;
    };
    values
        .iter()
        .all(|v| loose_compare(first, v).is_some())
}

fn merge_eq_set(range: &mut ValueRange, values: Vec<Value>) -> bool {
    if range.lower.is_some() || range.upper.is_some() {
        return false;
    }
    match &mut range.eq_set {
        None => {
            range.eq_set = Some(values);
            true
        }
        Some(existing) => {
            // Intersect the candidate sets.
            let mut kept = Vec::new();
            for value in existing.iter() {
                let matches = values
                    .iter()
                    .any(|v| loose_compare(value, v) == Some(Ordering::Equal));
                if matches {
                    kept.push(value.clone());
                }
            }
            if kept.is_empty() {
                return false;
            }
            *existing = kept;
            true
        }
    }
}

fn tighten_lower(range: &mut ValueRange, value: Value, inclusive: bool) -> bool {
    match &range.lower {
        None => {
            range.lower = Some((value, inclusive));
            true
        }
        Some((current, current_inclusive)) => match loose_compare(&value, current) {
            Some(Ordering::Greater) => {
                range.lower = Some((value, inclusive));
                true
            }
            Some(Ordering::Equal) => {
                range.lower = Some((value, inclusive && *current_inclusive));
                true
            }
            Some(Ordering::Less) => true,
            None => false,
        },
    }
}

fn tighten_upper(range: &mut ValueRange, value: Value, inclusive: bool) -> bool {
    match &range.upper {
        None => {
            range.upper = Some((value, inclusive));
            true
        }
        Some((current, current_inclusive)) => match loose_compare(&value, current) {
            Some(Ordering::Less) => {
                range.upper = Some((value, inclusive));
                true
            }
            Some(Ordering::Equal) => {
                range.upper = Some((value, inclusive && *current_inclusive));
                true
            }
            Some(Ordering::Greater) => true,
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use vellum_core::ValueType;

    fn indexes() -> Vec<IndexConfig> {
        vec![
            IndexConfig::new("idx_a", "t", Path::parse("a").unwrap()),
            IndexConfig {
                ty: Some(ValueType::Integer),
                ..IndexConfig::new("idx_n", "t", Path::parse("n").unwrap())
            },
        ]
    }

    fn match_str(filter: &str) -> Option<IndexMatch> {
        let expr = Parser::parse_expression(filter).unwrap();
        match_index(&indexes(), &expr, &[])
    }

    #[test]
    fn test_simple_comparisons_match() {
        let m = match_str("a = 5").unwrap();
        assert_eq!(m.index.name, "idx_a");
        assert_eq!(m.range.eq_set, Some(vec![Value::Integer(5)]));

        let m = match_str("a > 5").unwrap();
        assert_eq!(m.range.lower, Some((Value::Integer(5), false)));
        assert!(m.range.upper.is_none());

        // Reversed operands flip the operator.
        let m = match_str("5 > a").unwrap();
        assert_eq!(m.range.upper, Some((Value::Integer(5), false)));
    }

    #[test]
    fn test_between_and_in_match() {
        let m = match_str("a BETWEEN 1 AND 5").unwrap();
        assert_eq!(m.range.lower, Some((Value::Integer(1), true)));
        assert_eq!(m.range.upper, Some((Value::Integer(5), true)));

        let m = match_str("a IN (3, 1, 2)").unwrap();
        assert_eq!(
            m.range.eq_set,
            Some(vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_and_conjunction_tightens() {
        let m = match_str("a > 1 AND a <= 10").unwrap();
        assert_eq!(m.range.lower, Some((Value::Integer(1), false)));
        assert_eq!(m.range.upper, Some((Value::Integer(10), true)));

        let m = match_str("a > 1 AND a > 5").unwrap();
        assert_eq!(m.range.lower, Some((Value::Integer(5), false)));
    }

    #[test]
    fn test_unindexed_path_does_not_match() {
        assert!(match_str("zzz = 1").is_none());
    }

    #[test]
    fn test_or_disables_acceleration() {
        assert!(match_str("a = 1 OR a = 2").is_none());
    }

    #[test]
    fn test_not_eq_does_not_match() {
        assert!(match_str("a != 1").is_none());
    }

    #[test]
    fn test_path_to_path_does_not_match() {
        assert!(match_str("a = b").is_none());
    }

    #[test]
    fn test_mixed_type_bounds_disable() {
        assert!(match_str("a > 1 AND a < 'x'").is_none());
    }

    #[test]
    fn test_typed_index_requires_convertible_values() {
        let m = match_str("n = 5").unwrap();
        assert_eq!(m.index.name, "idx_n");

        // Text cannot live in an integer index.
        assert!(match_str("n = 'x'").is_none());
    }

    #[test]
    fn test_params_resolve_as_constants() {
        let expr = Parser::parse_expression("a = ?").unwrap();
        let m = match_index(&indexes(), &expr, &[Value::Integer(9)]).unwrap();
        assert_eq!(m.range.eq_set, Some(vec![Value::Integer(9)]));

        // A null parameter stays unmatched.
        assert!(match_index(&indexes(), &expr, &[Value::Null]).is_none());
    }

    #[test]
    fn test_residual_conjuncts_keep_match() {
        // The b conjunct is not indexable but does not disable a's.
        let m = match_str("a = 1 AND b = 2").unwrap();
        assert_eq!(m.index.name, "idx_a");
    }
}
