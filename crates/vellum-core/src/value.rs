//! Runtime values.
//!
//! This module defines the [`Value`] type, the tagged union of everything
//! a document field can hold, together with typed comparison and
//! arithmetic.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use vellum_common::{Error, Result};

use crate::document::Document;

/// The type of a [`Value`].
///
/// The discriminants double as the key-encoding type tags, so the enum
/// order is the sort order of heterogeneous values: null sorts smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// The null type.
    Null = 0x01,
    /// Booleans, false before true.
    Boolean = 0x02,
    /// 64-bit signed integers.
    Integer = 0x03,
    /// 64-bit IEEE-754 floats.
    Double = 0x04,
    /// Epoch nanoseconds.
    Timestamp = 0x05,
    /// UTF-8 text.
    Text = 0x06,
    /// Raw bytes.
    Blob = 0x07,
    /// Ordered sequence of values.
    Array = 0x08,
    /// Ordered mapping of field name to value.
    Object = 0x09,
}

impl ValueType {
    /// Returns the encoding type tag for this type.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Returns the type for an encoding tag, if valid.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(ValueType::Null),
            0x02 => Some(ValueType::Boolean),
            0x03 => Some(ValueType::Integer),
            0x04 => Some(ValueType::Double),
            0x05 => Some(ValueType::Timestamp),
            0x06 => Some(ValueType::Text),
            0x07 => Some(ValueType::Blob),
            0x08 => Some(ValueType::Array),
            0x09 => Some(ValueType::Object),
            _ => None,
        }
    }

    /// Returns true if this type is an integer or a double.
    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Double)
    }

    /// Returns true if values of this type can be compared with a
    /// timestamp.
    #[inline]
    pub fn is_timestamp_compatible(self) -> bool {
        matches!(self, ValueType::Timestamp | ValueType::Text)
    }

    /// Returns true if values of this type can be compared with values
    /// of `other` without a type error.
    pub fn is_comparable_with(self, other: ValueType) -> bool {
        if self == other {
            return true;
        }
        if self.is_number() && other.is_number() {
            return true;
        }
        if self.is_timestamp_compatible() && other.is_timestamp_compatible() {
            return true;
        }
        false
    }

    /// Parses a SQL type name.
    ///
    /// Accepts the usual aliases so that common dialect spellings work in
    /// DDL and CAST expressions.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "null" => Some(ValueType::Null),
            "bool" | "boolean" => Some(ValueType::Boolean),
            "int" | "integer" | "int8" | "int16" | "int32" | "int64" | "bigint" | "smallint"
            | "tinyint" => Some(ValueType::Integer),
            "double" | "float" | "real" | "float64" => Some(ValueType::Double),
            "timestamp" | "datetime" => Some(ValueType::Timestamp),
            "text" | "string" | "varchar" | "char" => Some(ValueType::Text),
            "blob" | "bytes" => Some(ValueType::Blob),
            "array" => Some(ValueType::Array),
            "object" | "document" => Some(ValueType::Object),
            _ => None,
        }
    }

    /// The canonical name used when formatting a CAST expression.
    pub fn sql_name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Boolean => "bool",
            ValueType::Integer => "int64",
            ValueType::Double => "double",
            ValueType::Timestamp => "timestamp",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Timestamp => "timestamp",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Array => "array",
            ValueType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// A value stored in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit float.
    Double(f64),
    /// Epoch nanoseconds.
    Timestamp(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A nested object.
    Object(Document),
}

impl Value {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Returns the type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Returns true if this value is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean coercion of this value.
    ///
    /// Numbers are true iff nonzero, text and blobs iff nonempty, arrays
    /// and objects iff nonempty, null is false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Timestamp(t) => *t != 0,
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Returns true if this value is the zero value of its type.
    ///
    /// Used by the table engine to reject empty primary keys.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Blob(b) => b.is_empty(),
            _ => false,
        }
    }

    /// Returns this value as an `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns this value as an `i64` if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns this value as a string slice if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Compares two values.
    ///
    /// Values are comparable iff they have the same type, are both
    /// numeric, or are both timestamp-compatible. Anything else is a
    /// [`Error::TypeMismatch`], never a silent ordering.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        use Value::*;

        match (self, other) {
            (Null, Null) => Ok(Ordering::Equal),
            (Bool(a), Bool(b)) => Ok(a.cmp(b)),
            (Integer(a), Integer(b)) => Ok(a.cmp(b)),
            (Double(a), Double(b)) => Ok(a.total_cmp(b)),
            (Integer(a), Double(b)) => Ok((*a as f64).total_cmp(b)),
            (Double(a), Integer(b)) => Ok(a.total_cmp(&(*b as f64))),
            (Timestamp(a), Timestamp(b)) => Ok(a.cmp(b)),
            (Timestamp(a), Text(b)) => Ok(a.cmp(&parse_timestamp(b)?)),
            (Text(a), Timestamp(b)) => Ok(parse_timestamp(a)?.cmp(b)),
            (Text(a), Text(b)) => Ok(a.cmp(b)),
            (Blob(a), Blob(b)) => Ok(a.cmp(b)),
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Ok(ord),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (Object(a), Object(b)) => {
                for ((fa, va), (fb, vb)) in a.iter().zip(b.iter()) {
                    match fa.cmp(fb) {
                        Ordering::Equal => {}
                        ord => return Ok(ord),
                    }
                    match va.compare(vb)? {
                        Ordering::Equal => {}
                        ord => return Ok(ord),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (a, b) => Err(Error::TypeMismatch(format!(
                "cannot compare {} with {}",
                a.value_type(),
                b.value_type()
            ))),
        }
    }

    /// Adds two numeric values, widening to double when either operand
    /// is a double.
    pub fn add(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, "+", |a, b| a.checked_add(b), |a, b| a + b)
    }

    /// Subtracts `other` from this value.
    pub fn sub(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, "-", |a, b| a.checked_sub(b), |a, b| a - b)
    }

    /// Multiplies two numeric values.
    pub fn mul(&self, other: &Value) -> Result<Value> {
        numeric_op(self, other, "*", |a, b| a.checked_mul(b), |a, b| a * b)
    }

    /// Divides this value by `other`.
    ///
    /// Integer division truncates; division by zero is an error.
    pub fn div(&self, other: &Value) -> Result<Value> {
        check_divisor(other)?;
        numeric_op(self, other, "/", |a, b| a.checked_div(b), |a, b| a / b)
    }

    /// Computes this value modulo `other`.
    pub fn rem(&self, other: &Value) -> Result<Value> {
        check_divisor(other)?;
        numeric_op(self, other, "%", |a, b| a.checked_rem(b), |a, b| a % b)
    }

    /// Bitwise AND of two integers.
    pub fn bitwise_and(&self, other: &Value) -> Result<Value> {
        integer_op(self, other, "&", |a, b| a & b)
    }

    /// Bitwise OR of two integers.
    pub fn bitwise_or(&self, other: &Value) -> Result<Value> {
        integer_op(self, other, "|", |a, b| a | b)
    }

    /// Bitwise XOR of two integers.
    pub fn bitwise_xor(&self, other: &Value) -> Result<Value> {
        integer_op(self, other, "^", |a, b| a ^ b)
    }

    /// Negates a numeric value.
    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| Error::TypeMismatch("integer overflow".into())),
            Value::Double(d) => Ok(Value::Double(-d)),
            v => Err(Error::TypeMismatch(format!(
                "cannot negate {}",
                v.value_type()
            ))),
        }
    }

    /// Converts this value to the given type.
    ///
    /// Lossless numeric conversions, text parsing and timestamp
    /// conversions are supported; anything else is a type mismatch.
    pub fn cast_to(&self, target: ValueType) -> Result<Value> {
        if self.value_type() == target {
            return Ok(self.clone());
        }

        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Bool(b), ValueType::Integer) => Ok(Value::Integer(i64::from(*b))),
            (Value::Integer(i), ValueType::Boolean) => Ok(Value::Bool(*i != 0)),
            (Value::Integer(i), ValueType::Double) => Ok(Value::Double(*i as f64)),
            (Value::Integer(i), ValueType::Timestamp) => Ok(Value::Timestamp(*i)),
            (Value::Integer(i), ValueType::Text) => Ok(Value::Text(i.to_string())),
            (Value::Double(d), ValueType::Integer) => {
                if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                    Ok(Value::Integer(*d as i64))
                } else {
                    Err(Error::TypeMismatch(format!(
                        "cannot cast {} to integer without loss",
                        d
                    )))
                }
            }
            (Value::Double(d), ValueType::Text) => Ok(Value::Text(format_double(*d))),
            (Value::Timestamp(t), ValueType::Integer) => Ok(Value::Integer(*t)),
            (Value::Timestamp(t), ValueType::Text) => Ok(Value::Text(format_timestamp(*t))),
            (Value::Text(s), ValueType::Integer) => s
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| Error::TypeMismatch(format!("cannot cast {:?} to integer", s))),
            (Value::Text(s), ValueType::Double) => s
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| Error::TypeMismatch(format!("cannot cast {:?} to double", s))),
            (Value::Text(s), ValueType::Timestamp) => parse_timestamp(s).map(Value::Timestamp),
            (Value::Text(s), ValueType::Blob) => Ok(Value::Blob(s.clone().into_bytes())),
            (Value::Blob(b), ValueType::Text) => String::from_utf8(b.clone())
                .map(Value::Text)
                .map_err(|_| Error::TypeMismatch("blob is not valid utf-8".into())),
            (v, t) => Err(Error::TypeMismatch(format!(
                "cannot cast {} to {}",
                v.value_type(),
                t
            ))),
        }
    }

    /// Normalizes integers to doubles.
    ///
    /// Index entries store every number as a double so that integers and
    /// doubles interleave correctly in ordered scans.
    pub fn normalize_number(self) -> Value {
        match self {
            Value::Integer(i) => Value::Double(i as f64),
            v => v,
        }
    }
}

fn check_divisor(v: &Value) -> Result<()> {
    match v {
        Value::Integer(0) => Err(Error::DivisionByZero),
        Value::Double(d) if *d == 0.0 => Err(Error::DivisionByZero),
        _ => Ok(()),
    }
}

fn numeric_op(
    a: &Value,
    b: &Value,
    op: &str,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => int_op(*x, *y)
            .map(Value::Integer)
            .ok_or_else(|| Error::TypeMismatch("integer overflow".into())),
        _ => {
            let (x, y) = both_f64(a, b, op)?;
            Ok(Value::Double(float_op(x, y)))
        }
    }
}

fn integer_op(a: &Value, b: &Value, op: &str, f: impl Fn(i64, i64) -> i64) -> Result<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(f(*x, *y))),
        _ => Err(Error::TypeMismatch(format!(
            "operator {} requires integers, got {} and {}",
            op,
            a.value_type(),
            b.value_type()
        ))),
    }
}

fn both_f64(a: &Value, b: &Value, op: &str) -> Result<(f64, f64)> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(Error::TypeMismatch(format!(
            "operator {} requires numbers, got {} and {}",
            op,
            a.value_type(),
            b.value_type()
        ))),
    }
}

/// Parses an RFC 3339 timestamp into epoch nanoseconds.
pub fn parse_timestamp(s: &str) -> Result<i64> {
    let dt = DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::TypeMismatch(format!("invalid timestamp {:?}: {}", s, e)))?;
    dt.timestamp_nanos_opt()
        .ok_or_else(|| Error::TypeMismatch(format!("timestamp {:?} out of range", s)))
}

/// Formats epoch nanoseconds as an RFC 3339 timestamp.
pub fn format_timestamp(nanos: i64) -> String {
    DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Formats a double so that it always reparses as a double.
///
/// Integral doubles keep one fractional digit, so `10f64` renders as
/// `10.0` rather than `10`.
pub fn format_double(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{:.1}", d)
    } else {
        format!("{}", d)
    }
}

/// Writes a text value with surrounding double quotes and escapes.
pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", format_double(*d)),
            Value::Timestamp(t) => write_quoted(f, &format_timestamp(*t)),
            Value::Text(s) => write_quoted(f, s),
            Value::Blob(b) => {
                write!(f, "x'")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "'")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(doc) => write!(f, "{}", doc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_same_type() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Integer(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::text("a").compare(&Value::text("a")).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            Value::Bool(true).compare(&Value::Bool(false)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_numeric_widening() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Double(1.0)).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            Value::Double(1.5).compare(&Value::Integer(2)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_incompatible_is_error() {
        let res = Value::Integer(1).compare(&Value::text("1"));
        assert!(matches!(res, Err(Error::TypeMismatch(_))));

        let res = Value::Bool(true).compare(&Value::Integer(1));
        assert!(matches!(res, Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_compare_timestamp_with_text() {
        let ts = Value::Timestamp(0);
        let txt = Value::text("1970-01-01T00:00:00Z");
        assert_eq!(ts.compare(&txt).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_compare_arrays() {
        let a = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::Array(vec![Value::Integer(1), Value::Integer(3)]);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);

        let shorter = Value::Array(vec![Value::Integer(1)]);
        assert_eq!(shorter.compare(&a).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_arithmetic_widening() {
        assert_eq!(
            Value::Integer(1).add(&Value::Integer(2)).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            Value::Integer(1).add(&Value::Double(2.5)).unwrap(),
            Value::Double(3.5)
        );
    }

    #[test]
    fn test_integer_division_truncates() {
        assert_eq!(
            Value::Integer(7).div(&Value::Integer(2)).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            Value::Integer(7).div(&Value::Double(2.0)).unwrap(),
            Value::Double(3.5)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            Value::Integer(1).div(&Value::Integer(0)),
            Err(Error::DivisionByZero)
        ));
        assert!(matches!(
            Value::Integer(1).rem(&Value::Double(0.0)),
            Err(Error::DivisionByZero)
        ));
    }

    #[test]
    fn test_bitwise_requires_integers() {
        assert_eq!(
            Value::Integer(6).bitwise_and(&Value::Integer(3)).unwrap(),
            Value::Integer(2)
        );
        assert!(Value::Double(6.0).bitwise_and(&Value::Integer(3)).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(!Value::text("").is_truthy());
        assert!(Value::text("x").is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_cast() {
        assert_eq!(
            Value::Integer(10).cast_to(ValueType::Double).unwrap(),
            Value::Double(10.0)
        );
        assert_eq!(
            Value::text("42").cast_to(ValueType::Integer).unwrap(),
            Value::Integer(42)
        );
        assert!(Value::Double(1.5).cast_to(ValueType::Integer).is_err());
        assert!(Value::text("abc").cast_to(ValueType::Integer).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Integer(500).to_string(), "500");
        assert_eq!(Value::Double(10.4).to_string(), "10.4");
        assert_eq!(Value::Double(10.0).to_string(), "10.0");
        assert_eq!(Value::text("hello").to_string(), "\"hello\"");
        assert_eq!(
            Value::Array(vec![Value::Integer(1), Value::text("foo")]).to_string(),
            "[1, \"foo\"]"
        );
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(
            Value::Integer(3).normalize_number(),
            Value::Double(3.0)
        );
        assert_eq!(Value::text("a").normalize_number(), Value::text("a"));
    }

    #[test]
    fn test_type_sql_names() {
        assert_eq!(ValueType::from_sql_name("INT"), Some(ValueType::Integer));
        assert_eq!(ValueType::from_sql_name("int64"), Some(ValueType::Integer));
        assert_eq!(ValueType::from_sql_name("TEXT"), Some(ValueType::Text));
        assert_eq!(ValueType::from_sql_name("nope"), None);
        assert_eq!(ValueType::Integer.sql_name(), "int64");
    }
}
