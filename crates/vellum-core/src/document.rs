//! Documents.
//!
//! A [`Document`] is the root object of a stored record: an
//! insertion-ordered collection of named values. Field order is
//! preserved so that documents round-trip through encoding and JSON
//! without reshuffling.

use std::fmt;

use vellum_common::{Error, Result};

use crate::path::{Path, Segment};
use crate::value::{self, Value};

/// An insertion-ordered collection of named values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, v)| v)
    }

    /// Returns the value at a path, or `None` when any segment misses.
    pub fn get_by_path(&self, path: &Path) -> Option<&Value> {
        path.get_in_document(self)
    }

    /// Sets a top-level field, replacing it if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        let name = name.into();
        match self.fields.iter().position(|(f, _)| *f == name) {
            Some(i) => self.fields[i].1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Sets the value at a path.
    ///
    /// The last segment is created if missing; intermediate segments
    /// must already resolve to a container, otherwise
    /// [`Error::FieldNotFound`] is returned.
    pub fn set_by_path(&mut self, path: &Path, value: Value) -> Result<()> {
        let segments = path.segments();
        match segments {
            [] => Err(Error::FieldNotFound(String::new())),
            [Segment::Field(name)] => {
                self.set(name.clone(), value);
                Ok(())
            }
            [Segment::Index(i)] => Err(Error::ValueNotFound(*i)),
            [first, rest @ ..] => {
                let Segment::Field(name) = first else {
                    return Err(Error::FieldNotFound(path.to_string()));
                };
                let slot = self
                    .fields
                    .iter_mut()
                    .find(|(f, _)| f == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| Error::FieldNotFound(path.to_string()))?;
                set_in_value(slot, rest, value, path)
            }
        }
    }

    /// Removes the value at a path. Missing paths are a no-op.
    pub fn unset_by_path(&mut self, path: &Path) {
        match path.segments() {
            [Segment::Field(name)] => {
                self.fields.retain(|(f, _)| f != name);
            }
            [first, rest @ ..] => {
                let Segment::Field(name) = first else {
                    return;
                };
                if let Some((_, v)) = self.fields.iter_mut().find(|(f, _)| f == name) {
                    unset_in_value(v, rest);
                }
            }
            [] => {}
        }
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().map(|(f, v)| (f, v))
    }

    /// Parses a document from JSON text.
    pub fn from_json(json: &str) -> Result<Document> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Parse(format!("invalid json: {}", e)))?;
        match value_from_json(parsed) {
            Value::Object(doc) => Ok(doc),
            _ => Err(Error::Parse("json root must be an object".into())),
        }
    }

    /// Serializes the document to JSON text.
    pub fn to_json(&self) -> String {
        json_from_value(&Value::Object(self.clone())).to_string()
    }
}

fn set_in_value(value: &mut Value, segments: &[Segment], new: Value, path: &Path) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        *value = new;
        return Ok(());
    };

    match (value, first) {
        (Value::Object(doc), Segment::Field(name)) => {
            if rest.is_empty() {
                doc.set(name.clone(), new);
                Ok(())
            } else {
                let slot = doc
                    .fields
                    .iter_mut()
                    .find(|(f, _)| f == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| Error::FieldNotFound(path.to_string()))?;
                set_in_value(slot, rest, new, path)
            }
        }
        (Value::Array(items), Segment::Index(i)) => {
            let slot = items
                .get_mut(*i)
                .ok_or_else(|| Error::ValueNotFound(*i))?;
            set_in_value(slot, rest, new, path)
        }
        _ => Err(Error::FieldNotFound(path.to_string())),
    }
}

fn unset_in_value(value: &mut Value, segments: &[Segment]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    match (value, first) {
        (Value::Object(doc), Segment::Field(name)) => {
            if rest.is_empty() {
                doc.fields.retain(|(f, _)| f != name);
            } else if let Some((_, v)) = doc.fields.iter_mut().find(|(f, _)| f == name) {
                unset_in_value(v, rest);
            }
        }
        (Value::Array(items), Segment::Index(i)) => {
            if rest.is_empty() {
                if *i < items.len() {
                    items.remove(*i);
                }
            } else if let Some(v) = items.get_mut(*i) {
                unset_in_value(v, rest);
            }
        }
        _ => {}
    }
}

/// Converts a `serde_json` value into a [`Value`].
pub fn value_from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(map) => {
            let mut doc = Document::new();
            for (k, v) in map {
                doc.set(k, value_from_json(v));
            }
            Value::Object(doc)
        }
    }
}

/// Converts a [`Value`] into a `serde_json` value.
pub fn json_from_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Double(d) => serde_json::Value::from(*d),
        Value::Timestamp(t) => serde_json::Value::String(value::format_timestamp(*t)),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(
            b.iter().map(|byte| format!("{:02x}", byte)).collect(),
        ),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(json_from_value).collect())
        }
        Value::Object(doc) => {
            let mut map = serde_json::Map::new();
            for (k, v) in doc.iter() {
                map.insert(k.clone(), json_from_value(v));
            }
            serde_json::Value::Object(map)
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            value::write_quoted(f, name)?;
            write!(f, ": {}", value)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.set(name, value);
        }
        doc
    }
}
