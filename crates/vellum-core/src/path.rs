//! Field paths.
//!
//! A [`Path`] locates a sub-value inside a document: an ordered list of
//! segments, each either a field name or an array index. The textual
//! form joins segments with `.`; backtick-quoted segments may contain
//! dots and spaces.

use std::fmt;

use vellum_common::{Error, Result};

use crate::document::Document;
use crate::value::Value;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A field of an object.
    Field(String),
    /// An index into an array.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => {
                if needs_quoting(name) {
                    write!(f, "`{}`", name)
                } else {
                    write!(f, "{}", name)
                }
            }
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.is_empty()
        || name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// An ordered sequence of segments locating a sub-value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(pub Vec<Segment>);

impl Path {
    /// Creates a path with a single field segment.
    pub fn field(name: impl Into<String>) -> Self {
        Path(vec![Segment::Field(name.into())])
    }

    /// Returns the segments of the path.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Returns true if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses a dotted path.
    ///
    /// Unquoted segments may contain letters, digits and underscores;
    /// all-digit segments are array indexes. Backtick-quoted segments
    /// may contain anything but a backtick.
    pub fn parse(s: &str) -> Result<Path> {
        let mut segments = Vec::new();
        let mut chars = s.chars().peekable();
        let mut expect_segment = true;

        while let Some(&c) = chars.peek() {
            if c == '.' {
                if expect_segment {
                    return Err(Error::Parse(format!("invalid path {:?}", s)));
                }
                chars.next();
                expect_segment = true;
            } else if c == '`' {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => name.push(c),
                        None => return Err(Error::Parse(format!("unterminated quote in {:?}", s))),
                    }
                }
                segments.push(Segment::Field(name));
                expect_segment = false;
            } else {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                if word.is_empty() {
                    return Err(Error::Parse(format!("invalid path {:?}", s)));
                }
                if word.bytes().all(|b| b.is_ascii_digit()) {
                    let idx = word
                        .parse::<usize>()
                        .map_err(|_| Error::Parse(format!("invalid array index in {:?}", s)))?;
                    segments.push(Segment::Index(idx));
                } else {
                    segments.push(Segment::Field(word));
                }
                expect_segment = false;
            }
        }

        if expect_segment {
            return Err(Error::Parse(format!("invalid path {:?}", s)));
        }
        Ok(Path(segments))
    }

    /// Resolves the path inside a document.
    ///
    /// Returns `None` when any segment misses.
    pub fn get_in_document<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = match first {
            Segment::Field(name) => doc.get(name)?,
            Segment::Index(_) => return None,
        };
        for segment in rest {
            current = get_in_value(current, segment)?;
        }
        Some(current)
    }
}

fn get_in_value<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(doc), Segment::Field(name)) => doc.get(name),
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        _ => None,
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}
