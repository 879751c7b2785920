//! Index engine.
//!
//! An index is an ordered mapping from an indexed value to the primary
//! keys of the documents holding it, stored under the index's key-space
//! prefix:
//!
//! - non-unique: `prefix || encode(value) || encoded_pk`, empty payload,
//!   so duplicates of one value are adjacent and ordered by primary key
//! - unique: `prefix || encode(value)` with the encoded primary key as
//!   payload, so duplicates collide at insert time
//!
//! Numbers are normalized to doubles before encoding (unless the index
//! carries a type constraint), so integers and doubles interleave
//! correctly in ordered scans. Missing fields are stored as typed nulls,
//! which sort first.

use vellum_common::constants::PREFIX_LEN;
use vellum_common::{Error, Result};
use vellum_core::encoding::{decode_value_from, encode_value};
use vellum_core::{Value, ValueType};
use vellum_kv::{prefix_successor, IterOptions, Session};

use crate::catalog::IndexConfig;

/// Starting point of an ordered index scan.
///
/// With a value, iteration starts at that value. With only a type, it
/// starts at the first (or last, descending) entry of that type. With
/// neither, it covers the whole index. Whenever a type is known,
/// iteration stops at the type boundary.
#[derive(Debug, Clone, Default)]
pub struct Pivot {
    /// Type restriction of the scan.
    pub ty: Option<ValueType>,
    /// Value to seek to.
    pub value: Option<Value>,
}

impl Pivot {
    /// A pivot covering every entry of one type.
    pub fn for_type(ty: ValueType) -> Self {
        Pivot {
            ty: Some(ty),
            value: None,
        }
    }

    /// A pivot seeking to a value.
    pub fn at(value: Value) -> Self {
        Pivot {
            ty: None,
            value: Some(value),
        }
    }
}

/// Handle on one index, bound to a transaction's session.
pub struct Index<'a> {
    session: &'a dyn Session,
    cfg: IndexConfig,
}

impl<'a> Index<'a> {
    pub(crate) fn new(session: &'a dyn Session, cfg: IndexConfig) -> Self {
        Index { session, cfg }
    }

    /// Returns the index configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    /// Adds an entry for `value` held by the document at `pk`.
    ///
    /// A collision on a unique index is a [`Error::DuplicateDocument`].
    pub fn set(&self, value: &Value, pk: &[u8]) -> Result<()> {
        let stored = self.stored_value(value)?;

        if self.cfg.unique {
            let key = self.entry_key(&stored, None);
            match self.session.insert(&key, pk) {
                Err(Error::KeyAlreadyExists) => Err(Error::DuplicateDocument),
                other => other,
            }
        } else {
            let key = self.entry_key(&stored, Some(pk));
            self.session.put(&key, &[])
        }
    }

    /// Removes the entry for `value` held by the document at `pk`.
    pub fn delete(&self, value: &Value, pk: &[u8]) -> Result<()> {
        let stored = self.stored_value(value)?;
        let key = if self.cfg.unique {
            self.entry_key(&stored, None)
        } else {
            self.entry_key(&stored, Some(pk))
        };
        self.session.delete(&key)
    }

    /// Iterates entries in ascending `(type, value, primary key)` order,
    /// starting at the pivot.
    ///
    /// The callback may return [`Error::Stop`] to terminate cleanly.
    pub fn ascend_greater_or_equal(
        &self,
        pivot: Pivot,
        mut f: impl FnMut(&Value, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let (lower, upper) = self.pivot_bounds(&pivot, false)?;
        let mut it = self.session.iterator(IterOptions {
            lower_bound: Some(lower),
            upper_bound: upper,
        })?;

        let mut ok = it.first();
        while ok {
            let (value, pk) = self.decode_entry(it.key(), it.value())?;
            match f(&value, pk) {
                Ok(()) => {}
                Err(Error::Stop) => return Ok(()),
                Err(e) => return Err(e),
            }
            ok = it.next();
        }
        Ok(())
    }

    /// Iterates entries in descending order, starting at the pivot.
    ///
    /// The callback may return [`Error::Stop`] to terminate cleanly.
    pub fn descend_less_or_equal(
        &self,
        pivot: Pivot,
        mut f: impl FnMut(&Value, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let (lower, upper) = self.pivot_bounds(&pivot, true)?;
        let mut it = self.session.iterator(IterOptions {
            lower_bound: Some(lower),
            upper_bound: upper,
        })?;

        let mut ok = it.last();
        while ok {
            let (value, pk) = self.decode_entry(it.key(), it.value())?;
            match f(&value, pk) {
                Ok(()) => {}
                Err(Error::Stop) => return Ok(()),
                Err(e) => return Err(e),
            }
            ok = it.prev();
        }
        Ok(())
    }

    /// Deletes every entry of the index.
    pub fn truncate(&self) -> Result<()> {
        let prefix = self.cfg.prefix_bytes();
        match prefix_successor(&prefix) {
            Some(end) => self.session.delete_range(&prefix, &end),
            None => Ok(()),
        }
    }

    /// Converts a document value into its stored form, applying the
    /// index type constraint or the numeric normalization.
    fn stored_value(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self.cfg.ty {
            Some(ty) => value.cast_to(ty),
            None => Ok(value.clone().normalize_number()),
        }
    }

    fn entry_key(&self, value: &Value, pk: Option<&[u8]>) -> Vec<u8> {
        let mut key = self.cfg.prefix_bytes().to_vec();
        key.extend_from_slice(&encode_value(value));
        if let Some(pk) = pk {
            key.extend_from_slice(pk);
        }
        key
    }

    /// Computes the scan bounds for a pivot.
    ///
    /// Ascending scans use the pivot as the lower bound; descending
    /// scans as the (inclusive) upper bound. The opposite bound is the
    /// type boundary when the pivot carries a type, and the index
    /// boundary otherwise.
    fn pivot_bounds(&self, pivot: &Pivot, descending: bool) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let prefix = self.cfg.prefix_bytes();
        let pivot_value = match &pivot.value {
            Some(v) => Some(self.stored_value(v)?),
            None => None,
        };
        let ty = pivot_value
            .as_ref()
            .map(Value::value_type)
            .or(match self.cfg.ty {
                Some(_) => pivot.ty,
                None => pivot.ty.map(|t| {
                    if t == ValueType::Integer {
                        ValueType::Double
                    } else {
                        t
                    }
                }),
            });

        let type_start = |t: ValueType| {
            let mut key = prefix.to_vec();
            key.push(t.tag());
            key
        };
        let type_end = |t: ValueType| {
            let mut key = prefix.to_vec();
            key.push(t.tag() + 1);
            key
        };

        if descending {
            let upper = match &pivot_value {
                // Inclusive: cover every entry whose value part equals
                // the pivot, whatever primary key follows it.
                Some(v) => prefix_successor(&self.entry_key(v, None)),
                None => match ty {
                    Some(t) => Some(type_end(t)),
                    None => prefix_successor(&prefix),
                },
            };
            let lower = match ty {
                Some(t) => type_start(t),
                None => prefix.to_vec(),
            };
            Ok((lower, upper))
        } else {
            let lower = match &pivot_value {
                Some(v) => self.entry_key(v, None),
                None => match ty {
                    Some(t) => type_start(t),
                    None => prefix.to_vec(),
                },
            };
            let upper = match ty {
                Some(t) => Some(type_end(t)),
                None => prefix_successor(&prefix),
            };
            Ok((lower, upper))
        }
    }

    fn decode_entry<'k>(&self, key: &'k [u8], payload: &'k [u8]) -> Result<(Value, &'k [u8])> {
        let suffix = key
            .get(PREFIX_LEN..)
            .ok_or_else(|| Error::Corruption("index entry key is too short".into()))?;
        let (value, consumed) = decode_value_from(suffix)?;
        let pk = if self.cfg.unique {
            payload
        } else {
            &suffix[consumed..]
        };
        Ok((value, pk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Path;
    use vellum_kv::{Engine, MemoryEngine};

    fn test_index(unique: bool) -> (Box<dyn Session>, IndexConfig) {
        let engine = MemoryEngine::new();
        let session = engine.begin(true).unwrap();
        let cfg = IndexConfig {
            name: "idx".into(),
            table_name: "t".into(),
            path: Path::field("a"),
            unique,
            ty: None,
            owned: false,
            prefix: 42,
        };
        (session, cfg)
    }

    #[test]
    fn test_set_and_ascend() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);

        idx.set(&Value::Integer(3), b"k3").unwrap();
        idx.set(&Value::Integer(1), b"k1").unwrap();
        idx.set(&Value::Integer(2), b"k2").unwrap();

        let mut seen = Vec::new();
        idx.ascend_greater_or_equal(Pivot::default(), |v, pk| {
            seen.push((v.clone(), pk.to_vec()));
            Ok(())
        })
        .unwrap();

        // Numbers are normalized to doubles on the way in.
        assert_eq!(
            seen,
            vec![
                (Value::Double(1.0), b"k1".to_vec()),
                (Value::Double(2.0), b"k2".to_vec()),
                (Value::Double(3.0), b"k3".to_vec()),
            ]
        );
    }

    #[test]
    fn test_ascend_from_pivot_value() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);
        for i in 1..=5 {
            idx.set(&Value::Integer(i), format!("k{}", i).as_bytes())
                .unwrap();
        }

        let mut seen = Vec::new();
        idx.ascend_greater_or_equal(Pivot::at(Value::Integer(3)), |v, _| {
            seen.push(v.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![Value::Double(3.0), Value::Double(4.0), Value::Double(5.0)]
        );
    }

    #[test]
    fn test_descend_less_or_equal() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);
        for i in 1..=5 {
            idx.set(&Value::Integer(i), format!("k{}", i).as_bytes())
                .unwrap();
        }

        let mut seen = Vec::new();
        idx.descend_less_or_equal(Pivot::at(Value::Integer(3)), |v, _| {
            seen.push(v.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![Value::Double(3.0), Value::Double(2.0), Value::Double(1.0)]
        );
    }

    #[test]
    fn test_type_boundary_stops_iteration() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);
        idx.set(&Value::Integer(1), b"k1").unwrap();
        idx.set(&Value::text("a"), b"k2").unwrap();
        idx.set(&Value::text("b"), b"k3").unwrap();

        let mut seen = Vec::new();
        idx.ascend_greater_or_equal(Pivot::for_type(ValueType::Text), |v, _| {
            seen.push(v.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![Value::text("a"), Value::text("b")]);

        // An integer pivot only covers the (normalized) number section.
        let mut seen = Vec::new();
        idx.ascend_greater_or_equal(Pivot::for_type(ValueType::Integer), |v, _| {
            seen.push(v.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![Value::Double(1.0)]);
    }

    #[test]
    fn test_nulls_sort_first() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);
        idx.set(&Value::Integer(1), b"k1").unwrap();
        idx.set(&Value::Null, b"k2").unwrap();

        let mut seen = Vec::new();
        idx.ascend_greater_or_equal(Pivot::default(), |v, pk| {
            seen.push((v.clone(), pk.to_vec()));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (Value::Null, b"k2".to_vec()),
                (Value::Double(1.0), b"k1".to_vec()),
            ]
        );
    }

    #[test]
    fn test_unique_index_collision() {
        let (session, cfg) = test_index(true);
        let idx = Index::new(session.as_ref(), cfg);
        idx.set(&Value::Integer(1), b"k1").unwrap();
        let res = idx.set(&Value::Integer(1), b"k2");
        assert!(matches!(res, Err(Error::DuplicateDocument)));
    }

    #[test]
    fn test_unique_index_payload_is_pk() {
        let (session, cfg) = test_index(true);
        let idx = Index::new(session.as_ref(), cfg);
        idx.set(&Value::Integer(1), b"k1").unwrap();

        let mut seen = Vec::new();
        idx.ascend_greater_or_equal(Pivot::default(), |v, pk| {
            seen.push((v.clone(), pk.to_vec()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(Value::Double(1.0), b"k1".to_vec())]);
    }

    #[test]
    fn test_delete_and_truncate() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);
        idx.set(&Value::Integer(1), b"k1").unwrap();
        idx.set(&Value::Integer(2), b"k2").unwrap();

        idx.delete(&Value::Integer(1), b"k1").unwrap();
        let mut count = 0;
        idx.ascend_greater_or_equal(Pivot::default(), |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 1);

        idx.truncate().unwrap();
        let mut count = 0;
        idx.ascend_greater_or_equal(Pivot::default(), |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_stop_sentinel() {
        let (session, cfg) = test_index(false);
        let idx = Index::new(session.as_ref(), cfg);
        for i in 0..10 {
            idx.set(&Value::Integer(i), format!("k{}", i).as_bytes())
                .unwrap();
        }

        let mut count = 0;
        idx.ascend_greater_or_equal(Pivot::default(), |_, _| {
            count += 1;
            if count == 3 {
                return Err(Error::Stop);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 3);
    }
}
