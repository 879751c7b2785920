//! Table engine.
//!
//! A table maps documents to key-value entries under the table's
//! key-space prefix: `prefix || encode(pk)` with the encoded document as
//! payload. Every mutation propagates to every index of the table within
//! the same session; if propagation fails the caller is expected to roll
//! the transaction back.

use vellum_common::constants::PREFIX_LEN;
use vellum_common::{Error, Result};
use vellum_core::encoding::{decode_document, encode_document, encode_value};
use vellum_core::{Document, Value};
use vellum_kv::{prefix_successor, IterOptions, Session};

use crate::catalog::{self, IndexConfig, TableConfig};
use crate::index::Index;
use crate::transaction::Transaction;

/// Handle on one table, bound to a transaction.
pub struct Table<'a> {
    tx: &'a Transaction,
    cfg: TableConfig,
    indexes: Vec<IndexConfig>,
}

impl<'a> Table<'a> {
    pub(crate) fn new(tx: &'a Transaction, cfg: TableConfig, indexes: Vec<IndexConfig>) -> Self {
        Table { tx, cfg, indexes }
    }

    /// Returns the table configuration.
    pub fn config(&self) -> &TableConfig {
        &self.cfg
    }

    /// Returns the configurations of the table's indexes.
    pub fn indexes(&self) -> &[IndexConfig] {
        &self.indexes
    }

    /// Inserts a document and returns its encoded primary key.
    ///
    /// When a primary key path is configured, the document must hold a
    /// non-empty value there; otherwise a key is allocated from the
    /// table's auto-increment sequence. Every index of the table receives
    /// an entry, with missing fields indexed as null.
    pub fn insert(&self, doc: &Document) -> Result<Vec<u8>> {
        self.ensure_writable()?;
        let doc = self.validate(doc)?;
        let pk = self.primary_key_of(&doc)?;

        let session = self.tx.session();
        match session.insert(&self.row_key(&pk), &encode_document(&doc)) {
            Err(Error::KeyAlreadyExists) => return Err(Error::DuplicateDocument),
            other => other?,
        }

        for cfg in &self.indexes {
            let value = cfg.path.get_in_document(&doc).cloned().unwrap_or(Value::Null);
            Index::new(session, cfg.clone()).set(&value, &pk)?;
        }

        Ok(pk)
    }

    /// Returns the document stored under the given encoded primary key.
    pub fn get(&self, pk: &[u8]) -> Result<Document> {
        match self.tx.session().get(&self.row_key(pk)) {
            Ok(raw) => decode_document(&raw),
            Err(Error::KeyNotFound) => Err(Error::DocumentNotFound),
            Err(e) => Err(e),
        }
    }

    /// Replaces the document stored under `pk`.
    ///
    /// The replacement must carry the same primary key value; old index
    /// entries are removed and new ones inserted.
    pub fn replace(&self, pk: &[u8], doc: &Document) -> Result<()> {
        self.ensure_writable()?;
        let old = self.get(pk)?;
        let doc = self.validate(doc)?;

        if self.cfg.primary_key().is_some() && self.primary_key_of(&doc)? != pk {
            return Err(Error::TypeMismatch(
                "replacement document has a different primary key".into(),
            ));
        }

        let session = self.tx.session();
        for cfg in &self.indexes {
            let index = Index::new(session, cfg.clone());
            let old_value = cfg.path.get_in_document(&old).cloned().unwrap_or(Value::Null);
            index.delete(&old_value, pk)?;
            let new_value = cfg.path.get_in_document(&doc).cloned().unwrap_or(Value::Null);
            index.set(&new_value, pk)?;
        }

        session.put(&self.row_key(pk), &encode_document(&doc))
    }

    /// Deletes the document stored under `pk` and all its index entries.
    pub fn delete(&self, pk: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let old = self.get(pk)?;

        let session = self.tx.session();
        for cfg in &self.indexes {
            let value = cfg.path.get_in_document(&old).cloned().unwrap_or(Value::Null);
            Index::new(session, cfg.clone()).delete(&value, pk)?;
        }

        session.delete(&self.row_key(pk))
    }

    /// Deletes every document of the table and every entry of its
    /// indexes. The auto-increment sequence is not reset.
    pub fn truncate(&self) -> Result<()> {
        self.ensure_writable()?;
        let session = self.tx.session();

        let prefix = self.cfg.prefix_bytes();
        if let Some(end) = prefix_successor(&prefix) {
            session.delete_range(&prefix, &end)?;
        }
        for cfg in &self.indexes {
            Index::new(session, cfg.clone()).truncate()?;
        }
        Ok(())
    }

    /// Iterates documents in ascending encoded-primary-key order.
    ///
    /// The callback receives the encoded primary key and the document;
    /// it may return [`Error::Stop`] to terminate cleanly.
    pub fn iterate(&self, mut f: impl FnMut(&[u8], &Document) -> Result<()>) -> Result<()> {
        let prefix = self.cfg.prefix_bytes();
        let mut it = self.tx.session().iterator(IterOptions::prefix(&prefix))?;

        let mut ok = it.first();
        while ok {
            let doc = decode_document(it.value())?;
            let pk = &it.key()[PREFIX_LEN..];
            match f(pk, &doc) {
                Ok(()) => {}
                Err(Error::Stop) => return Ok(()),
                Err(e) => return Err(e),
            }
            ok = it.next();
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.cfg.read_only {
            return Err(Error::ReadOnlyTable(self.cfg.name.clone()));
        }
        if !self.tx.writable() {
            return Err(Error::TransactionReadOnly);
        }
        Ok(())
    }

    fn row_key(&self, pk: &[u8]) -> Vec<u8> {
        let mut key = self.cfg.prefix_bytes().to_vec();
        key.extend_from_slice(pk);
        key
    }

    /// Applies defaults and type conversions and checks NOT NULL
    /// constraints, returning the document that will be stored.
    fn validate(&self, doc: &Document) -> Result<Document> {
        let mut doc = doc.clone();

        for constraint in &self.cfg.field_constraints {
            let value = constraint.path.get_in_document(&doc).cloned();
            match value {
                None | Some(Value::Null) => {
                    if let Some(default) = &constraint.default_value {
                        doc.set_by_path(&constraint.path, default.clone())?;
                    } else if constraint.is_not_null && !constraint.is_primary_key {
                        return Err(Error::TypeMismatch(format!(
                            "field {} cannot be null",
                            constraint.path
                        )));
                    }
                }
                Some(value) => {
                    if let Some(ty) = constraint.ty {
                        if value.value_type() != ty {
                            doc.set_by_path(&constraint.path, value.cast_to(ty)?)?;
                        }
                    }
                }
            }
        }

        Ok(doc)
    }

    /// Resolves the encoded primary key for a validated document.
    fn primary_key_of(&self, doc: &Document) -> Result<Vec<u8>> {
        match self.cfg.primary_key() {
            Some(constraint) => {
                let value = constraint
                    .path
                    .get_in_document(doc)
                    .ok_or(Error::MissingPrimaryKey)?;
                if value.is_zero() {
                    return Err(Error::MissingPrimaryKey);
                }
                let value = match constraint.ty {
                    Some(ty) if value.value_type() != ty => value.cast_to(ty)?,
                    _ => value.clone(),
                };
                Ok(encode_value(&value))
            }
            None => {
                let seq = catalog::next_sequence(self.tx.session(), &self.cfg.name)?;
                Ok(encode_value(&Value::Integer(seq)))
            }
        }
    }
}
