//! Catalog of tables and indexes.
//!
//! The catalog is an in-memory snapshot of every table and index
//! configuration, loaded from rows of the reserved system table when a
//! transaction begins. Mutations write rows through the same session, so
//! commit and rollback carry catalog changes atomically with the data
//! they describe.
//!
//! Row shapes, keyed by the `key` field:
//! - `table/<name>`: a table configuration
//! - `index/<name>`: an index configuration
//! - `seq/<name>`: a persisted sequence (auto-increment counters and the
//!   prefix allocator)

use std::collections::BTreeMap;
use std::fmt::Write as _;

use vellum_common::constants::{
    PREFIX_LEN, PREFIX_SEQUENCE_NAME, SCHEMA_TABLE_NAME, SCHEMA_TABLE_PREFIX,
};
use vellum_common::{Error, Result};
use vellum_core::encoding::{decode_document, encode_document, encode_value};
use vellum_core::{Document, Path, Value, ValueType};
use vellum_kv::{IterOptions, Session};

/// A constraint attached to one field path of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    /// The constrained path.
    pub path: Path,
    /// Optional type the value is converted to on write.
    pub ty: Option<ValueType>,
    /// True if this path is the primary key.
    pub is_primary_key: bool,
    /// True if values at this path must be unique across the table.
    pub is_unique: bool,
    /// True if the value may not be null or missing.
    pub is_not_null: bool,
    /// Value assigned when the field is missing on insert.
    pub default_value: Option<Value>,
}

impl FieldConstraint {
    /// Creates an unconstrained field entry for `path`.
    pub fn new(path: Path) -> Self {
        FieldConstraint {
            path,
            ty: None,
            is_primary_key: false,
            is_unique: false,
            is_not_null: false,
            default_value: None,
        }
    }
}

/// Configuration of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConfig {
    /// Table name, unique per database.
    pub name: String,
    /// Field constraints, in declaration order.
    pub field_constraints: Vec<FieldConstraint>,
    /// System tables are read-only.
    pub read_only: bool,
    /// Assigned key-space prefix.
    pub prefix: u32,
}

impl TableConfig {
    /// Creates a table configuration with no constraints.
    pub fn new(name: impl Into<String>) -> Self {
        TableConfig {
            name: name.into(),
            field_constraints: Vec::new(),
            read_only: false,
            prefix: 0,
        }
    }

    /// Adds a field constraint.
    pub fn with_constraint(mut self, constraint: FieldConstraint) -> Self {
        self.field_constraints.push(constraint);
        self
    }

    /// Adds a primary key constraint on `path`.
    pub fn with_primary_key(mut self, path: Path, ty: Option<ValueType>) -> Self {
        self.field_constraints.push(FieldConstraint {
            path,
            ty,
            is_primary_key: true,
            is_unique: false,
            is_not_null: true,
            default_value: None,
        });
        self
    }

    /// Returns the primary key constraint, if any.
    pub fn primary_key(&self) -> Option<&FieldConstraint> {
        self.field_constraints.iter().find(|c| c.is_primary_key)
    }

    /// Returns the encoded key-space prefix of the table.
    pub fn prefix_bytes(&self) -> [u8; PREFIX_LEN] {
        self.prefix.to_be_bytes()
    }
}

/// Configuration of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    /// Index name, unique per database.
    pub name: String,
    /// The indexed table.
    pub table_name: String,
    /// The indexed path.
    pub path: Path,
    /// True if indexed values must be unique.
    pub unique: bool,
    /// Optional type constraint on indexed values.
    pub ty: Option<ValueType>,
    /// True if the index enforces a table constraint and refuses
    /// explicit DROP INDEX.
    pub owned: bool,
    /// Assigned key-space prefix.
    pub prefix: u32,
}

impl IndexConfig {
    /// Creates a non-unique index configuration.
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        path: Path,
    ) -> Self {
        IndexConfig {
            name: name.into(),
            table_name: table_name.into(),
            path,
            unique: false,
            ty: None,
            owned: false,
            prefix: 0,
        }
    }

    /// Marks the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Returns the encoded key-space prefix of the index.
    pub fn prefix_bytes(&self) -> [u8; PREFIX_LEN] {
        self.prefix.to_be_bytes()
    }
}

/// The in-memory catalog snapshot of one transaction.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: BTreeMap<String, TableConfig>,
    indexes: BTreeMap<String, IndexConfig>,
}

impl Catalog {
    /// Loads the catalog from the system table rows visible to
    /// `session`.
    pub(crate) fn load(session: &dyn Session) -> Result<Catalog> {
        let mut catalog = Catalog {
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
        };

        let prefix = SCHEMA_TABLE_PREFIX.to_be_bytes();
        let mut it = session.iterator(IterOptions::prefix(&prefix))?;
        let mut ok = it.first();
        while ok {
            let doc = decode_document(it.value())?;
            match doc.get("type").and_then(Value::as_text) {
                Some("table") => {
                    let cfg = table_from_document(&doc)?;
                    catalog.tables.insert(cfg.name.clone(), cfg);
                }
                Some("index") => {
                    let cfg = index_from_document(&doc)?;
                    catalog.indexes.insert(cfg.name.clone(), cfg);
                }
                Some("sequence") => {}
                other => {
                    return Err(Error::Corruption(format!(
                        "catalog row has invalid type {:?}",
                        other
                    )))
                }
            }
            ok = it.next();
        }

        Ok(catalog)
    }

    /// Returns the configuration of a table.
    ///
    /// The reserved system table is always present.
    pub fn table(&self, name: &str) -> Result<&TableConfig> {
        if name == SCHEMA_TABLE_NAME {
            return Ok(schema_table_config());
        }
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Returns the configuration of an index.
    pub fn index(&self, name: &str) -> Result<&IndexConfig> {
        self.indexes
            .get(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// Returns true if a table with this name exists.
    pub fn table_exists(&self, name: &str) -> bool {
        name == SCHEMA_TABLE_NAME || self.tables.contains_key(name)
    }

    /// Returns true if an index with this name exists.
    pub fn index_exists(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Lists user table names in lexical order. The system table is not
    /// listed.
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Lists index names in lexical order, optionally restricted to one
    /// table.
    pub fn list_indexes(&self, table: Option<&str>) -> Vec<String> {
        self.indexes
            .values()
            .filter(|cfg| table.is_none_or(|t| cfg.table_name == t))
            .map(|cfg| cfg.name.clone())
            .collect()
    }

    /// Returns the configurations of every index of `table`.
    pub fn table_indexes(&self, table: &str) -> Vec<IndexConfig> {
        self.indexes
            .values()
            .filter(|cfg| cfg.table_name == table)
            .cloned()
            .collect()
    }

    pub(crate) fn add_table(&mut self, cfg: TableConfig) {
        self.tables.insert(cfg.name.clone(), cfg);
    }

    pub(crate) fn remove_table(&mut self, name: &str) {
        self.tables.remove(name);
    }

    pub(crate) fn add_index(&mut self, cfg: IndexConfig) {
        self.indexes.insert(cfg.name.clone(), cfg);
    }

    pub(crate) fn remove_index(&mut self, name: &str) {
        self.indexes.remove(name);
    }
}

/// Built-in configuration of the reserved system table.
pub(crate) fn schema_table_config() -> &'static TableConfig {
    use std::sync::OnceLock;
    static CONFIG: OnceLock<TableConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TableConfig {
        name: SCHEMA_TABLE_NAME.to_string(),
        field_constraints: vec![FieldConstraint {
            path: Path::field("key"),
            ty: Some(ValueType::Text),
            is_primary_key: true,
            is_unique: false,
            is_not_null: true,
            default_value: None,
        }],
        read_only: true,
        prefix: SCHEMA_TABLE_PREFIX,
    })
}

// ---------------------------------------------------------------------
// Row persistence
// ---------------------------------------------------------------------

fn row_key(kind: &str, name: &str) -> Vec<u8> {
    let mut key = SCHEMA_TABLE_PREFIX.to_be_bytes().to_vec();
    key.extend_from_slice(&encode_value(&Value::text(format!("{}/{}", kind, name))));
    key
}

pub(crate) fn write_table_row(session: &dyn Session, cfg: &TableConfig) -> Result<()> {
    let doc = table_to_document(cfg);
    session.put(&row_key("table", &cfg.name), &encode_document(&doc))
}

pub(crate) fn delete_table_row(session: &dyn Session, name: &str) -> Result<()> {
    session.delete(&row_key("table", name))
}

pub(crate) fn write_index_row(session: &dyn Session, cfg: &IndexConfig) -> Result<()> {
    let doc = index_to_document(cfg);
    session.put(&row_key("index", &cfg.name), &encode_document(&doc))
}

pub(crate) fn delete_index_row(session: &dyn Session, name: &str) -> Result<()> {
    session.delete(&row_key("index", name))
}

/// Increments the named persisted sequence and returns its new value.
pub(crate) fn next_sequence(session: &dyn Session, name: &str) -> Result<i64> {
    let key = row_key("seq", name);
    let current = match session.get(&key) {
        Ok(raw) => decode_document(&raw)?
            .get("seq")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Corruption(format!("sequence row {} has no counter", name)))?,
        Err(Error::KeyNotFound) => 0,
        Err(e) => return Err(e),
    };

    let next = current + 1;
    let doc = Document::new()
        .with("key", Value::text(format!("seq/{}", name)))
        .with("type", Value::text("sequence"))
        .with("name", Value::text(name))
        .with("seq", Value::Integer(next));
    session.put(&key, &encode_document(&doc))?;
    Ok(next)
}

/// Deletes the named sequence row if present.
pub(crate) fn delete_sequence(session: &dyn Session, name: &str) -> Result<()> {
    match session.delete(&row_key("seq", name)) {
        Ok(()) | Err(Error::KeyNotFound) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Allocates a fresh key-space prefix.
pub(crate) fn next_prefix(session: &dyn Session) -> Result<u32> {
    let seq = next_sequence(session, PREFIX_SEQUENCE_NAME)?;
    u32::try_from(seq).map_err(|_| Error::Internal("prefix space exhausted".into()))
}

// ---------------------------------------------------------------------
// Config <-> document conversion
// ---------------------------------------------------------------------

fn table_to_document(cfg: &TableConfig) -> Document {
    let constraints: Vec<Value> = cfg
        .field_constraints
        .iter()
        .map(|c| {
            let mut doc = Document::new().with("path", Value::text(c.path.to_string()));
            if let Some(ty) = c.ty {
                doc.set("type", Value::text(ty.to_string()));
            }
            doc.set("primary_key", Value::Bool(c.is_primary_key));
            doc.set("unique", Value::Bool(c.is_unique));
            doc.set("not_null", Value::Bool(c.is_not_null));
            if let Some(default) = &c.default_value {
                doc.set("default", default.clone());
            }
            Value::Object(doc)
        })
        .collect();

    Document::new()
        .with("key", Value::text(format!("table/{}", cfg.name)))
        .with("type", Value::text("table"))
        .with("name", Value::text(cfg.name.clone()))
        .with("prefix", Value::Integer(i64::from(cfg.prefix)))
        .with("sql", Value::text(format_create_table(cfg)))
        .with("constraints", Value::Array(constraints))
}

fn table_from_document(doc: &Document) -> Result<TableConfig> {
    let name = required_text(doc, "name")?;
    let prefix = required_prefix(doc)?;

    let mut constraints = Vec::new();
    if let Some(Value::Array(items)) = doc.get("constraints") {
        for item in items {
            let Value::Object(c) = item else {
                return Err(Error::Corruption("constraint row is not an object".into()));
            };
            constraints.push(FieldConstraint {
                path: Path::parse(required_text(c, "path")?)?,
                ty: match c.get("type").and_then(Value::as_text) {
                    Some(name) => Some(ValueType::from_sql_name(name).ok_or_else(|| {
                        Error::Corruption(format!("unknown constraint type {:?}", name))
                    })?),
                    None => None,
                },
                is_primary_key: bool_field(c, "primary_key"),
                is_unique: bool_field(c, "unique"),
                is_not_null: bool_field(c, "not_null"),
                default_value: c.get("default").cloned(),
            });
        }
    }

    Ok(TableConfig {
        name: name.to_string(),
        field_constraints: constraints,
        read_only: false,
        prefix,
    })
}

fn index_to_document(cfg: &IndexConfig) -> Document {
    let mut doc = Document::new()
        .with("key", Value::text(format!("index/{}", cfg.name)))
        .with("type", Value::text("index"))
        .with("name", Value::text(cfg.name.clone()))
        .with("table_name", Value::text(cfg.table_name.clone()))
        .with("path", Value::text(cfg.path.to_string()))
        .with("unique", Value::Bool(cfg.unique))
        .with("owned", Value::Bool(cfg.owned))
        .with("prefix", Value::Integer(i64::from(cfg.prefix)))
        .with("sql", Value::text(format_create_index(cfg)));
    if let Some(ty) = cfg.ty {
        doc.set("value_type", Value::text(ty.to_string()));
    }
    doc
}

fn index_from_document(doc: &Document) -> Result<IndexConfig> {
    Ok(IndexConfig {
        name: required_text(doc, "name")?.to_string(),
        table_name: required_text(doc, "table_name")?.to_string(),
        path: Path::parse(required_text(doc, "path")?)?,
        unique: bool_field(doc, "unique"),
        ty: match doc.get("value_type").and_then(Value::as_text) {
            Some(name) => Some(
                ValueType::from_sql_name(name)
                    .ok_or_else(|| Error::Corruption(format!("unknown index type {:?}", name)))?,
            ),
            None => None,
        },
        owned: bool_field(doc, "owned"),
        prefix: required_prefix(doc)?,
    })
}

fn required_text<'a>(doc: &'a Document, field: &str) -> Result<&'a str> {
    doc.get(field)
        .and_then(Value::as_text)
        .ok_or_else(|| Error::Corruption(format!("catalog row is missing field {:?}", field)))
}

fn required_prefix(doc: &Document) -> Result<u32> {
    let prefix = doc
        .get("prefix")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Corruption("catalog row is missing its prefix".into()))?;
    u32::try_from(prefix).map_err(|_| Error::Corruption("catalog prefix out of range".into()))
}

fn bool_field(doc: &Document, field: &str) -> bool {
    matches!(doc.get(field), Some(Value::Bool(true)))
}

/// Renders the canonical CREATE TABLE source of a configuration.
pub(crate) fn format_create_table(cfg: &TableConfig) -> String {
    let mut sql = format!("CREATE TABLE {}", cfg.name);
    if cfg.field_constraints.is_empty() {
        return sql;
    }

    sql.push_str(" (");
    for (i, c) in cfg.field_constraints.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "{}", c.path);
        if let Some(ty) = c.ty {
            let _ = write!(sql, " {}", ty.sql_name());
        }
        if c.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if c.is_unique {
            sql.push_str(" UNIQUE");
        }
        if c.is_not_null && !c.is_primary_key {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &c.default_value {
            let _ = write!(sql, " DEFAULT {}", default);
        }
    }
    sql.push(')');
    sql
}

/// Renders the canonical CREATE INDEX source of a configuration.
pub(crate) fn format_create_index(cfg: &IndexConfig) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if cfg.unique { "UNIQUE " } else { "" },
        cfg.name,
        cfg.table_name,
        cfg.path
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_config_round_trip() {
        let cfg = TableConfig {
            name: "users".into(),
            field_constraints: vec![
                FieldConstraint {
                    path: Path::field("id"),
                    ty: Some(ValueType::Integer),
                    is_primary_key: true,
                    is_unique: false,
                    is_not_null: true,
                    default_value: None,
                },
                FieldConstraint {
                    path: Path::field("email"),
                    ty: Some(ValueType::Text),
                    is_primary_key: false,
                    is_unique: true,
                    is_not_null: false,
                    default_value: None,
                },
                FieldConstraint {
                    path: Path::field("active"),
                    ty: Some(ValueType::Boolean),
                    is_primary_key: false,
                    is_unique: false,
                    is_not_null: false,
                    default_value: Some(Value::Bool(true)),
                },
            ],
            read_only: false,
            prefix: 7,
        };

        let doc = table_to_document(&cfg);
        let back = table_from_document(&doc).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_index_config_round_trip() {
        let cfg = IndexConfig {
            name: "users_email_idx".into(),
            table_name: "users".into(),
            path: Path::field("email"),
            unique: true,
            ty: Some(ValueType::Text),
            owned: true,
            prefix: 9,
        };

        let doc = index_to_document(&cfg);
        let back = index_from_document(&doc).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_format_sql() {
        let cfg = TableConfig::new("t")
            .with_primary_key(Path::field("id"), Some(ValueType::Integer));
        assert_eq!(
            format_create_table(&cfg),
            "CREATE TABLE t (id int64 PRIMARY KEY)"
        );
        assert_eq!(format_create_table(&TableConfig::new("t")), "CREATE TABLE t");

        let idx = IndexConfig::new("i", "t", Path::field("a")).unique();
        assert_eq!(format_create_index(&idx), "CREATE UNIQUE INDEX i ON t (a)");
    }

    #[test]
    fn test_schema_table_is_builtin() {
        let catalog = Catalog {
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
        };
        let cfg = catalog.table(SCHEMA_TABLE_NAME).unwrap();
        assert!(cfg.read_only);
        assert_eq!(cfg.prefix, SCHEMA_TABLE_PREFIX);
        assert!(catalog.list_tables().is_empty());
    }
}
