//! System-wide constants.

/// Name of the reserved system table holding the catalog.
///
/// The table is visible to `SELECT` but rejects DDL and DML.
pub const SCHEMA_TABLE_NAME: &str = "__vellum_schema";

/// Name of the persisted sequence that allocates key-space prefixes for
/// tables and indexes.
pub const PREFIX_SEQUENCE_NAME: &str = "__prefix";

/// Key-space prefix identifier reserved for the schema table itself.
pub const SCHEMA_TABLE_PREFIX: u32 = 0;

/// Width in bytes of an encoded key-space prefix.
pub const PREFIX_LEN: usize = 4;

/// Suffix appended to constraint-bound index names: `<table>_<path>_idx`.
pub const CONSTRAINT_INDEX_SUFFIX: &str = "_idx";
