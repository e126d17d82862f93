//! Schema mapping types produced by the converter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single column with its source and target definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column name.
    pub name: String,
    /// Declared SQLite type, verbatim.
    pub source_type: String,
    /// PostgreSQL type.
    pub target_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Single-column INTEGER primary key (a SQLite rowid alias).
    pub identity: bool,
    /// Default expression as declared in SQLite.
    pub source_default: Option<String>,
    /// Default expression translated for PostgreSQL.
    pub default: Option<String>,
}

impl ColumnMapping {
    /// Create a nullable, non-key column without a default.
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            nullable: true,
            primary_key: false,
            identity: false,
            source_default: None,
            default: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Set both the source and translated default.
    pub fn with_default(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_default = Some(source.into());
        self.default = Some(target.into());
        self
    }

    /// Whether values for this column are shipped to PostgreSQL as bytes.
    pub fn is_binary(&self) -> bool {
        self.target_type.eq_ignore_ascii_case("BYTEA")
    }
}

/// One column pair of a foreign key constraint.
///
/// Composite keys appear as several entries sharing the same `group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyMapping {
    /// Constraint id within the table (SQLite `foreign_key_list.id`).
    pub group: i64,
    /// Referencing column.
    pub from_column: String,
    /// Referenced table.
    pub to_table: String,
    /// Referenced column.
    pub to_column: String,
    /// ON UPDATE action.
    pub on_update: String,
    /// ON DELETE action.
    pub on_delete: String,
}

impl ForeignKeyMapping {
    /// Create a single-column foreign key with NO ACTION semantics.
    pub fn new(
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            group: 0,
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
            on_update: "NO ACTION".to_string(),
            on_delete: "NO ACTION".to_string(),
        }
    }
}

/// Where an index came from in the source schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    /// Created with `CREATE INDEX`.
    Explicit,
    /// Backs an inline `UNIQUE` constraint.
    UniqueConstraint,
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapping {
    /// Index name.
    pub name: String,
    /// Indexed columns in key order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Index origin.
    pub origin: IndexOrigin,
}

/// Mapping for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMapping>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
    /// Foreign keys ordered by (group, position).
    pub foreign_keys: Vec<ForeignKeyMapping>,
    /// Indexes ordered by name.
    pub indexes: Vec<IndexMapping>,
}

impl TableMapping {
    /// Create an empty table mapping.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column. Primary key columns are appended to the key.
    pub fn with_column(mut self, column: ColumnMapping) -> Self {
        if column.primary_key {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, foreign_key: ForeignKeyMapping) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Add an index.
    pub fn with_index(mut self, index: IndexMapping) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// The identity column, if the table has one.
    pub fn identity_column(&self) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.identity)
    }

    /// Other tables this table references.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.to_table.as_str())
            .filter(|parent| *parent != self.name)
            .collect()
    }

    /// Foreign keys grouped into constraints, in group order.
    pub fn foreign_key_groups(&self) -> Vec<Vec<&ForeignKeyMapping>> {
        let mut groups: BTreeMap<i64, Vec<&ForeignKeyMapping>> = BTreeMap::new();
        for fk in &self.foreign_keys {
            groups.entry(fk.group).or_default().push(fk);
        }
        groups.into_values().collect()
    }
}

/// What kind of construct could only be converted best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarningKind {
    /// Declared type has no entry in the lookup table; passed through.
    UnknownType {
        /// The declared type.
        source_type: String,
    },
    /// Default expression is not a recognised literal; passed through.
    UnsupportedDefault {
        /// The declared default.
        expression: String,
    },
    /// Partial index (with a WHERE clause); not recreated.
    PartialIndex {
        /// Index name.
        index: String,
    },
    /// Index over an expression rather than columns; not recreated.
    ExpressionIndex {
        /// Index name.
        index: String,
    },
    /// Foreign key points at a table that is not being migrated.
    DanglingForeignKey {
        /// Referenced table.
        to_table: String,
    },
}

/// A construct that was converted best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWarning {
    /// Table the construct belongs to.
    pub table: String,
    /// Column, when the construct is column-level.
    pub column: Option<String>,
    /// What happened.
    #[serde(flatten)]
    pub kind: ConversionWarningKind,
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}: ", self.table, column)?,
            None => write!(f, "{}: ", self.table)?,
        }
        match &self.kind {
            ConversionWarningKind::UnknownType { source_type } => {
                write!(f, "unknown type '{}' passed through", source_type)
            }
            ConversionWarningKind::UnsupportedDefault { expression } => {
                write!(f, "default '{}' passed through", expression)
            }
            ConversionWarningKind::PartialIndex { index } => {
                write!(f, "partial index {} skipped", index)
            }
            ConversionWarningKind::ExpressionIndex { index } => {
                write!(f, "expression index {} skipped", index)
            }
            ConversionWarningKind::DanglingForeignKey { to_table } => {
                write!(f, "foreign key to unknown table {}", to_table)
            }
        }
    }
}

/// The complete translated schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMapping {
    /// Tables keyed by name.
    pub tables: BTreeMap<String, TableMapping>,
    /// Best-effort conversions, in discovery order.
    pub warnings: Vec<ConversionWarning>,
}

impl SchemaMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table.
    pub fn with_table(mut self, table: TableMapping) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableMapping> {
        self.tables.get(name)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the mapping has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
