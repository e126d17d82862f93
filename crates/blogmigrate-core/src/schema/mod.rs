//! Schema conversion from SQLite to PostgreSQL.
//!
//! [`convert_schema`] introspects the source catalog and returns a
//! [`SchemaMapping`]: one [`TableMapping`] per user table with translated
//! column types, defaults, keys and indexes. The mapping is a pure function
//! of the source catalog, so converting the same file twice yields identical
//! output; the transfer step builds its DDL from it.

mod ddl;
mod defaults;
mod introspect;
mod mapping;
mod order;
mod typemap;

pub use ddl::{quote_ident, Dialect};
pub use defaults::{convert_default, DefaultConversion};
pub use introspect::convert_schema;
pub use mapping::{
    ColumnMapping, ConversionWarning, ConversionWarningKind, ForeignKeyMapping, IndexMapping,
    IndexOrigin, SchemaMapping, TableMapping,
};
pub use typemap::{convert_type, TypeConversion};
