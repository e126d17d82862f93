//! Data transfer from the source database into a target store.
//!
//! [`transfer_data`] copies every table of a [`SchemaMapping`] into a
//! [`TargetStore`] within one transaction. Tables are processed parents
//! first; primary key values are copied verbatim so foreign keys stay valid.
//! On failure the whole transaction is rolled back.
//!
//! [`SchemaMapping`]: crate::schema::SchemaMapping

mod executor;
mod result;
mod sqlite;
mod target;
mod value;

#[cfg(feature = "postgres")]
mod postgres;

pub use executor::{transfer_data, TransferOptions, DEFAULT_BATCH_SIZE};
pub use result::{TableFailure, TransferResult};
pub use sqlite::SqliteTarget;
pub use target::TargetStore;
pub use value::SqlValue;

#[cfg(feature = "postgres")]
pub use postgres::PostgresTarget;
