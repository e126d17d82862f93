//! Source catalog introspection.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::{info, warn};

use super::defaults::convert_default;
use super::mapping::{
    ColumnMapping, ConversionWarning, ConversionWarningKind, ForeignKeyMapping, IndexMapping,
    IndexOrigin, SchemaMapping, TableMapping,
};
use super::typemap::convert_type;
use crate::error::Result;
use crate::source::{open_source, user_tables};

/// Read the source schema and translate it for PostgreSQL.
///
/// Every user table is described by its columns (declaration order),
/// primary key, foreign keys and indexes. Unrecognised types and defaults
/// are passed through and recorded in [`SchemaMapping::warnings`].
pub fn convert_schema(source_path: impl AsRef<Path>) -> Result<SchemaMapping> {
    let source_path = source_path.as_ref();
    let conn = open_source(source_path)?;

    let mut mapping = SchemaMapping::new();
    for name in user_tables(&conn)? {
        let table = read_table(&conn, &name, &mut mapping.warnings)?;
        mapping.tables.insert(name, table);
    }
    resolve_foreign_keys(&mut mapping);

    for warning in &mapping.warnings {
        warn!(%warning, "schema construct converted best-effort");
    }
    info!(
        source = %source_path.display(),
        tables = mapping.len(),
        warnings = mapping.warnings.len(),
        "schema converted"
    );

    Ok(mapping)
}

fn read_table(
    conn: &Connection,
    name: &str,
    warnings: &mut Vec<ConversionWarning>,
) -> Result<TableMapping> {
    let mut table = TableMapping::new(name);

    // (column, key position)
    let mut key_positions: Vec<(String, i64)> = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let rows = stmt
        .query_map([name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (column_name, declared, not_null, source_default, pk) in rows {
        let conversion = convert_type(&declared);
        if !conversion.recognized {
            warnings.push(ConversionWarning {
                table: name.to_string(),
                column: Some(column_name.clone()),
                kind: ConversionWarningKind::UnknownType {
                    source_type: declared.clone(),
                },
            });
        }

        let default = source_default.as_deref().map(|expr| {
            let converted = convert_default(expr, &conversion.target_type);
            if !converted.recognized {
                warnings.push(ConversionWarning {
                    table: name.to_string(),
                    column: Some(column_name.clone()),
                    kind: ConversionWarningKind::UnsupportedDefault {
                        expression: expr.to_string(),
                    },
                });
            }
            converted.expression
        });

        if pk > 0 {
            key_positions.push((column_name.clone(), pk));
        }

        table.columns.push(ColumnMapping {
            name: column_name,
            source_type: declared,
            target_type: conversion.target_type,
            nullable: !not_null && pk == 0,
            primary_key: pk > 0,
            identity: false,
            source_default,
            default,
        });
    }

    key_positions.sort_by_key(|(_, position)| *position);
    table.primary_key = key_positions.into_iter().map(|(column, _)| column).collect();

    // A lone INTEGER primary key aliases the rowid
    if let [key] = table.primary_key.as_slice() {
        if let Some(column) = table.columns.iter_mut().find(|c| &c.name == key) {
            column.identity = column.source_type.trim().eq_ignore_ascii_case("integer");
        }
    }

    table.foreign_keys = read_foreign_keys(conn, name)?;
    table.indexes = read_indexes(conn, name, warnings)?;
    Ok(table)
}

fn read_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKeyMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
         FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;
    let foreign_keys = stmt
        .query_map([table], |row| {
            Ok(ForeignKeyMapping {
                group: row.get(0)?,
                to_table: row.get(1)?,
                from_column: row.get(2)?,
                // NULL when the parent's primary key is implied
                to_column: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                on_update: row.get(4)?,
                on_delete: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(foreign_keys)
}

fn read_indexes(
    conn: &Connection,
    table: &str,
    warnings: &mut Vec<ConversionWarning>,
) -> Result<Vec<IndexMapping>> {
    let mut list = conn.prepare(
        "SELECT name, \"unique\", origin, partial FROM pragma_index_list(?1) ORDER BY name",
    )?;
    let entries = list
        .query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::new();

    for (name, unique, origin, partial) in entries {
        let origin = match origin.as_str() {
            "pk" => continue,
            "u" => IndexOrigin::UniqueConstraint,
            _ => IndexOrigin::Explicit,
        };

        if partial {
            warnings.push(ConversionWarning {
                table: table.to_string(),
                column: None,
                kind: ConversionWarningKind::PartialIndex { index: name },
            });
            continue;
        }

        let columns = info
            .query_map([&name], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let Some(columns) = columns.into_iter().collect::<Option<Vec<_>>>() else {
            warnings.push(ConversionWarning {
                table: table.to_string(),
                column: None,
                kind: ConversionWarningKind::ExpressionIndex { index: name },
            });
            continue;
        };

        indexes.push(IndexMapping {
            name,
            columns,
            unique,
            origin,
        });
    }

    Ok(indexes)
}

/// Fill in implied referenced columns and flag references to unknown tables.
fn resolve_foreign_keys(mapping: &mut SchemaMapping) {
    let primary_keys: BTreeMap<String, Vec<String>> = mapping
        .tables
        .iter()
        .map(|(name, table)| (name.clone(), table.primary_key.clone()))
        .collect();

    for table in mapping.tables.values_mut() {
        let mut position = 0usize;
        let mut current_group = None;

        for fk in &mut table.foreign_keys {
            if current_group != Some(fk.group) {
                current_group = Some(fk.group);
                position = 0;
            }

            match primary_keys.get(&fk.to_table) {
                Some(parent_key) => {
                    if fk.to_column.is_empty() {
                        if let Some(column) = parent_key.get(position) {
                            fk.to_column = column.clone();
                        }
                    }
                }
                None => mapping.warnings.push(ConversionWarning {
                    table: table.name.clone(),
                    column: Some(fk.from_column.clone()),
                    kind: ConversionWarningKind::DanglingForeignKey {
                        to_table: fk.to_table.clone(),
                    },
                }),
            }
            position += 1;
        }
    }
}
