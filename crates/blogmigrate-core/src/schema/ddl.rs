//! SQL rendering for the target dialects.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::mapping::{ColumnMapping, ForeignKeyMapping, IndexOrigin, SchemaMapping, TableMapping};

/// SQL dialect of a target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// PostgreSQL: translated types and defaults, foreign keys added after the load.
    Postgres,
    /// SQLite: source types and defaults, foreign keys inline and deferred.
    Sqlite,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

impl TableMapping {
    /// `CREATE TABLE IF NOT EXISTS` for this table.
    ///
    /// Unique constraints are inlined. For SQLite, foreign keys to tables in
    /// `mapping` are inlined as deferred constraints; PostgreSQL gets them
    /// from [`TableMapping::post_load_sql`].
    pub fn create_table_sql(&self, mapping: &SchemaMapping, dialect: Dialect) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|column| column_definition(column, dialect))
            .collect();

        if !self.primary_key.is_empty() {
            lines.push(format!(
                "PRIMARY KEY ({})",
                quote_list(self.primary_key.iter().map(String::as_str))
            ));
        }

        for index in &self.indexes {
            if index.origin == IndexOrigin::UniqueConstraint {
                lines.push(format!(
                    "UNIQUE ({})",
                    quote_list(index.columns.iter().map(String::as_str))
                ));
            }
        }

        if dialect == Dialect::Sqlite {
            for group in self.resolvable_foreign_keys(mapping) {
                lines.push(format!(
                    "{} DEFERRABLE INITIALLY DEFERRED",
                    foreign_key_clause(&group)
                ));
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.name),
            lines.join(",\n    ")
        )
    }

    /// Statements run once every table holds its data: explicit indexes,
    /// and for PostgreSQL the foreign key constraints.
    pub fn post_load_sql(&self, mapping: &SchemaMapping, dialect: Dialect) -> Vec<String> {
        let mut statements = Vec::new();

        for index in &self.indexes {
            if index.origin != IndexOrigin::Explicit {
                continue;
            }
            statements.push(format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                quote_ident(&index.name),
                quote_ident(&self.name),
                quote_list(index.columns.iter().map(String::as_str))
            ));
        }

        if dialect == Dialect::Postgres {
            for group in self.resolvable_foreign_keys(mapping) {
                statements.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {}",
                    quote_ident(&self.name),
                    quote_ident(&format!("{}_fk{}", self.name, group[0].group)),
                    foreign_key_clause(&group)
                ));
            }
        }

        statements
    }

    /// `SELECT` of every column, ordered by primary key (rowid when there is none).
    pub fn select_sql(&self) -> String {
        let order = if self.primary_key.is_empty() {
            "rowid".to_string()
        } else {
            quote_list(self.primary_key.iter().map(String::as_str))
        };
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            quote_list(self.column_names()),
            quote_ident(&self.name),
            order
        )
    }

    /// Multi-row `INSERT` with `rows` value tuples.
    ///
    /// SQLite uses numbered `?N` placeholders. PostgreSQL binds every
    /// non-binary value as text and casts it to the column's base type; the
    /// column's own length limit is then enforced on assignment, so an
    /// over-length value fails instead of being cut short.
    pub fn insert_sql(&self, dialect: Dialect, rows: usize) -> String {
        let width = self.columns.len();
        let tuples: Vec<String> = (0..rows)
            .map(|row| {
                let values: Vec<String> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let n = row * width + i + 1;
                        match dialect {
                            Dialect::Sqlite => format!("?{}", n),
                            Dialect::Postgres if column.is_binary() => format!("${}", n),
                            Dialect::Postgres => {
                                format!("CAST(${} AS {})", n, cast_type(&column.target_type))
                            }
                        }
                    })
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&self.name),
            quote_list(self.column_names()),
            tuples.join(", ")
        )
    }

    /// PostgreSQL statement moving the identity sequence past the copied keys.
    pub fn reset_identity_sql(&self) -> Option<String> {
        let column = self.identity_column()?;
        let quoted = quote_ident(&column.name);
        Some(format!(
            "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE(MAX({}), 1), MAX({}) IS NOT NULL) FROM {}",
            quote_ident(&self.name).replace('\'', "''"),
            column.name.replace('\'', "''"),
            quoted,
            quoted,
            quote_ident(&self.name)
        ))
    }

    /// Foreign key groups whose parent table and columns are known.
    fn resolvable_foreign_keys(&self, mapping: &SchemaMapping) -> Vec<Vec<&ForeignKeyMapping>> {
        self.foreign_key_groups()
            .into_iter()
            .filter(|group| {
                group.iter().all(|fk| {
                    !fk.to_column.is_empty()
                        && (fk.to_table == self.name || mapping.table(&fk.to_table).is_some())
                })
            })
            .collect()
    }
}

/// Type used for the explicit cast of a bound text value.
///
/// An explicit cast to `varchar(n)` or `char(n)` truncates silently, so the
/// length (and any other parameters) are dropped here. Bare `CHAR` means
/// `char(1)`, hence `TEXT` for the character family.
fn cast_type(target_type: &str) -> String {
    let stripped = match (target_type.find('('), target_type.find(')')) {
        (Some(open), Some(close)) if open < close => format!(
            "{} {}",
            target_type[..open].trim_end(),
            target_type[close + 1..].trim_start()
        ),
        _ => target_type.to_string(),
    };
    let base = stripped.trim_end();
    if ["CHAR", "CHARACTER", "BPCHAR"]
        .iter()
        .any(|name| base.eq_ignore_ascii_case(name))
    {
        "TEXT".to_string()
    } else {
        base.to_string()
    }
}

fn column_definition(column: &ColumnMapping, dialect: Dialect) -> String {
    let mut definition = quote_ident(&column.name);

    match dialect {
        Dialect::Postgres => {
            definition.push(' ');
            definition.push_str(&column.target_type);
            if column.identity {
                definition.push_str(" GENERATED BY DEFAULT AS IDENTITY");
            }
        }
        Dialect::Sqlite => {
            if !column.source_type.trim().is_empty() {
                definition.push(' ');
                definition.push_str(column.source_type.trim());
            }
        }
    }

    if !column.nullable {
        definition.push_str(" NOT NULL");
    }

    let default = match dialect {
        _ if column.identity => None,
        Dialect::Postgres => column.default.as_deref(),
        Dialect::Sqlite => column.source_default.as_deref(),
    };
    if let Some(default) = default {
        match dialect {
            Dialect::Postgres => definition.push_str(&format!(" DEFAULT {}", default)),
            Dialect::Sqlite => definition.push_str(&format!(" DEFAULT ({})", default)),
        }
    }

    definition
}

fn foreign_key_clause(group: &[&ForeignKeyMapping]) -> String {
    let first = group[0];
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_list(group.iter().map(|fk| fk.from_column.as_str())),
        quote_ident(&first.to_table),
        quote_list(group.iter().map(|fk| fk.to_column.as_str()))
    );
    if !first.on_update.eq_ignore_ascii_case("NO ACTION") {
        clause.push_str(&format!(" ON UPDATE {}", first.on_update));
    }
    if !first.on_delete.eq_ignore_ascii_case("NO ACTION") {
        clause.push_str(&format!(" ON DELETE {}", first.on_delete));
    }
    clause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyMapping, IndexMapping};

    fn blog() -> SchemaMapping {
        let users = TableMapping::new("users")
            .with_column(ColumnMapping {
                identity: true,
                ..ColumnMapping::new("id", "integer", "INTEGER").primary_key()
            })
            .with_column(ColumnMapping::new("username", "varchar(150)", "VARCHAR(150)").not_null())
            .with_column(
                ColumnMapping::new("is_staff", "bool", "BOOLEAN")
                    .not_null()
                    .with_default("0", "FALSE"),
            )
            .with_column(ColumnMapping::new("avatar", "blob", "BYTEA"))
            .with_index(IndexMapping {
                name: "sqlite_autoindex_users_1".to_string(),
                columns: vec!["username".to_string()],
                unique: true,
                origin: IndexOrigin::UniqueConstraint,
            });

        let articles = TableMapping::new("articles")
            .with_column(ColumnMapping {
                identity: true,
                ..ColumnMapping::new("id", "integer", "INTEGER").primary_key()
            })
            .with_column(ColumnMapping::new("author_id", "integer", "INTEGER").not_null())
            .with_foreign_key(ForeignKeyMapping {
                on_delete: "CASCADE".to_string(),
                ..ForeignKeyMapping::new("author_id", "users", "id")
            })
            .with_foreign_key(ForeignKeyMapping {
                group: 1,
                ..ForeignKeyMapping::new("author_id", "ghosts", "id")
            })
            .with_index(IndexMapping {
                name: "articles_author_idx".to_string(),
                columns: vec!["author_id".to_string()],
                unique: false,
                origin: IndexOrigin::Explicit,
            });

        SchemaMapping::new().with_table(users).with_table(articles)
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_table_postgres() {
        let mapping = blog();
        let sql = mapping
            .table("users")
            .unwrap()
            .create_table_sql(&mapping, Dialect::Postgres);

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"users\" ("));
        assert!(sql.contains("\"id\" INTEGER GENERATED BY DEFAULT AS IDENTITY NOT NULL"));
        assert!(sql.contains("\"is_staff\" BOOLEAN NOT NULL DEFAULT FALSE"));
        assert!(sql.contains("\"avatar\" BYTEA"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert!(sql.contains("UNIQUE (\"username\")"));
        assert!(!sql.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_create_table_sqlite_inlines_foreign_keys() {
        let mapping = blog();
        let sql = mapping
            .table("articles")
            .unwrap()
            .create_table_sql(&mapping, Dialect::Sqlite);

        assert!(sql.contains("\"id\" integer NOT NULL"));
        assert!(sql.contains(
            "FOREIGN KEY (\"author_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"
        ));
        // dangling reference dropped
        assert!(!sql.contains("ghosts"));
    }

    #[test]
    fn test_post_load_postgres() {
        let mapping = blog();
        let statements = mapping
            .table("articles")
            .unwrap()
            .post_load_sql(&mapping, Dialect::Postgres);

        assert_eq!(
            statements,
            vec![
                "CREATE INDEX IF NOT EXISTS \"articles_author_idx\" ON \"articles\" (\"author_id\")"
                    .to_string(),
                "ALTER TABLE \"articles\" ADD CONSTRAINT \"articles_fk0\" FOREIGN KEY (\"author_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
                    .to_string(),
            ]
        );

        let sqlite = mapping
            .table("articles")
            .unwrap()
            .post_load_sql(&mapping, Dialect::Sqlite);
        assert_eq!(sqlite.len(), 1);
    }

    #[test]
    fn test_insert_sql() {
        let mapping = blog();
        let users = mapping.table("users").unwrap();

        assert_eq!(
            users.insert_sql(Dialect::Sqlite, 1),
            "INSERT INTO \"users\" (\"id\", \"username\", \"is_staff\", \"avatar\") VALUES (?1, ?2, ?3, ?4)"
        );
        assert_eq!(
            users.insert_sql(Dialect::Postgres, 2),
            "INSERT INTO \"users\" (\"id\", \"username\", \"is_staff\", \"avatar\") VALUES \
             (CAST($1 AS INTEGER), CAST($2 AS VARCHAR), CAST($3 AS BOOLEAN), $4), \
             (CAST($5 AS INTEGER), CAST($6 AS VARCHAR), CAST($7 AS BOOLEAN), $8)"
        );
    }

    #[test]
    fn test_insert_casts_drop_length_limits() {
        let table = TableMapping::new("codes")
            .with_column(ColumnMapping::new("code", "char(2)", "CHAR(2)"))
            .with_column(ColumnMapping::new("label", "nvarchar(5)", "VARCHAR(5)"))
            .with_column(ColumnMapping::new("price", "decimal(10,2)", "NUMERIC(10,2)"))
            .with_column(ColumnMapping::new("note", "text", "TEXT"))
            .with_column(ColumnMapping::new(
                "seen_at",
                "timestamp",
                "TIMESTAMP(3) WITH TIME ZONE",
            ));

        let sql = table.insert_sql(Dialect::Postgres, 1);
        assert!(sql.ends_with(
            "VALUES (CAST($1 AS TEXT), CAST($2 AS VARCHAR), CAST($3 AS NUMERIC), CAST($4 AS TEXT), \
             CAST($5 AS TIMESTAMP WITH TIME ZONE))"
        ));
        // the column definitions keep their limits
        let ddl = table.create_table_sql(&SchemaMapping::new(), Dialect::Postgres);
        assert!(ddl.contains("\"code\" CHAR(2)"));
        assert!(ddl.contains("\"label\" VARCHAR(5)"));
    }

    #[test]
    fn test_select_and_identity_reset() {
        let mapping = blog();
        let users = mapping.table("users").unwrap();
        assert_eq!(
            users.select_sql(),
            "SELECT \"id\", \"username\", \"is_staff\", \"avatar\" FROM \"users\" ORDER BY \"id\""
        );
        assert_eq!(
            users.reset_identity_sql().unwrap(),
            "SELECT setval(pg_get_serial_sequence('\"users\"', 'id'), COALESCE(MAX(\"id\"), 1), MAX(\"id\") IS NOT NULL) FROM \"users\""
        );

        let no_key = TableMapping::new("log").with_column(ColumnMapping::new("line", "text", "TEXT"));
        assert_eq!(no_key.select_sql(), "SELECT \"line\" FROM \"log\" ORDER BY rowid");
        assert!(no_key.reset_identity_sql().is_none());
    }
}
