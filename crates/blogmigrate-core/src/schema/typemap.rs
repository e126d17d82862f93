//! SQLite declared type → PostgreSQL type lookup.

/// Unparameterised types with a fixed translation.
const TYPE_MAP: &[(&str, &str)] = &[
    ("integer", "INTEGER"),
    ("int", "INTEGER"),
    ("mediumint", "INTEGER"),
    ("bigint", "BIGINT"),
    ("integer unsigned", "BIGINT"),
    ("bigint unsigned", "BIGINT"),
    ("smallint", "SMALLINT"),
    ("tinyint", "SMALLINT"),
    ("smallint unsigned", "INTEGER"),
    ("text", "TEXT"),
    ("clob", "TEXT"),
    ("real", "DOUBLE PRECISION"),
    ("double", "DOUBLE PRECISION"),
    ("double precision", "DOUBLE PRECISION"),
    ("float", "DOUBLE PRECISION"),
    ("bool", "BOOLEAN"),
    ("boolean", "BOOLEAN"),
    ("datetime", "TIMESTAMP WITH TIME ZONE"),
    ("timestamp", "TIMESTAMP WITH TIME ZONE"),
    ("date", "DATE"),
    ("time", "TIME"),
    ("decimal", "NUMERIC"),
    ("numeric", "NUMERIC"),
    ("blob", "BYTEA"),
    ("json", "JSONB"),
    ("varchar", "VARCHAR"),
    ("nvarchar", "VARCHAR"),
    ("char", "CHAR"),
    ("character", "CHAR"),
];

/// Result of translating one declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConversion {
    /// PostgreSQL type.
    pub target_type: String,
    /// False when the type was passed through unchanged.
    pub recognized: bool,
}

impl TypeConversion {
    fn mapped(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            recognized: true,
        }
    }

    fn passthrough(declared: &str) -> Self {
        Self {
            target_type: declared.to_string(),
            recognized: false,
        }
    }
}

/// Translate a SQLite declared type.
///
/// Matching ignores case and redundant whitespace. Length and precision
/// parameters of `varchar`, `char` and `decimal`/`numeric` are carried over.
/// An empty declaration maps to `TEXT`; anything unrecognised is returned
/// verbatim with `recognized == false`.
pub fn convert_type(declared: &str) -> TypeConversion {
    let normalized = normalize(declared);
    if normalized.is_empty() {
        return TypeConversion::mapped("TEXT");
    }

    let (base, params) = match split_params(&normalized) {
        Some(parts) => parts,
        None => return TypeConversion::passthrough(declared),
    };

    match (base, params) {
        ("varchar" | "nvarchar" | "character varying", Some(p)) => {
            TypeConversion::mapped(format!("VARCHAR({})", p))
        }
        ("char" | "character" | "nchar", Some(p)) => TypeConversion::mapped(format!("CHAR({})", p)),
        ("decimal" | "numeric", Some(p)) => TypeConversion::mapped(format!("NUMERIC({})", p)),
        (base, None) => TYPE_MAP
            .iter()
            .find(|(source, _)| *source == base)
            .map(|(_, target)| TypeConversion::mapped(*target))
            .unwrap_or_else(|| TypeConversion::passthrough(declared)),
        _ => TypeConversion::passthrough(declared),
    }
}

/// Lowercase, trim, collapse internal whitespace, and drop spaces inside parentheses.
fn normalize(declared: &str) -> String {
    let collapsed = declared
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();

    let mut out = String::with_capacity(collapsed.len());
    let mut depth = 0usize;
    for ch in collapsed.chars() {
        match ch {
            '(' => {
                depth += 1;
                // "varchar (10)" -> "varchar(10)"
                if out.ends_with(' ') {
                    out.pop();
                }
                out.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(ch);
            }
            ' ' if depth > 0 => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Split `base(params)` into its parts. Parameters must be digits and commas.
///
/// Returns `None` for malformed parameter lists.
fn split_params(normalized: &str) -> Option<(&str, Option<&str>)> {
    let Some(open) = normalized.find('(') else {
        return Some((normalized, None));
    };
    let inner = normalized[open + 1..].strip_suffix(')')?;
    let well_formed = !inner.is_empty()
        && inner.split(',').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return None;
    }
    Some((&normalized[..open], Some(inner)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(declared: &str) -> String {
        convert_type(declared).target_type
    }

    #[test]
    fn test_fixed_lookup() {
        assert_eq!(target("integer"), "INTEGER");
        assert_eq!(target("INTEGER"), "INTEGER");
        assert_eq!(target("bigint"), "BIGINT");
        assert_eq!(target("integer unsigned"), "BIGINT");
        assert_eq!(target("smallint unsigned"), "INTEGER");
        assert_eq!(target("text"), "TEXT");
        assert_eq!(target("real"), "DOUBLE PRECISION");
        assert_eq!(target("bool"), "BOOLEAN");
        assert_eq!(target("datetime"), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(target("date"), "DATE");
        assert_eq!(target("BLOB"), "BYTEA");
        assert_eq!(target("decimal"), "NUMERIC");
    }

    #[test]
    fn test_parameters_preserved() {
        assert_eq!(target("varchar(200)"), "VARCHAR(200)");
        assert_eq!(target("VARCHAR ( 50 )"), "VARCHAR(50)");
        assert_eq!(target("char(32)"), "CHAR(32)");
        assert_eq!(target("decimal(10, 2)"), "NUMERIC(10,2)");
        assert_eq!(target("numeric(5)"), "NUMERIC(5)");
    }

    #[test]
    fn test_whitespace_and_case() {
        assert_eq!(target("  Double   Precision "), "DOUBLE PRECISION");
        assert_eq!(target("Integer  Unsigned"), "BIGINT");
    }

    #[test]
    fn test_empty_declaration_is_text() {
        let conversion = convert_type("");
        assert_eq!(conversion.target_type, "TEXT");
        assert!(conversion.recognized);
    }

    #[test]
    fn test_unknown_types_pass_through() {
        let conversion = convert_type("Geometry");
        assert_eq!(conversion.target_type, "Geometry");
        assert!(!conversion.recognized);

        let conversion = convert_type("varchar(max)");
        assert_eq!(conversion.target_type, "varchar(max)");
        assert!(!conversion.recognized);

        assert!(!convert_type("integer(10)").recognized);
    }

    #[test]
    fn test_deterministic() {
        for declared in ["integer", "varchar(12)", "weird type", "", "DATETIME"] {
            assert_eq!(convert_type(declared), convert_type(declared));
        }
    }
}
