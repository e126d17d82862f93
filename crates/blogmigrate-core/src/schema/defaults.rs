//! Column default translation.

/// Result of translating one default expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultConversion {
    /// PostgreSQL default expression.
    pub expression: String,
    /// False when the expression was passed through unchanged.
    pub recognized: bool,
}

/// Translate a SQLite default expression for a column of `target_type`.
///
/// Time functions map to their PostgreSQL equivalents, `0`/`1` become
/// `FALSE`/`TRUE` on boolean columns, blob literals become `bytea` literals,
/// and plain literals pass through. One pair of wrapping parentheses is
/// removed first.
pub fn convert_default(expression: &str, target_type: &str) -> DefaultConversion {
    let trimmed = expression.trim();
    let inner = strip_outer_parens(trimmed).trim();
    let compact: String = inner
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let recognized = |expression: &str| DefaultConversion {
        expression: expression.to_string(),
        recognized: true,
    };

    match compact.as_str() {
        "CURRENT_TIMESTAMP" | "DATETIME('NOW')" | "DATETIME('NOW','UTC')" => {
            return recognized("now()")
        }
        "CURRENT_DATE" | "DATE('NOW')" => return recognized("CURRENT_DATE"),
        "CURRENT_TIME" | "TIME('NOW')" => return recognized("CURRENT_TIME"),
        "NULL" => return recognized("NULL"),
        "TRUE" | "FALSE" => return recognized(&compact),
        _ => {}
    }

    if is_numeric_literal(inner) {
        if target_type.eq_ignore_ascii_case("BOOLEAN") {
            match inner {
                "0" => return recognized("FALSE"),
                "1" => return recognized("TRUE"),
                _ => {}
            }
        }
        return recognized(inner);
    }

    if is_string_literal(inner) {
        return recognized(inner);
    }

    if let Some(hex) = blob_literal(inner) {
        return recognized(&format!("'\\x{}'::bytea", hex.to_ascii_lowercase()));
    }

    DefaultConversion {
        expression: trimmed.to_string(),
        recognized: false,
    }
}

/// Remove one pair of parentheses wrapping the whole expression.
fn strip_outer_parens(expr: &str) -> &str {
    let Some(inner) = expr.strip_prefix('(').and_then(|e| e.strip_suffix(')')) else {
        return expr;
    };

    // "(a) + (b)" is not wrapped as a whole
    let mut depth = 0i32;
    for ch in inner.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return expr;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        inner
    } else {
        expr
    }
}

fn is_numeric_literal(expr: &str) -> bool {
    let digits = expr.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(expr);
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let mut prev = ' ';

    for ch in digits.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if seen_digit && !seen_exp => seen_exp = true,
            '-' | '+' if matches!(prev, 'e' | 'E') => {}
            _ => return false,
        }
        prev = ch;
    }
    seen_digit && !matches!(prev, 'e' | 'E' | '-' | '+')
}

fn is_string_literal(expr: &str) -> bool {
    let Some(body) = expr
        .strip_prefix('\'')
        .and_then(|e| e.strip_suffix('\''))
    else {
        return false;
    };
    // embedded quotes must be doubled
    body.replace("''", "").find('\'').is_none()
}

fn blob_literal(expr: &str) -> Option<&str> {
    let body = expr
        .strip_prefix("X'")
        .or_else(|| expr.strip_prefix("x'"))?
        .strip_suffix('\'')?;
    if body.len() % 2 == 0 && body.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(body)
    } else {
        None
    }
}
