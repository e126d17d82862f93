//! Output formatting.

use std::fmt;

use blogmigrate_core::BackupRecord;
use clap::ValueEnum;
use serde::Serialize;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render `value` in the requested format.
pub fn render<T>(format: OutputFormat, value: &T) -> serde_json::Result<String>
where
    T: Serialize + fmt::Display,
{
    match format {
        OutputFormat::Text => Ok(value.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(value),
    }
}

/// A list of backups, oldest first.
#[derive(Serialize)]
#[serde(transparent)]
pub struct BackupList(pub Vec<BackupRecord>);

impl fmt::Display for BackupList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "no backups");
        }
        for record in &self.0 {
            writeln!(f, "{}", BackupLine(record))?;
        }
        Ok(())
    }
}

/// One backup on a single line.
#[derive(Serialize)]
#[serde(transparent)]
pub struct BackupLine<'a>(pub &'a BackupRecord);

impl fmt::Display for BackupLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(
            f,
            "{}  {:>12} bytes  {}{}",
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            record.size_bytes,
            record.path.display(),
            if record.compressed { "  (gzip)" } else { "" }
        )
    }
}
