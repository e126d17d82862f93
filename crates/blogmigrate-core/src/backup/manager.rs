//! Backup creation, listing and restore.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{Connection, DatabaseName, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{MigrationError, Result};

use super::record::{is_manifest, manifest_path_for, BackupRecord, HashingWriter};

/// Backup directory used when none is configured.
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Files SQLite keeps next to a database. Stale copies would be replayed
/// over a restored file, so they are removed on restore.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Result of [`BackupManager::rollback_to_sqlite`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Backup that was restored.
    pub restored_from: Option<PathBuf>,
}

impl RollbackOutcome {
    fn restored(record: &BackupRecord) -> Self {
        Self {
            success: true,
            error: None,
            restored_from: Some(record.path.clone()),
        }
    }

    fn failed(err: &MigrationError, record: Option<&BackupRecord>) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            restored_from: record.map(|r| r.path.clone()),
        }
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.restored_from) {
            (None, Some(from)) => write!(f, "rolled back from {}", from.display()),
            (None, None) => write!(f, "rolled back"),
            (Some(err), _) => write!(f, "rollback failed: {}", err),
        }
    }
}

/// Manages backups of one working database.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    working_path: PathBuf,
    compress: bool,
}

impl BackupManager {
    /// Backups go to `backup_dir`; rollbacks restore over `working_path`.
    pub fn new(backup_dir: impl Into<PathBuf>, working_path: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            working_path: working_path.into(),
            compress: false,
        }
    }

    /// Gzip new backups.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    /// Copy `source` into the backup directory and write its manifest.
    pub fn create_backup(&self, source: impl AsRef<Path>) -> Result<BackupRecord> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(MigrationError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        fs::create_dir_all(&self.backup_dir)?;

        let created_at = Utc::now();
        let stamp = created_at.format("%Y%m%d_%H%M%S_%6f").to_string();
        let (path, file) = self.reserve_backup_file(source, &stamp)?;

        let copied = self.write_backup(source, file);
        let (checksum, size_bytes) = match copied {
            Ok(done) => done,
            Err(err) => {
                let _ = fs::remove_file(&path);
                return Err(err);
            }
        };

        let record = BackupRecord {
            path,
            source: source.to_path_buf(),
            created_at,
            checksum,
            size_bytes,
            compressed: self.compress,
        };
        record.write_manifest()?;

        info!(
            source = %source.display(),
            backup = %record.path.display(),
            bytes = size_bytes,
            compressed = self.compress,
            "backup created"
        );
        Ok(record)
    }

    /// Pick an unused file name and create it exclusively.
    fn reserve_backup_file(&self, source: &Path, stamp: &str) -> Result<(PathBuf, File)> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let mut ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        if self.compress {
            ext.push_str(".gz");
        }

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}_{}{}", stem, stamp, ext)
            } else {
                format!("{}_{}_{}{}", stem, stamp, attempt, ext)
            };
            let path = self.backup_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Snapshot `source` with SQLite's online backup API and stream the
    /// snapshot into `file`.
    ///
    /// Copying the main file alone would miss pages still sitting in the
    /// write-ahead log, and restore deletes that log.
    fn write_backup(&self, source: &Path, file: File) -> Result<(String, u64)> {
        let snapshot = self.snapshot_path(source);
        let written = snapshot_database(source, &snapshot)
            .and_then(|()| self.stream_backup(&snapshot, file));
        let _ = fs::remove_file(&snapshot);
        written
    }

    fn snapshot_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        self.backup_dir.join(format!(".{}.snapshot-tmp", name))
    }

    fn stream_backup(&self, snapshot: &Path, file: File) -> Result<(String, u64)> {
        let mut reader = BufReader::new(File::open(snapshot)?);

        let (checksum, size, file) = if self.compress {
            let mut writer =
                HashingWriter::new(GzEncoder::new(BufWriter::new(file), Compression::default()));
            io::copy(&mut reader, &mut writer)?;
            let (checksum, size, encoder) = writer.finish();
            let file = encoder.finish()?.into_inner().map_err(|e| e.into_error())?;
            (checksum, size, file)
        } else {
            let mut writer = HashingWriter::new(BufWriter::new(file));
            io::copy(&mut reader, &mut writer)?;
            let (checksum, size, buffered) = writer.finish();
            (checksum, size, buffered.into_inner().map_err(|e| e.into_error())?)
        };
        file.sync_all()?;
        Ok((checksum, size))
    }

    /// All backups with a readable manifest, oldest first.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !is_manifest(&path) {
                continue;
            }
            match BackupRecord::read_manifest(&path) {
                Ok(record) if record.path.is_file() => records.push(record),
                Ok(record) => {
                    warn!(backup = %record.path.display(), "manifest without backup file, skipping")
                }
                Err(err) => warn!(manifest = %path.display(), error = %err, "unreadable manifest, skipping"),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));
        Ok(records)
    }

    /// Most recent backup, if any.
    pub fn latest_backup(&self) -> Result<Option<BackupRecord>> {
        Ok(self.list_backups()?.pop())
    }

    /// Delete a backup and its manifest.
    pub fn discard(&self, record: &BackupRecord) -> Result<()> {
        fs::remove_file(&record.path)?;
        remove_if_exists(&manifest_path_for(&record.path))?;
        info!(backup = %record.path.display(), "backup discarded");
        Ok(())
    }

    /// Restore `record` over `destination`.
    ///
    /// The backup is decoded into a temporary file next to `destination` and
    /// checked against the manifest checksum before it replaces anything.
    pub fn restore(&self, record: &BackupRecord, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let file = File::open(&record.path)?;
        let mut reader: Box<dyn Read> = if record.compressed {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let dir = match destination.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let tmp = dir.join(format!(".{}.restore-tmp", file_name));

        let written = (|| -> Result<String> {
            let mut writer = HashingWriter::new(BufWriter::new(File::create(&tmp)?));
            io::copy(&mut reader, &mut writer)?;
            let (checksum, _, buffered) = writer.finish();
            let file = buffered.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            Ok(checksum)
        })();

        let actual = match written {
            Ok(checksum) => checksum,
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
        };
        if actual != record.checksum {
            let _ = fs::remove_file(&tmp);
            return Err(MigrationError::ChecksumMismatch {
                path: record.path.clone(),
                expected: record.checksum.clone(),
                actual,
            });
        }

        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = destination.as_os_str().to_os_string();
            sidecar.push(suffix);
            remove_if_exists(Path::new(&sidecar))?;
        }
        fs::rename(&tmp, destination)?;

        info!(
            backup = %record.path.display(),
            destination = %destination.display(),
            "backup restored"
        );
        Ok(())
    }

    /// Restore the most recent backup over the working database.
    ///
    /// Never fails; problems are reported in the outcome.
    pub fn rollback_to_sqlite(&self) -> RollbackOutcome {
        match self.latest_backup() {
            Ok(Some(record)) => self.rollback_to(&record),
            Ok(None) => {
                let err = MigrationError::BackupNotFound {
                    dir: self.backup_dir.clone(),
                };
                error!(error = %err, "rollback failed");
                RollbackOutcome::failed(&err, None)
            }
            Err(err) => {
                error!(error = %err, "rollback failed");
                RollbackOutcome::failed(&err, None)
            }
        }
    }

    /// Restore a specific backup over the working database.
    pub fn rollback_to(&self, record: &BackupRecord) -> RollbackOutcome {
        match self.restore(record, &self.working_path) {
            Ok(()) => RollbackOutcome::restored(record),
            Err(err) => {
                error!(backup = %record.path.display(), error = %err, "rollback failed");
                RollbackOutcome::failed(&err, Some(record))
            }
        }
    }
}

/// Consistent copy of the committed state of `source`, WAL included.
fn snapshot_database(source: &Path, snapshot: &Path) -> Result<()> {
    remove_if_exists(snapshot)?;
    let conn = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.backup(DatabaseName::Main, snapshot, None)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
