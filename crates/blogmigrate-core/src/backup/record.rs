//! Backup manifests.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

const MANIFEST_SUFFIX: &str = ".manifest.json";

/// One backup of the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Backup file.
    pub path: PathBuf,
    /// Database the backup was taken from.
    pub source: PathBuf,
    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the uncompressed database bytes.
    pub checksum: String,
    /// Uncompressed size.
    pub size_bytes: u64,
    /// Whether the file is gzipped.
    pub compressed: bool,
}

impl BackupRecord {
    /// Location of the JSON manifest for this backup.
    pub fn manifest_path(&self) -> PathBuf {
        manifest_path_for(&self.path)
    }

    pub(crate) fn write_manifest(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(self.manifest_path(), json)?;
        Ok(())
    }

    /// Load a manifest. The backup path is resolved next to the manifest so
    /// a moved backup directory still works.
    pub(crate) fn read_manifest(manifest: &Path) -> Result<Self> {
        let bytes = fs::read(manifest)?;
        let mut record: BackupRecord = serde_json::from_slice(&bytes)?;
        if let (Some(dir), Some(name)) = (manifest.parent(), record.path.file_name()) {
            record.path = dir.join(name);
        }
        Ok(record)
    }
}

pub(crate) fn manifest_path_for(backup: &Path) -> PathBuf {
    let mut name = backup.as_os_str().to_os_string();
    name.push(MANIFEST_SUFFIX);
    PathBuf::from(name)
}

pub(crate) fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(MANIFEST_SUFFIX))
}

/// Writer that hashes and counts everything passing through it.
pub(crate) struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Hex digest, byte count and the wrapped writer.
    pub(crate) fn finish(self) -> (String, u64, W) {
        (hex::encode(self.hasher.finalize()), self.bytes, self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_writer() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        let (digest, bytes, inner) = writer.finish();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(bytes, 3);
        assert_eq!(inner, b"abc");
    }

    #[test]
    fn test_manifest_round_trip_resolves_path() {
        let dir = tempfile::tempdir().unwrap();
        let record = BackupRecord {
            path: PathBuf::from("/elsewhere/blog_20240101_000000_000000.sqlite3"),
            source: PathBuf::from("blog.sqlite3"),
            created_at: Utc::now(),
            checksum: "00".to_string(),
            size_bytes: 1,
            compressed: false,
        };
        let manifest = dir
            .path()
            .join("blog_20240101_000000_000000.sqlite3.manifest.json");
        fs::write(&manifest, serde_json::to_vec(&record).unwrap()).unwrap();

        assert!(is_manifest(&manifest));
        let loaded = BackupRecord::read_manifest(&manifest).unwrap();
        assert_eq!(
            loaded.path,
            dir.path().join("blog_20240101_000000_000000.sqlite3")
        );
        assert_eq!(loaded.manifest_path(), manifest);
        assert_eq!(loaded.checksum, record.checksum);
    }
}
