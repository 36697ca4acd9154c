//! Technique-keyed cache artifacts for embedded tables.
//!
//! Layout: `<cache_root>/<key>/data.bin` holds the bincode-encoded table and
//! `<cache_root>/<key>/manifest.json` describes it. Both files are staged in a
//! temporary file and renamed into place, so a present `data.bin` is always
//! complete.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::embeddings::EmbeddingTable;
use crate::error::{EmbedError, Result};

/// File holding the serialized table.
pub const ARTIFACT_FILE: &str = "data.bin";
/// File holding the artifact description.
pub const MANIFEST_FILE: &str = "manifest.json";

/// How the encoder treats an artifact computed from a different name table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum CachePolicy {
    /// Always return the cached artifact; a changed table only logs a warning.
    #[default]
    ReadThrough,
    /// Recompute and overwrite when the stored checksum differs.
    Revalidate,
}

/// Digest describing a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Technique name that produced the vectors.
    pub technique: String,
    /// Cache directory name.
    pub key: String,
    /// Name-table checksum (CRC32).
    pub checksum: u32,
    /// Number of stored records.
    pub records: usize,
    /// Token vector dimension, when any record has tokens.
    pub dimension: Option<usize>,
    /// Epoch milliseconds when the artifact was written.
    pub created_epoch_ms: u64,
}

impl CacheManifest {
    /// Derives a manifest from a table about to be stored under `key`.
    pub fn from_table(table: &EmbeddingTable, key: &str) -> Self {
        let created_epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_millis() as u64)
            .unwrap_or(0);
        Self {
            technique: table.technique.clone(),
            key: key.to_string(),
            checksum: table.checksum,
            records: table.len(),
            dimension: table.dimension(),
            created_epoch_ms,
        }
    }
}

/// Handle on one technique's artifact directory.
#[derive(Debug, Clone)]
pub struct CacheArtifact {
    key: String,
    dir: PathBuf,
}

impl CacheArtifact {
    /// Artifact for `key` under `cache_root`.
    pub fn new(cache_root: &Path, key: &str) -> Self {
        Self {
            key: key.to_string(),
            dir: cache_root.join(key),
        }
    }

    /// Artifact directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the serialized table.
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE)
    }

    /// Path of the manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// True when a complete table is stored.
    pub fn exists(&self) -> bool {
        self.data_path().is_file()
    }

    /// Reads the stored table.
    pub fn load(&self) -> Result<EmbeddingTable> {
        let path = self.data_path();
        let file = File::open(&path).map_err(|err| EmbedError::io(&path, err))?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|source| EmbedError::Cache { path, source })
    }

    /// Reads the manifest, if one was written.
    pub fn manifest(&self) -> Result<Option<CacheManifest>> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|err| EmbedError::io(&path, err))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| EmbedError::Json { path, source })
    }

    /// Writes `table` and its manifest, replacing any previous artifact.
    pub fn store(&self, table: &EmbeddingTable) -> Result<CacheManifest> {
        fs::create_dir_all(&self.dir).map_err(|err| EmbedError::io(&self.dir, err))?;

        let data_path = self.data_path();
        let mut staged = self.stage()?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            bincode::serialize_into(&mut writer, table).map_err(|source| EmbedError::Cache {
                path: data_path.clone(),
                source,
            })?;
            writer
                .flush()
                .map_err(|err| EmbedError::io(&data_path, err))?;
        }
        staged
            .persist(&data_path)
            .map_err(|err| EmbedError::io(&data_path, err.error))?;

        let manifest = CacheManifest::from_table(table, &self.key);
        let manifest_path = self.manifest_path();
        let mut staged = self.stage()?;
        serde_json::to_writer_pretty(staged.as_file_mut(), &manifest).map_err(|source| {
            EmbedError::Json {
                path: manifest_path.clone(),
                source,
            }
        })?;
        staged
            .persist(&manifest_path)
            .map_err(|err| EmbedError::io(&manifest_path, err.error))?;
        Ok(manifest)
    }

    fn stage(&self) -> Result<NamedTempFile> {
        NamedTempFile::new_in(&self.dir).map_err(|err| EmbedError::io(&self.dir, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::NameKind;
    use crate::embeddings::EmbeddedRecord;
    use pretty_assertions::assert_eq;

    fn sample() -> EmbeddingTable {
        EmbeddingTable {
            technique: "EleutherAI/gpt-neo-1.3B".to_string(),
            checksum: 42,
            records: vec![
                EmbeddedRecord {
                    name: "Car".to_string(),
                    kind: NameKind::Class,
                    embedding: vec![vec![vec![0.25, -1.5, 3.0]]],
                },
                EmbeddedRecord {
                    name: "top speed. km".to_string(),
                    kind: NameKind::Attribute,
                    embedding: vec![
                        vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
                        vec![vec![7.0, 8.0, 9.0]],
                    ],
                },
            ],
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let artifact = CacheArtifact::new(root.path(), "gpt-neo-1.3B");
        assert!(!artifact.exists());

        let table = sample();
        let manifest = artifact.store(&table).unwrap();
        assert!(artifact.exists());
        assert_eq!(artifact.load().unwrap(), table);
        assert_eq!(manifest.records, 2);
        assert_eq!(manifest.dimension, Some(3));
        assert_eq!(artifact.manifest().unwrap(), Some(manifest));
    }

    #[test]
    fn missing_manifest_is_none() {
        let root = tempfile::tempdir().unwrap();
        let artifact = CacheArtifact::new(root.path(), "word2vec");
        assert_eq!(artifact.manifest().unwrap(), None);
    }

    #[test]
    fn directory_without_data_is_a_miss() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("fasttext")).unwrap();
        let artifact = CacheArtifact::new(root.path(), "fasttext");
        assert!(!artifact.exists());
    }

    #[test]
    fn corrupt_artifact_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let artifact = CacheArtifact::new(root.path(), "word2vec");
        fs::create_dir_all(artifact.dir()).unwrap();
        // Declares a three-byte technique name but stops after one byte.
        fs::write(artifact.data_path(), b"\x03\x00\x00\x00\x00\x00\x00\x00a").unwrap();
        let err = artifact.load().unwrap_err();
        assert!(matches!(err, EmbedError::Cache { .. }));
    }
}
