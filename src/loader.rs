//! Dataset-bound entry point: one parameterized accessor per embedding request.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::EncoderConfig;
use crate::dataset::{self, DatasetId, NameTable};
use crate::embeddings::{EmbeddingTable, PooledTable};
use crate::encoder::{Encoder, EncoderStats};
use crate::error::{EmbedError, Result};
use crate::pooling::{self, PoolingTechnique};
use crate::technique::EmbeddingTechnique;

/// Loaded name table plus the encoder and cache directory that serve it.
///
/// Backends are only built when [`DataLoader::embedding`] asks for them.
#[derive(Debug)]
pub struct DataLoader {
    table: NameTable,
    cache_root: PathBuf,
    encoder: Encoder,
}

impl DataLoader {
    /// Loads `dataset` from `data_dir` and caches under `embeddings_root/<dataset>`.
    pub fn open(
        dataset: DatasetId,
        data_dir: &Path,
        embeddings_root: &Path,
        config: EncoderConfig,
    ) -> Result<Self> {
        info!(dataset = %dataset, "continuing with dataset");
        Self::from_file(
            &dataset.data_path(data_dir),
            dataset.cache_root(embeddings_root),
            config,
        )
    }

    /// Loads an explicit metadata file and caches under `cache_root`.
    pub fn from_file(path: &Path, cache_root: PathBuf, config: EncoderConfig) -> Result<Self> {
        let table = dataset::load_table(path)?;
        Self::from_table(table, cache_root, config)
    }

    /// Wraps an already built table, creating `cache_root` when missing.
    pub fn from_table(table: NameTable, cache_root: PathBuf, config: EncoderConfig) -> Result<Self> {
        fs::create_dir_all(&cache_root).map_err(|err| EmbedError::io(&cache_root, err))?;
        Ok(Self {
            table,
            cache_root,
            encoder: Encoder::new(config),
        })
    }

    /// Name table in load order.
    pub fn table(&self) -> &NameTable {
        &self.table
    }

    /// Directory holding one artifact per technique.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Encoder counters.
    pub fn stats(&self) -> EncoderStats {
        self.encoder.stats()
    }

    /// Embedded table for `technique`, from cache when available.
    pub fn embedding(&mut self, technique: &EmbeddingTechnique) -> Result<EmbeddingTable> {
        let persist = self.encoder.config().persist;
        self.encoder
            .embedded_dataset(&self.table, technique, &self.cache_root, persist)
    }

    /// Pools an embedded table into fixed-length vectors.
    pub fn apply_pooling(technique: PoolingTechnique, table: &EmbeddingTable) -> Result<PooledTable> {
        pooling::pool_table(table, technique)
    }
}
