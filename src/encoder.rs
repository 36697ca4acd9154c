//! Read-through embedding of whole name tables.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::cache::{CacheArtifact, CachePolicy};
use crate::config::EncoderConfig;
use crate::dataset::NameTable;
use crate::embedder;
use crate::embeddings::{EmbeddedRecord, EmbeddingTable};
use crate::error::{EmbedError, Result};
use crate::technique::EmbeddingTechnique;

/// Work performed by an encoder since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    /// Backend models built (downloads, loads, or training runs).
    pub builds: usize,
    /// Names pushed through a backend.
    pub embedded: usize,
    /// Tables served from a cache artifact.
    pub cache_hits: usize,
}

/// Embeds name tables with a selected backend, caching results per technique.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: EncoderConfig,
    stats: EncoderStats,
}

impl Encoder {
    /// Builds an encoder.
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            stats: EncoderStats::default(),
        }
    }

    /// Returns the underlying config reference.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Counters for work done so far.
    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    /// Returns `table` embedded with `technique`.
    ///
    /// A stored artifact under `cache_root/<technique key>` is returned as-is.
    /// An artifact written by a different technique under the same key is a
    /// [`EmbedError::Configuration`] error under either policy.
    /// With [`CachePolicy::ReadThrough`] that holds even when the artifact was
    /// computed from a different table; [`CachePolicy::Revalidate`] recomputes
    /// instead. Fresh results are written back when `persist` is set.
    pub fn embedded_dataset(
        &mut self,
        table: &NameTable,
        technique: &EmbeddingTechnique,
        cache_root: &Path,
        persist: bool,
    ) -> Result<EmbeddingTable> {
        let artifact = CacheArtifact::new(cache_root, technique.cache_key());
        let checksum = table.checksum();

        if artifact.exists() {
            let cached = artifact.load()?;
            if cached.technique != technique.name() {
                return Err(EmbedError::Configuration(format!(
                    "cache artifact {:?} holds `{}` embeddings, not `{}`",
                    artifact.data_path(),
                    cached.technique,
                    technique
                )));
            }
            let fresh = cached.checksum == checksum;
            match (fresh, self.config.policy) {
                (true, _) | (false, CachePolicy::ReadThrough) => {
                    if !fresh {
                        warn!(
                            technique = %technique,
                            path = %artifact.data_path().display(),
                            stored = cached.checksum,
                            current = checksum,
                            "cached embeddings were computed from a different name table"
                        );
                    }
                    info!(
                        technique = %technique,
                        path = %artifact.data_path().display(),
                        records = cached.len(),
                        "using cached embeddings"
                    );
                    self.stats.cache_hits += 1;
                    return Ok(cached);
                }
                (false, CachePolicy::Revalidate) => {
                    info!(
                        technique = %technique,
                        stored = cached.checksum,
                        current = checksum,
                        "name table changed; recomputing embeddings"
                    );
                }
            }
        }

        let embedded = self.compute(table, technique, checksum)?;
        if persist {
            let manifest = artifact.store(&embedded)?;
            info!(
                technique = %technique,
                path = %artifact.data_path().display(),
                records = manifest.records,
                dimension = ?manifest.dimension,
                "saved embeddings"
            );
        }
        Ok(embedded)
    }

    fn compute(
        &mut self,
        table: &NameTable,
        technique: &EmbeddingTechnique,
        checksum: u32,
    ) -> Result<EmbeddingTable> {
        info!(
            technique = %technique,
            records = table.len(),
            trained_locally = technique.is_trained_locally(),
            "creating representations"
        );
        let model = embedder::build(technique, &self.config.backend, table)?;
        self.stats.builds += 1;

        let total = table.len();
        let mut records = Vec::with_capacity(total);
        for (idx, record) in table.records().iter().enumerate() {
            let embedding = model.embed(&record.name)?;
            debug!(
                name = %record.name,
                sentences = embedding.len(),
                "embedded name"
            );
            records.push(EmbeddedRecord::new(record, embedding));
            self.stats.embedded += 1;
            if self.config.progress_every > 0 && (idx + 1) % self.config.progress_every == 0 {
                info!(done = idx + 1, total, "embedding progress");
            }
        }

        if let Some(first) = records.first() {
            info!(
                name = %first.name,
                kind = %first.kind,
                tokens = first.token_count(),
                dimension = model.dimension(),
                "first embedded record"
            );
        }

        Ok(EmbeddingTable {
            technique: technique.name().to_string(),
            checksum,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, TrainingConfig};
    use std::collections::BTreeSet;

    fn table(classes: &[&str]) -> NameTable {
        let classes: BTreeSet<String> = classes.iter().map(|c| c.to_string()).collect();
        let attributes: BTreeSet<String> = ["order id", "total"].into_iter().map(String::from).collect();
        NameTable::from_sets(classes, attributes)
    }

    fn config(policy: CachePolicy) -> EncoderConfig {
        EncoderConfig {
            backend: BackendConfig {
                training: TrainingConfig {
                    dimensions: 4,
                    epochs: 1,
                    ..TrainingConfig::default()
                },
                ..BackendConfig::default()
            },
            policy,
            persist: true,
            progress_every: 0,
        }
    }

    #[test]
    fn second_call_is_served_from_cache() {
        let root = tempfile::tempdir().unwrap();
        let names = table(&["Order", "Customer"]);
        let mut encoder = Encoder::new(config(CachePolicy::ReadThrough));

        let first = encoder
            .embedded_dataset(&names, &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();
        assert_eq!(encoder.stats().builds, 1);
        assert_eq!(encoder.stats().embedded, 4);
        assert!(root.path().join("word2vec").join("data.bin").is_file());

        let second = encoder
            .embedded_dataset(&names, &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(encoder.stats().builds, 1);
        assert_eq!(encoder.stats().embedded, 4);
        assert_eq!(encoder.stats().cache_hits, 1);
    }

    #[test]
    fn without_persist_nothing_is_written() {
        let root = tempfile::tempdir().unwrap();
        let mut encoder = Encoder::new(config(CachePolicy::ReadThrough));
        encoder
            .embedded_dataset(&table(&["Order"]), &EmbeddingTechnique::FastText, root.path(), false)
            .unwrap();
        assert!(!root.path().join("fasttext").exists());
    }

    #[test]
    fn read_through_keeps_stale_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let mut encoder = Encoder::new(config(CachePolicy::ReadThrough));
        let original = encoder
            .embedded_dataset(&table(&["Order"]), &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();

        let changed = table(&["Order", "Invoice"]);
        let served = encoder
            .embedded_dataset(&changed, &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();
        assert_eq!(served, original);
        assert_eq!(encoder.stats().builds, 1);
    }

    #[test]
    fn artifact_from_another_technique_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let names = table(&["Order"]);
        let mut encoder = Encoder::new(config(CachePolicy::Revalidate));
        encoder
            .embedded_dataset(&names, &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();

        let transformer = EmbeddingTechnique::Transformer("acme/word2vec".to_string());
        let err = encoder
            .embedded_dataset(&names, &transformer, root.path(), true)
            .unwrap_err();
        assert!(matches!(err, EmbedError::Configuration(_)));
        assert_eq!(encoder.stats().builds, 1);
        assert_eq!(encoder.stats().cache_hits, 0);

        let stored = CacheArtifact::new(root.path(), "word2vec").load().unwrap();
        assert_eq!(stored.technique, "word2vec");
    }

    #[test]
    fn namespaced_transformers_sharing_a_key_do_not_mix() {
        let root = tempfile::tempdir().unwrap();
        let names = table(&["Order"]);
        CacheArtifact::new(root.path(), "bert")
            .store(&EmbeddingTable {
                technique: "orgA/bert".to_string(),
                checksum: names.checksum(),
                records: Vec::new(),
            })
            .unwrap();

        let mut encoder = Encoder::new(config(CachePolicy::ReadThrough));
        let other = EmbeddingTechnique::Transformer("orgB/bert".to_string());
        let err = encoder
            .embedded_dataset(&names, &other, root.path(), true)
            .unwrap_err();
        assert!(matches!(err, EmbedError::Configuration(_)));
        assert_eq!(encoder.stats().builds, 0);
    }

    #[test]
    fn revalidate_recomputes_changed_tables() {
        let root = tempfile::tempdir().unwrap();
        let mut encoder = Encoder::new(config(CachePolicy::Revalidate));
        encoder
            .embedded_dataset(&table(&["Order"]), &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();

        let changed = table(&["Order", "Invoice"]);
        let served = encoder
            .embedded_dataset(&changed, &EmbeddingTechnique::Word2Vec, root.path(), true)
            .unwrap();
        assert_eq!(served.len(), 4);
        assert_eq!(served.checksum, changed.checksum());
        assert_eq!(encoder.stats().builds, 2);

        let reloaded = CacheArtifact::new(root.path(), "word2vec").load().unwrap();
        assert_eq!(reloaded, served);
    }
}
