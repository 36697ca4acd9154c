//! Embedding data structures shared by the encoder, the cache, and pooling.

use serde::{Deserialize, Serialize};

use crate::dataset::{NameKind, NameRecord};

/// Token vectors grouped by sentence: `sentences[s][t][d]`.
pub type EmbeddingVector = Vec<Vec<Vec<f32>>>;

/// Name record augmented with its per-token embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRecord {
    /// Name submitted to the backend.
    pub name: String,
    /// Class or attribute.
    pub kind: NameKind,
    /// Per-sentence, per-token vectors.
    pub embedding: EmbeddingVector,
}

impl EmbeddedRecord {
    /// Attaches an embedding to a name record.
    pub fn new(record: &NameRecord, embedding: EmbeddingVector) -> Self {
        Self {
            name: record.name.clone(),
            kind: record.kind,
            embedding,
        }
    }

    /// Dimension of the first token vector, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.embedding
            .iter()
            .flat_map(|sentence| sentence.iter())
            .map(Vec::len)
            .next()
    }

    /// Number of token vectors across all sentences.
    pub fn token_count(&self) -> usize {
        self.embedding.iter().map(Vec::len).sum()
    }
}

/// Output of one encoder pass, persisted as the cache artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingTable {
    /// Technique name that produced the vectors.
    pub technique: String,
    /// Checksum of the name table the vectors were computed from.
    pub checksum: u32,
    /// Records in name-table order.
    pub records: Vec<EmbeddedRecord>,
}

impl EmbeddingTable {
    /// Embedding dimension reported by the first non-empty record.
    pub fn dimension(&self) -> Option<usize> {
        self.records.iter().find_map(EmbeddedRecord::dimension)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Record whose embedding has been reduced to a single vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledRecord {
    /// Name submitted to the backend.
    pub name: String,
    /// Class or attribute.
    pub kind: NameKind,
    /// Fixed-length feature vector.
    pub embedding: Vec<f32>,
}

/// Embedding table after pooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledTable {
    /// Technique name that produced the vectors.
    pub technique: String,
    /// Pooling operator that reduced them.
    pub pooling: String,
    /// Records in name-table order.
    pub records: Vec<PooledRecord>,
}
