#![warn(missing_docs)]
//! Core library entry points for the UML name embedding pipeline.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod embedder;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod loader;
pub mod pooling;
pub mod technique;
pub mod text;

pub use cache::{CacheArtifact, CacheManifest, CachePolicy};
pub use config::{BackendConfig, Cli, EncoderConfig, HubConfig, TrainingConfig};
pub use dataset::{DatasetId, NameKind, NameRecord, NameTable};
pub use embedder::{Backend, TextEmbedder};
pub use embeddings::{EmbeddedRecord, EmbeddingTable, EmbeddingVector, PooledRecord, PooledTable};
pub use encoder::{Encoder, EncoderStats};
pub use error::{EmbedError, Result};
pub use loader::DataLoader;
pub use pooling::{apply_pooling, pool_table, pool_vector, PoolingTechnique};
pub use technique::EmbeddingTechnique;
