//! Error taxonomy shared by every pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while loading, embedding, caching, or pooling names.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// An unknown dataset identifier or an invalid option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A file or directory could not be read or written.
    #[error("i/o error at {path:?}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or written.
    #[error("invalid json in {path:?}: {source}")]
    Json {
        /// Path of the offending document.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The requested embedding or pooling technique is not supported.
    #[error("unsupported {kind} technique `{name}`")]
    UnsupportedTechnique {
        /// Which family of technique was requested (`embedding` or `pooling`).
        kind: &'static str,
        /// The rejected name.
        name: String,
    },

    /// Pooling was asked to reduce an embedding without any token vectors.
    #[error("embedding for `{name}` contains no token vectors")]
    EmptyVector {
        /// Name of the record whose embedding is empty.
        name: String,
    },

    /// Token vectors inside a single embedding disagree on their length.
    #[error("embedding for `{name}` mixes dimensions {expected} and {actual}")]
    DimensionMismatch {
        /// Name of the offending record.
        name: String,
        /// Dimension of the first token vector.
        expected: usize,
        /// Dimension of the vector that disagreed.
        actual: usize,
    },

    /// A word-vector model was asked for a token it never saw during training.
    #[error("token `{0}` is not in the trained vocabulary")]
    UnknownToken(String),

    /// Model loading, tokenization, or inference failed.
    #[error("model error: {0}")]
    Model(String),

    /// Downloading pretrained artifacts failed.
    #[error("download failed: {0:#}")]
    Download(anyhow::Error),

    /// The cache artifact could not be encoded or decoded.
    #[error("cache artifact at {path:?} is unreadable: {source}")]
    Cache {
        /// Artifact path.
        path: PathBuf,
        /// Underlying codec error.
        #[source]
        source: bincode::Error,
    },
}

impl EmbedError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unsupported_embedding(name: impl Into<String>) -> Self {
        Self::UnsupportedTechnique {
            kind: "embedding",
            name: name.into(),
        }
    }

    pub(crate) fn unsupported_pooling(name: impl Into<String>) -> Self {
        Self::UnsupportedTechnique {
            kind: "pooling",
            name: name.into(),
        }
    }
}

impl From<candle_core::Error> for EmbedError {
    fn from(err: candle_core::Error) -> Self {
        Self::Model(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = EmbedError> = std::result::Result<T, E>;
