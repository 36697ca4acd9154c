//! Embedding technique identifiers and their cache keys.

use std::fmt;
use std::str::FromStr;

use crate::error::{EmbedError, Result};

/// Enumerated embedding technique selected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmbeddingTechnique {
    /// Pretrained contextual model, identified by alias or hub repository id.
    Transformer(String),
    /// Subword-aware skip-gram vectors trained on the loaded names.
    FastText,
    /// Plain skip-gram vectors trained on the loaded names.
    Word2Vec,
}

impl EmbeddingTechnique {
    /// Name as supplied by the caller.
    pub fn name(&self) -> &str {
        match self {
            Self::Transformer(model) => model,
            Self::FastText => "fasttext",
            Self::Word2Vec => "word2vec",
        }
    }

    /// Directory name for the cache artifact.
    ///
    /// Namespaced hub ids lose their owner prefix, so `EleutherAI/gpt-neo-1.3B`
    /// caches under `gpt-neo-1.3B`.
    pub fn cache_key(&self) -> &str {
        match self {
            Self::Transformer(model) => model.rsplit('/').next().unwrap_or(model),
            Self::FastText | Self::Word2Vec => self.name(),
        }
    }

    /// True for backends trained on the current table rather than pretrained.
    pub fn is_trained_locally(&self) -> bool {
        matches!(self, Self::FastText | Self::Word2Vec)
    }
}

impl fmt::Display for EmbeddingTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmbeddingTechnique {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("fasttext") {
            return Ok(Self::FastText);
        }
        if name.eq_ignore_ascii_case("word2vec") {
            return Ok(Self::Word2Vec);
        }
        if !is_model_id(name) {
            return Err(EmbedError::unsupported_embedding(name));
        }
        let technique = Self::Transformer(name.to_string());
        // A transformer must never share an artifact directory with a word-vector backend.
        let key = technique.cache_key();
        if key.eq_ignore_ascii_case("fasttext") || key.eq_ignore_ascii_case("word2vec") {
            return Err(EmbedError::unsupported_embedding(name));
        }
        Ok(technique)
    }
}

/// Accepts `name` or `owner/name` built from hub-safe characters.
fn is_model_id(name: &str) -> bool {
    let mut segments = name.split('/');
    let valid_segment = |segment: &str| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    };
    let Some(first) = segments.next() else {
        return false;
    };
    match (segments.next(), segments.next()) {
        (None, _) => valid_segment(first),
        (Some(second), None) => valid_segment(first) && valid_segment(second),
        _ => false,
    }
}
