//! Word2vec backend: skip-gram vectors trained on the table's own names.

use tracing::info;

use super::skipgram::{self, Vocabulary};
use super::Backend;
use crate::config::TrainingConfig;
use crate::dataset::NameTable;
use crate::embeddings::EmbeddingVector;
use crate::error::{EmbedError, Result};
use crate::text;

/// Trains a fresh word2vec model per build.
#[derive(Debug, Clone)]
pub struct Word2VecBackend {
    config: TrainingConfig,
}

impl Word2VecBackend {
    /// Builds a backend with the given hyperparameters.
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }
}

/// Trained word vectors.
#[derive(Debug, Clone)]
pub struct Word2VecModel {
    vocab: Vocabulary,
    vectors: Vec<f32>,
    dim: usize,
}

impl Word2VecModel {
    /// Vector for `token`, if it survived vocabulary pruning.
    pub fn vector(&self, token: &str) -> Option<&[f32]> {
        self.vocab
            .get(token)
            .map(|idx| &self.vectors[idx * self.dim..(idx + 1) * self.dim])
    }

    /// Number of words in the vocabulary.
    pub fn vocabulary_size(&self) -> usize {
        self.vocab.len()
    }
}

impl Backend for Word2VecBackend {
    type Model = Word2VecModel;

    fn build(&self, table: &NameTable) -> Result<Word2VecModel> {
        let corpus = skipgram::corpus(table);
        let vocab = Vocabulary::build(&corpus, self.config.min_count);
        info!(
            words = vocab.len(),
            dimensions = self.config.dimensions,
            epochs = self.config.epochs,
            "training word2vec vectors"
        );
        let sentences: Vec<Vec<usize>> = corpus.iter().map(|s| vocab.encode(s)).collect();
        let inputs: Vec<Vec<usize>> = (0..vocab.len()).map(|idx| vec![idx]).collect();
        let vectors = skipgram::train(&self.config, &vocab, &sentences, &inputs, vocab.len());
        Ok(Word2VecModel {
            vocab,
            vectors,
            dim: self.config.dimensions.max(1),
        })
    }

    fn embed(&self, text: &str, model: &Word2VecModel) -> Result<EmbeddingVector> {
        text::tokenize(text)
            .into_iter()
            .map(|sentence| {
                sentence
                    .into_iter()
                    .map(|token| {
                        model
                            .vector(token)
                            .map(<[f32]>::to_vec)
                            .ok_or_else(|| EmbedError::UnknownToken(token.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    fn dimension(&self, model: &Word2VecModel) -> usize {
        model.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn table() -> NameTable {
        let classes: BTreeSet<String> = ["Customer", "Order line"]
            .into_iter()
            .map(String::from)
            .collect();
        let attributes: BTreeSet<String> = ["customer id", "line total"]
            .into_iter()
            .map(String::from)
            .collect();
        NameTable::from_sets(classes, attributes)
    }

    fn backend() -> Word2VecBackend {
        Word2VecBackend::new(TrainingConfig {
            dimensions: 6,
            epochs: 2,
            ..TrainingConfig::default()
        })
    }

    #[test]
    fn embeds_known_tokens_per_sentence() {
        let backend = backend();
        let model = backend.build(&table()).unwrap();
        assert_eq!(model.vocabulary_size(), 6);

        let embedding = backend.embed("Order line", &model).unwrap();
        assert_eq!(embedding.len(), 1);
        assert_eq!(embedding[0].len(), 2);
        assert!(embedding[0].iter().all(|v| v.len() == 6));
        assert_eq!(embedding[0][0], model.vector("Order").unwrap());
    }

    #[test]
    fn unknown_tokens_fail() {
        let backend = backend();
        let model = backend.build(&table()).unwrap();
        let err = backend.embed("Invoice", &model).unwrap_err();
        assert!(matches!(err, EmbedError::UnknownToken(ref token) if token == "Invoice"));
    }
}
