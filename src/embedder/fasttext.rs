//! FastText backend: skip-gram vectors enriched with hashed character n-grams.

use tracing::info;

use super::skipgram::{self, Vocabulary};
use super::Backend;
use crate::config::TrainingConfig;
use crate::dataset::NameTable;
use crate::embeddings::EmbeddingVector;
use crate::error::Result;
use crate::text;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Trains a fresh FastText model per build.
#[derive(Debug, Clone)]
pub struct FastTextBackend {
    config: TrainingConfig,
}

impl FastTextBackend {
    /// Builds a backend with the given hyperparameters.
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }
}

/// Trained word and n-gram vectors.
#[derive(Debug, Clone)]
pub struct FastTextModel {
    vocab: Vocabulary,
    vectors: Vec<f32>,
    dim: usize,
    min_n: usize,
    max_n: usize,
    buckets: usize,
}

impl FastTextModel {
    /// Vector for `token`: the mean of its word row (when known) and n-gram rows.
    ///
    /// Out-of-vocabulary tokens are composed from their n-grams alone.
    pub fn vector(&self, token: &str) -> Vec<f32> {
        let rows = self.rows(token);
        let mut out = vec![0.0; self.dim];
        skipgram::average_rows(&self.vectors, &rows, self.dim, &mut out);
        out
    }

    /// True when `token` is part of the trained vocabulary.
    pub fn contains(&self, token: &str) -> bool {
        self.vocab.get(token).is_some()
    }

    fn rows(&self, token: &str) -> Vec<usize> {
        let mut rows: Vec<usize> = self.vocab.get(token).into_iter().collect();
        rows.extend(
            ngram_buckets(token, self.min_n, self.max_n, self.buckets)
                .into_iter()
                .map(|bucket| self.vocab.len() + bucket),
        );
        rows
    }
}

impl Backend for FastTextBackend {
    type Model = FastTextModel;

    fn build(&self, table: &NameTable) -> Result<FastTextModel> {
        let corpus = skipgram::corpus(table);
        let vocab = Vocabulary::build(&corpus, self.config.min_count);
        let min_n = self.config.min_n.max(1);
        let max_n = self.config.max_n.max(min_n);
        let buckets = self.config.buckets.max(1);
        info!(
            words = vocab.len(),
            buckets,
            dimensions = self.config.dimensions,
            epochs = self.config.epochs,
            "training fasttext vectors"
        );

        let inputs: Vec<Vec<usize>> = vocab
            .words()
            .iter()
            .enumerate()
            .map(|(idx, word)| {
                std::iter::once(idx)
                    .chain(
                        ngram_buckets(word, min_n, max_n, buckets)
                            .into_iter()
                            .map(|bucket| vocab.len() + bucket),
                    )
                    .collect()
            })
            .collect();
        let sentences: Vec<Vec<usize>> = corpus.iter().map(|s| vocab.encode(s)).collect();
        let rows = vocab.len() + buckets;
        let vectors = skipgram::train(&self.config, &vocab, &sentences, &inputs, rows);

        Ok(FastTextModel {
            vocab,
            vectors,
            dim: self.config.dimensions.max(1),
            min_n,
            max_n,
            buckets,
        })
    }

    fn embed(&self, text: &str, model: &FastTextModel) -> Result<EmbeddingVector> {
        Ok(text::tokenize(text)
            .into_iter()
            .map(|sentence| {
                sentence
                    .into_iter()
                    .map(|token| model.vector(token))
                    .collect()
            })
            .collect())
    }

    fn dimension(&self, model: &FastTextModel) -> usize {
        model.dim
    }
}

/// Bucket ids of every character n-gram of `<word>` with length in `min_n..=max_n`.
fn ngram_buckets(word: &str, min_n: usize, max_n: usize, buckets: usize) -> Vec<usize> {
    let chars: Vec<char> = format!("<{word}>").chars().collect();
    let mut out = Vec::new();
    for n in min_n..=max_n {
        if n > chars.len() {
            break;
        }
        for window in chars.windows(n) {
            let gram: String = window.iter().collect();
            out.push(fnv1a(gram.as_bytes()) as usize % buckets);
        }
    }
    out
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
