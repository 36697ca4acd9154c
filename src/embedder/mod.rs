//! Embedding backends and the uniform handle the encoder drives them through.

pub mod fasttext;
pub mod hub;
mod skipgram;
pub mod transformer;
pub mod word2vec;

use crate::config::BackendConfig;
use crate::dataset::NameTable;
use crate::embeddings::EmbeddingVector;
use crate::error::Result;
use crate::technique::EmbeddingTechnique;

pub use fasttext::{FastTextBackend, FastTextModel};
pub use transformer::{TransformerBackend, TransformerModel};
pub use word2vec::{Word2VecBackend, Word2VecModel};

/// A concrete embedding technique.
///
/// `build` is the expensive step (download, load, or train) and runs once per
/// encoder pass; `embed` is then called for every name.
pub trait Backend {
    /// Built model state.
    type Model;

    /// Prepares a model. Word-vector backends train on `table`.
    fn build(&self, table: &NameTable) -> Result<Self::Model>;

    /// Embeds `text` as token vectors grouped by sentence.
    fn embed(&self, text: &str, model: &Self::Model) -> Result<EmbeddingVector>;

    /// Length of every token vector produced by `model`.
    fn dimension(&self, model: &Self::Model) -> usize;
}

/// Object-safe handle over any built backend.
pub trait TextEmbedder {
    /// Embeds `text` as token vectors grouped by sentence.
    fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Length of every token vector.
    fn dimension(&self) -> usize;
}

struct Built<B: Backend> {
    backend: B,
    model: B::Model,
}

impl<B: Backend> TextEmbedder for Built<B> {
    fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.backend.embed(text, &self.model)
    }

    fn dimension(&self) -> usize {
        self.backend.dimension(&self.model)
    }
}

/// Builds the backend selected by `technique`.
pub fn build(
    technique: &EmbeddingTechnique,
    config: &BackendConfig,
    table: &NameTable,
) -> Result<Box<dyn TextEmbedder>> {
    match technique {
        EmbeddingTechnique::Transformer(model) => boxed(
            TransformerBackend::new(model.clone(), config.hub.clone()),
            table,
        ),
        EmbeddingTechnique::FastText => boxed(FastTextBackend::new(config.training.clone()), table),
        EmbeddingTechnique::Word2Vec => boxed(Word2VecBackend::new(config.training.clone()), table),
    }
}

fn boxed<B>(backend: B, table: &NameTable) -> Result<Box<dyn TextEmbedder>>
where
    B: Backend + 'static,
    B::Model: 'static,
{
    let model = backend.build(table)?;
    Ok(Box::new(Built { backend, model }))
}
