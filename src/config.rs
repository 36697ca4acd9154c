//! Pipeline configuration and the command-line surface that fills it.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cache::CachePolicy;

/// Hyperparameters for the word-vector backends trained on the loaded names.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingConfig {
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Maximum distance between a center token and its context tokens.
    pub window: usize,
    /// Negative samples drawn per positive pair.
    pub negative: usize,
    /// Passes over the corpus.
    pub epochs: usize,
    /// Initial learning rate, decayed linearly towards `min_learning_rate`.
    pub learning_rate: f32,
    /// Floor for the decayed learning rate.
    pub min_learning_rate: f32,
    /// Tokens seen fewer times are dropped from the vocabulary.
    pub min_count: u64,
    /// Seed for initialization and sampling.
    pub seed: u64,
    /// Shortest character n-gram (FastText only).
    pub min_n: usize,
    /// Longest character n-gram (FastText only).
    pub max_n: usize,
    /// Hash buckets shared by all character n-grams (FastText only).
    pub buckets: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dimensions: 400,
            window: 5,
            negative: 5,
            epochs: 5,
            learning_rate: 0.025,
            min_learning_rate: 0.0001,
            min_count: 1,
            seed: 1,
            min_n: 3,
            max_n: 6,
            buckets: 50_000,
        }
    }
}

/// Where and how pretrained transformer artifacts are fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct HubConfig {
    /// Base URL of the model hub.
    pub base_url: String,
    /// Revision (branch, tag, or commit) to resolve files against.
    pub revision: String,
    /// Local directory that keeps downloaded artifacts between runs.
    pub cache_dir: PathBuf,
    /// Optional bearer token for gated repositories.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per file before giving up.
    pub max_retries: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co".to_string(),
            revision: "main".to_string(),
            cache_dir: PathBuf::from("models"),
            token: None,
            timeout: Duration::from_secs(300),
            max_retries: 5,
        }
    }
}

/// Settings consumed while building a backend model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendConfig {
    /// Transformer download settings.
    pub hub: HubConfig,
    /// Word-vector training settings.
    pub training: TrainingConfig,
}

/// Settings for one encoder instance.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderConfig {
    /// Backend construction settings.
    pub backend: BackendConfig,
    /// Behavior when a cached artifact was computed from a different table.
    pub policy: CachePolicy,
    /// Write freshly computed tables to the cache.
    pub persist: bool,
    /// Log a progress line every N embedded names (0 disables).
    pub progress_every: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            policy: CachePolicy::ReadThrough,
            persist: true,
            progress_every: 500,
        }
    }
}

/// Command-line interface for the embedding pipeline.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "uml-embed",
    about = "Embed UML class and attribute names and cache the results"
)]
pub struct Cli {
    /// Dataset identifier (`lindholmen` or `genmymodel`)
    #[arg(long, env = "UML_EMBED_DATASET", default_value = "genmymodel")]
    pub dataset: String,

    /// Directory holding the annotated metadata dumps
    #[arg(long, env = "UML_EMBED_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Optional explicit metadata file, overriding the dataset default
    #[arg(long, env = "UML_EMBED_INPUT")]
    pub input: Option<PathBuf>,

    /// Root directory for cached embeddings (one subdirectory per dataset)
    #[arg(long, env = "UML_EMBED_CACHE_ROOT", default_value = "embeddings")]
    pub embeddings_root: PathBuf,

    /// Embedding technique: `fasttext`, `word2vec`, or a transformer model id
    #[arg(long, env = "UML_EMBED_TECHNIQUE", default_value = "bert-base-uncased")]
    pub technique: String,

    /// Optional pooling technique (`max`, `min`, `average`)
    #[arg(long, env = "UML_EMBED_POOLING")]
    pub pooling: Option<String>,

    /// JSONL destination for pooled records
    #[arg(long, env = "UML_EMBED_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Skip writing freshly computed embeddings to the cache
    #[arg(long, default_value_t = false)]
    pub no_persist: bool,

    /// What to do when a cached artifact was built from a different table
    #[arg(long, env = "UML_EMBED_CACHE_POLICY", value_enum, default_value = "read-through")]
    pub cache_policy: CachePolicy,

    /// Log a progress line every N names (0 disables)
    #[arg(long, default_value_t = 500)]
    pub progress_every: usize,

    /// Directory for downloaded transformer artifacts
    #[arg(long, env = "UML_EMBED_MODEL_DIR", default_value = "models")]
    pub model_dir: PathBuf,

    /// Model hub base URL
    #[arg(long, env = "UML_EMBED_HUB_URL", default_value = "https://huggingface.co")]
    pub hub_url: String,

    /// Hub revision to download
    #[arg(long, env = "UML_EMBED_HUB_REVISION", default_value = "main")]
    pub hub_revision: String,

    /// Access token for gated hub repositories
    #[arg(long, env = "HF_TOKEN")]
    pub hub_token: Option<String>,

    /// Max seconds to wait for each download request
    #[arg(long, env = "UML_EMBED_HUB_TIMEOUT_SECS", default_value_t = 300)]
    pub hub_timeout_secs: u64,

    /// Attempts per file for transient download failures
    #[arg(long, env = "UML_EMBED_HUB_MAX_RETRIES", default_value_t = 5)]
    pub hub_max_retries: usize,

    /// Word-vector dimensionality
    #[arg(long, default_value_t = 400)]
    pub dimensions: usize,

    /// Word-vector context window
    #[arg(long, default_value_t = 5)]
    pub window: usize,

    /// Word-vector training epochs
    #[arg(long, default_value_t = 5)]
    pub epochs: usize,

    /// Word-vector negative samples per pair
    #[arg(long, default_value_t = 5)]
    pub negative: usize,

    /// Seed for word-vector training
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// FastText n-gram hash buckets
    #[arg(long, default_value_t = 50_000)]
    pub buckets: usize,
}

impl Cli {
    /// Converts the parsed CLI into an `EncoderConfig`.
    pub fn build_config(&self) -> EncoderConfig {
        let training = TrainingConfig {
            dimensions: self.dimensions.max(1),
            window: self.window.max(1),
            epochs: self.epochs.max(1),
            negative: self.negative,
            seed: self.seed,
            buckets: self.buckets.max(1),
            ..TrainingConfig::default()
        };
        let hub = HubConfig {
            base_url: self.hub_url.clone(),
            revision: self.hub_revision.clone(),
            cache_dir: self.model_dir.clone(),
            token: self.hub_token.clone().filter(|token| !token.trim().is_empty()),
            timeout: Duration::from_secs(self.hub_timeout_secs.max(1)),
            max_retries: self.hub_max_retries.max(1),
        };
        EncoderConfig {
            backend: BackendConfig { hub, training },
            policy: self.cache_policy,
            persist: !self.no_persist,
            progress_every: self.progress_every,
        }
    }
}
