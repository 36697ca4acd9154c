//! Pretrained BERT-family backend running locally on candle.
//!
//! Each sentence of a name is tokenized and pushed through the encoder; the
//! last hidden state yields one vector per word piece. Special tokens
//! (`[CLS]`, `[SEP]`) are dropped from the output.

use std::fs;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{self, BertModel};
use candle_transformers::models::distilbert::{self, DistilBertModel};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::info;

use super::hub::HubClient;
use super::Backend;
use crate::config::HubConfig;
use crate::dataset::NameTable;
use crate::embeddings::EmbeddingVector;
use crate::error::{EmbedError, Result};
use crate::text;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Short technique names mapped to their hub repositories.
const KNOWN_MODELS: &[(&str, &str)] = &[
    ("bert-base-uncased", "google-bert/bert-base-uncased"),
    ("bert-base-cased", "google-bert/bert-base-cased"),
    ("bert-large-uncased", "google-bert/bert-large-uncased"),
    ("distilbert-base-uncased", "distilbert/distilbert-base-uncased"),
    ("distilbert-base-cased", "distilbert/distilbert-base-cased"),
    ("all-MiniLM-L6-v2", "sentence-transformers/all-MiniLM-L6-v2"),
];

const SUPPORTED_ARCHITECTURES: &[&str] = &["bert", "distilbert"];

/// Hub repository for a technique name; unknown names are used verbatim.
pub fn resolve_repository(model: &str) -> &str {
    KNOWN_MODELS
        .iter()
        .find(|(alias, _)| *alias == model)
        .map(|(_, repo)| *repo)
        .unwrap_or(model)
}

/// Loads a pretrained encoder identified by alias or hub id.
#[derive(Debug, Clone)]
pub struct TransformerBackend {
    model_id: String,
    hub: HubConfig,
}

impl TransformerBackend {
    /// Builds a backend for `model_id`.
    pub fn new(model_id: impl Into<String>, hub: HubConfig) -> Self {
        Self {
            model_id: model_id.into(),
            hub,
        }
    }
}

enum Network {
    Bert(BertModel),
    DistilBert(DistilBertModel),
}

impl Network {
    fn load(architecture: &str, raw_config: &str, path: &Path, vb: VarBuilder) -> Result<Self> {
        match architecture {
            "bert" => {
                let config: bert::Config = parse_json(raw_config, path)?;
                Ok(Self::Bert(BertModel::load(vb, &config)?))
            }
            "distilbert" => {
                let config: distilbert::Config = parse_json(raw_config, path)?;
                Ok(Self::DistilBert(DistilBertModel::load(vb, &config)?))
            }
            other => Err(EmbedError::Model(format!(
                "no loader for architecture `{other}`"
            ))),
        }
    }

    /// Last hidden state for a `(1, len)` batch of token ids.
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let hidden = match self {
            Self::Bert(model) => {
                let token_type_ids = input_ids.zeros_like()?;
                let attention_mask = input_ids.ones_like()?;
                model.forward(input_ids, &token_type_ids, Some(&attention_mask))?
            }
            Self::DistilBert(model) => {
                // Nonzero entries are masked out; every position attends everywhere.
                let len = input_ids.dim(1)?;
                let mask = Tensor::zeros((len, len), DType::U8, input_ids.device())?;
                model.forward(input_ids, &mask)?
            }
        };
        Ok(hidden)
    }
}

/// Loaded weights plus tokenizer.
pub struct TransformerModel {
    network: Network,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
    max_tokens: usize,
}

/// Fields of `config.json` needed before handing it to candle.
#[derive(Debug, Deserialize)]
struct ArchitectureHeader {
    #[serde(default)]
    model_type: Option<String>,
    #[serde(default)]
    hidden_size: Option<usize>,
    /// DistilBERT names its hidden size `dim`.
    #[serde(default)]
    dim: Option<usize>,
    #[serde(default = "default_max_positions")]
    max_position_embeddings: usize,
}

fn default_max_positions() -> usize {
    512
}

impl ArchitectureHeader {
    fn architecture(&self) -> &str {
        self.model_type.as_deref().unwrap_or("bert")
    }

    fn hidden_size(&self) -> Option<usize> {
        self.hidden_size.or(self.dim)
    }
}

impl Backend for TransformerBackend {
    type Model = TransformerModel;

    fn build(&self, _table: &NameTable) -> Result<TransformerModel> {
        let repo = resolve_repository(&self.model_id);
        info!(model = %self.model_id, repo, "loading pretrained transformer");
        let hub = HubClient::new(&self.hub).map_err(EmbedError::Download)?;
        let config_path = hub.fetch(repo, CONFIG_FILE).map_err(EmbedError::Download)?;
        let raw_config = fs::read_to_string(&config_path)
            .map_err(|err| EmbedError::io(&config_path, err))?;
        let header: ArchitectureHeader = parse_json(&raw_config, &config_path)?;
        let architecture = header.architecture();
        if !SUPPORTED_ARCHITECTURES.contains(&architecture) {
            return Err(EmbedError::unsupported_embedding(format!(
                "{} (architecture `{architecture}`)",
                self.model_id
            )));
        }

        let tokenizer_path = hub.fetch(repo, TOKENIZER_FILE).map_err(EmbedError::Download)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| EmbedError::Model(format!("failed to load tokenizer: {err}")))?;

        let weights_path = hub.fetch(repo, WEIGHTS_FILE).map_err(EmbedError::Download)?;
        let weights =
            fs::read(&weights_path).map_err(|err| EmbedError::io(&weights_path, err))?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, &Device::Cpu)?;
        let model = TransformerModel::load(&header, &raw_config, &config_path, tokenizer, vb)?;
        info!(
            model = %self.model_id,
            architecture,
            hidden_size = model.hidden_size,
            "transformer ready"
        );
        Ok(model)
    }

    fn embed(&self, text: &str, model: &TransformerModel) -> Result<EmbeddingVector> {
        text::sentences(text)
            .into_iter()
            .map(|sentence| model.embed_sentence(sentence))
            .collect()
    }

    fn dimension(&self, model: &TransformerModel) -> usize {
        model.hidden_size
    }
}

impl TransformerModel {
    fn load(
        header: &ArchitectureHeader,
        raw_config: &str,
        config_path: &Path,
        tokenizer: Tokenizer,
        vb: VarBuilder,
    ) -> Result<Self> {
        let hidden_size = header.hidden_size().ok_or_else(|| {
            EmbedError::Model(format!("{config_path:?} declares no hidden size"))
        })?;
        let device = vb.device().clone();
        let network = Network::load(header.architecture(), raw_config, config_path, vb)?;
        Ok(Self {
            network,
            tokenizer,
            device,
            hidden_size,
            max_tokens: header.max_position_embeddings,
        })
    }

    fn embed_sentence(&self, sentence: &str) -> Result<Vec<Vec<f32>>> {
        let encoding = self
            .tokenizer
            .encode(sentence, true)
            .map_err(|err| EmbedError::Model(format!("failed to tokenize {sentence:?}: {err}")))?;
        let len = encoding.get_ids().len().min(self.max_tokens);
        let ids = &encoding.get_ids()[..len];
        let special = &encoding.get_special_tokens_mask()[..len];

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let hidden = self.network.forward(&input_ids)?;
        let rows: Vec<Vec<f32>> = hidden.squeeze(0)?.to_dtype(DType::F32)?.to_vec2()?;

        Ok(rows
            .into_iter()
            .zip(special)
            .filter(|(_, mask)| **mask == 0)
            .map(|(row, _)| row)
            .collect())
    }
}

fn parse_json<T: DeserializeOwned>(raw: &str, path: &Path) -> Result<T> {
    serde_json::from_str(raw).map_err(|source| EmbedError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BERT_CONFIG: &str = r#"{
        "model_type": "bert",
        "vocab_size": 8,
        "hidden_size": 8,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 16,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0,
        "max_position_embeddings": 16,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0
    }"#;

    const DISTILBERT_CONFIG: &str = r#"{
        "model_type": "distilbert",
        "vocab_size": 8,
        "dim": 8,
        "n_layers": 1,
        "n_heads": 2,
        "hidden_dim": 16,
        "activation": "gelu",
        "max_position_embeddings": 16,
        "initializer_range": 0.02,
        "pad_token_id": 0
    }"#;

    const TOKENIZER: &str = r###"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": {"type": "BertPreTokenizer"},
        "post_processor": {
            "type": "BertProcessing",
            "sep": ["[SEP]", 3],
            "cls": ["[CLS]", 2]
        },
        "decoder": null,
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": {
                "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
                "car": 4, "wheel": 5, "bike": 6, ".": 7
            }
        }
    }"###;

    fn tiny_model(raw_config: &str) -> TransformerModel {
        let path = Path::new(CONFIG_FILE);
        let header: ArchitectureHeader = parse_json(raw_config, path).unwrap();
        let tokenizer = Tokenizer::from_bytes(TOKENIZER.as_bytes()).unwrap();
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        TransformerModel::load(&header, raw_config, path, tokenizer, vb).unwrap()
    }

    fn backend() -> TransformerBackend {
        TransformerBackend::new("tiny", HubConfig::default())
    }

    #[test]
    fn known_aliases_resolve_to_repositories() {
        assert_eq!(
            resolve_repository("bert-base-uncased"),
            "google-bert/bert-base-uncased"
        );
        assert_eq!(
            resolve_repository("all-MiniLM-L6-v2"),
            "sentence-transformers/all-MiniLM-L6-v2"
        );
        assert_eq!(
            resolve_repository("distilbert-base-uncased"),
            "distilbert/distilbert-base-uncased"
        );
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(
            resolve_repository("EleutherAI/gpt-neo-1.3B"),
            "EleutherAI/gpt-neo-1.3B"
        );
    }

    #[test]
    fn header_reads_architecture_and_defaults() {
        let header: ArchitectureHeader = parse_json(
            r#"{"model_type": "gpt_neo", "hidden_size": 2048}"#,
            Path::new("config.json"),
        )
        .unwrap();
        assert_eq!(header.architecture(), "gpt_neo");
        assert_eq!(header.hidden_size(), Some(2048));
        assert_eq!(header.max_position_embeddings, 512);

        let distil: ArchitectureHeader =
            parse_json(DISTILBERT_CONFIG, Path::new("config.json")).unwrap();
        assert_eq!(distil.hidden_size(), Some(8));
    }

    #[test]
    fn sentences_keep_their_tokens_without_specials() {
        let model = tiny_model(BERT_CONFIG);
        let embedding = backend().embed("car wheel. bike", &model).unwrap();

        let tokens: Vec<usize> = embedding.iter().map(Vec::len).collect();
        assert_eq!(tokens, vec![3, 1]);
        assert!(embedding.iter().flatten().all(|vector| vector.len() == 8));
        assert_eq!(backend().dimension(&model), 8);
    }

    #[test]
    fn long_inputs_are_truncated_to_the_position_limit() {
        let mut model = tiny_model(BERT_CONFIG);
        model.max_tokens = 3;
        // [CLS] car wheel | bike [SEP]
        let embedding = backend().embed("car wheel bike", &model).unwrap();
        assert_eq!(embedding.len(), 1);
        assert_eq!(embedding[0].len(), 2);
    }

    #[test]
    fn distilbert_embeds_per_token() {
        let model = tiny_model(DISTILBERT_CONFIG);
        let embedding = backend().embed("bike. car wheel", &model).unwrap();
        let tokens: Vec<usize> = embedding.iter().map(Vec::len).collect();
        assert_eq!(tokens, vec![2, 2]);
        assert!(embedding.iter().flatten().all(|vector| vector.len() == 8));
    }

    #[test]
    fn non_bert_architectures_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("EleutherAI--gpt-neo-1.3B").join("main");
        fs::create_dir_all(&repo_dir).unwrap();
        fs::write(
            repo_dir.join(CONFIG_FILE),
            r#"{"model_type": "gpt_neo", "hidden_size": 2048}"#,
        )
        .unwrap();

        let backend = TransformerBackend::new(
            "EleutherAI/gpt-neo-1.3B",
            HubConfig {
                cache_dir: dir.path().to_path_buf(),
                ..HubConfig::default()
            },
        );
        let err = match backend.build(&NameTable::default()) {
            Ok(_) => panic!("gpt-neo should be rejected"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            EmbedError::UnsupportedTechnique {
                kind: "embedding",
                ..
            }
        ));
    }
}
