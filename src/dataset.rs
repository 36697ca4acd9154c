//! UML metadata loading: English filtering, flattening, and deduplication.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{EmbedError, Result};

const LANGUAGE_LABEL_PREFIX: &str = "__label__";
const ENGLISH: &str = "en";

/// Known UML metadata corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetId {
    /// Lindholmen UML models mined from GitHub.
    Lindholmen,
    /// Models exported from the GenMyModel online editor.
    GenMyModel,
}

impl DatasetId {
    /// Identifier used on the command line and in cache paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lindholmen => "lindholmen",
            Self::GenMyModel => "genmymodel",
        }
    }

    /// File name of the annotated metadata dump for this corpus.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Lindholmen => "uml_extracted_metadata_annotated.json",
            Self::GenMyModel => "genmymodel_uml_extracted_metadata_annotated.json",
        }
    }

    /// Full path of the metadata dump inside `data_dir`.
    pub fn data_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.file_name())
    }

    /// Cache root for this corpus inside `embeddings_root`.
    pub fn cache_root(&self, embeddings_root: &Path) -> PathBuf {
        embeddings_root.join(self.as_str())
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "lindholmen" => Ok(Self::Lindholmen),
            "genmymodel" => Ok(Self::GenMyModel),
            other => Err(EmbedError::Configuration(format!(
                "dataset `{other}` is not supported; use `lindholmen` or `genmymodel`"
            ))),
        }
    }
}

/// Origin of a name inside a UML model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    /// Class name.
    Class,
    /// Attribute name.
    Attribute,
}

impl NameKind {
    /// Lowercase tag written to outputs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Attribute => "attribute",
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single class or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    /// Name as written in the model.
    pub name: String,
    /// Whether the name came from a class or an attribute.
    pub kind: NameKind,
}

impl NameRecord {
    /// Builds a new record.
    pub fn new(name: impl Into<String>, kind: NameKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered, deduplicated table of names: sorted classes, then sorted attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    records: Vec<NameRecord>,
}

impl NameTable {
    /// Builds a table from independent class and attribute name sets.
    pub fn from_sets(classes: BTreeSet<String>, attributes: BTreeSet<String>) -> Self {
        let records = classes
            .into_iter()
            .map(|name| NameRecord::new(name, NameKind::Class))
            .chain(
                attributes
                    .into_iter()
                    .map(|name| NameRecord::new(name, NameKind::Attribute)),
            )
            .collect();
        Self { records }
    }

    /// Builds a table from metadata documents already parsed from JSON.
    pub fn from_documents(documents: &BTreeMap<String, DocumentMetadata>) -> Self {
        let mut classes = BTreeSet::new();
        let mut attributes = BTreeSet::new();
        for document in documents.values().filter(|doc| doc.is_english()) {
            classes.extend(document.classes.iter().cloned());
            attributes.extend(document.attributes.iter().cloned());
        }
        Self::from_sets(classes, attributes)
    }

    /// Records in table order.
    pub fn records(&self) -> &[NameRecord] {
        &self.records
    }

    /// Iterator over the raw names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name.as_str())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no names were loaded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// CRC32 over every (kind, name) pair in order.
    ///
    /// Stored next to cached embeddings so a changed table can be detected.
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for record in &self.records {
            hasher.update(record.kind.as_str().as_bytes());
            hasher.update(&[0]);
            hasher.update(record.name.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }
}

/// Per-document metadata as stored in the annotated dump.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentMetadata {
    /// Language tag, either bare (`en`) or fastText style (`__label__en`).
    #[serde(default)]
    pub lang: String,
    /// Class names found in the document.
    #[serde(default)]
    pub classes: Vec<String>,
    /// Attribute names found in the document.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl DocumentMetadata {
    /// True when the language tag marks the document as English.
    pub fn is_english(&self) -> bool {
        is_english_tag(&self.lang)
    }
}

fn is_english_tag(tag: &str) -> bool {
    let tag = tag.trim();
    tag.strip_prefix(LANGUAGE_LABEL_PREFIX).unwrap_or(tag) == ENGLISH
}

/// Parses the annotated metadata dump at `path` into a name table.
///
/// Only the `lang` tag of non-English documents is read, so their payloads
/// may hold anything.
pub fn load_table(path: &Path) -> Result<NameTable> {
    let json_error = |source: serde_json::Error| EmbedError::Json {
        path: path.to_path_buf(),
        source,
    };
    let raw = fs::read_to_string(path).map_err(|err| EmbedError::io(path, err))?;
    let documents: BTreeMap<String, Value> = serde_json::from_str(&raw).map_err(json_error)?;
    let total = documents.len();

    let mut english = BTreeMap::new();
    for (id, document) in documents {
        let lang = document.get("lang").and_then(Value::as_str).unwrap_or_default();
        if !is_english_tag(lang) {
            continue;
        }
        let metadata: DocumentMetadata = serde_json::from_value(document).map_err(json_error)?;
        english.insert(id, metadata);
    }

    let table = NameTable::from_documents(&english);
    info!(
        path = %path.display(),
        documents = total,
        english = english.len(),
        records = table.len(),
        "loaded name table"
    );
    Ok(table)
}
