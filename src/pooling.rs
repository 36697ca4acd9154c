//! Reduction of per-token embeddings into fixed-length feature vectors.
//!
//! Single-sentence embeddings reduce their token vectors dimension by
//! dimension. Multi-sentence embeddings reduce in two stages: each sentence
//! first, then the resulting sentence vectors, using the same operator.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::embeddings::{EmbeddingTable, EmbeddingVector, PooledRecord, PooledTable};
use crate::error::{EmbedError, Result};

/// Element-wise reduction operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingTechnique {
    /// Element-wise maximum.
    Max,
    /// Element-wise minimum.
    Min,
    /// Arithmetic mean.
    Average,
}

impl PoolingTechnique {
    /// Lowercase keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Min => "min",
            Self::Average => "average",
        }
    }

    fn combine(&self, acc: f64, value: f64) -> f64 {
        match self {
            Self::Max => acc.max(value),
            Self::Min => acc.min(value),
            Self::Average => acc + value,
        }
    }
}

impl fmt::Display for PoolingTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolingTechnique {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "average" => Ok(Self::Average),
            other => Err(EmbedError::unsupported_pooling(other)),
        }
    }
}

/// Parses `technique` and pools every record of `table`.
///
/// The technique is validated before any record is read, and the input table
/// is only borrowed, so a rejected technique leaves it untouched.
pub fn apply_pooling(technique: &str, table: &EmbeddingTable) -> Result<PooledTable> {
    let technique = technique.parse::<PoolingTechnique>()?;
    pool_table(table, technique)
}

/// Pools every record of `table` with `technique`.
pub fn pool_table(table: &EmbeddingTable, technique: PoolingTechnique) -> Result<PooledTable> {
    info!(
        technique = %table.technique,
        pooling = %technique,
        records = table.len(),
        "applying pooling"
    );
    let records = table
        .records
        .iter()
        .map(|record| {
            Ok(PooledRecord {
                name: record.name.clone(),
                kind: record.kind,
                embedding: pool_vector(&record.name, &record.embedding, technique)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PooledTable {
        technique: table.technique.clone(),
        pooling: technique.as_str().to_string(),
        records,
    })
}

/// Reduces one embedding to a single vector.
///
/// `name` only labels errors. Embeddings without sentences, sentences without
/// tokens, and zero-length token vectors all fail with [`EmbedError::EmptyVector`].
pub fn pool_vector(
    name: &str,
    embedding: &EmbeddingVector,
    technique: PoolingTechnique,
) -> Result<Vec<f32>> {
    match embedding.as_slice() {
        [] => Err(EmbedError::EmptyVector {
            name: name.to_string(),
        }),
        [sentence] => reduce(name, sentence, technique),
        sentences => {
            let per_sentence = sentences
                .iter()
                .map(|sentence| reduce(name, sentence, technique))
                .collect::<Result<Vec<_>>>()?;
            reduce(name, &per_sentence, technique)
        }
    }
}

fn reduce(name: &str, vectors: &[Vec<f32>], technique: PoolingTechnique) -> Result<Vec<f32>> {
    let empty = || EmbedError::EmptyVector {
        name: name.to_string(),
    };
    let first = vectors.first().ok_or_else(empty)?;
    if first.is_empty() {
        return Err(empty());
    }

    let mut acc: Vec<f64> = first.iter().map(|&value| f64::from(value)).collect();
    for vector in &vectors[1..] {
        if vector.len() != acc.len() {
            return Err(EmbedError::DimensionMismatch {
                name: name.to_string(),
                expected: acc.len(),
                actual: vector.len(),
            });
        }
        for (slot, &value) in acc.iter_mut().zip(vector) {
            *slot = technique.combine(*slot, f64::from(value));
        }
    }

    if technique == PoolingTechnique::Average {
        let count = vectors.len() as f64;
        acc.iter_mut().for_each(|slot| *slot /= count);
    }
    Ok(acc.into_iter().map(|value| value as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::NameKind;
    use crate::embeddings::EmbeddedRecord;
    use pretty_assertions::assert_eq;

    fn table(records: Vec<(&str, EmbeddingVector)>) -> EmbeddingTable {
        EmbeddingTable {
            technique: "word2vec".to_string(),
            checksum: 0,
            records: records
                .into_iter()
                .map(|(name, embedding)| EmbeddedRecord {
                    name: name.to_string(),
                    kind: NameKind::Class,
                    embedding,
                })
                .collect(),
        }
    }

    #[test]
    fn max_over_single_sentence() {
        let embedding = vec![vec![vec![1.0, 5.0], vec![3.0, 2.0]]];
        let pooled = pool_vector("Car", &embedding, PoolingTechnique::Max).unwrap();
        assert_eq!(pooled, vec![3.0, 5.0]);
    }

    #[test]
    fn min_and_average_over_single_sentence() {
        let embedding = vec![vec![vec![1.0, 5.0], vec![3.0, 2.0]]];
        assert_eq!(
            pool_vector("Car", &embedding, PoolingTechnique::Min).unwrap(),
            vec![1.0, 2.0]
        );
        assert_eq!(
            pool_vector("Car", &embedding, PoolingTechnique::Average).unwrap(),
            vec![2.0, 3.5]
        );
    }

    #[test]
    fn multi_sentence_average_is_two_stage() {
        // Sentence means are [2.0] and [5.0]; a flat mean would give 3.0.
        let embedding = vec![vec![vec![1.0], vec![3.0]], vec![vec![5.0]]];
        let pooled = pool_vector("Car", &embedding, PoolingTechnique::Average).unwrap();
        assert_eq!(pooled, vec![3.5]);
    }

    #[test]
    fn multi_sentence_max() {
        let embedding = vec![
            vec![vec![1.0, -4.0], vec![0.5, 2.0]],
            vec![vec![-1.0, 7.0]],
        ];
        let pooled = pool_vector("Car", &embedding, PoolingTechnique::Max).unwrap();
        assert_eq!(pooled, vec![1.0, 7.0]);
    }

    #[test]
    fn empty_embeddings_are_rejected() {
        for embedding in [vec![], vec![vec![]], vec![vec![vec![]]]] {
            let err = pool_vector("Ghost", &embedding, PoolingTechnique::Max).unwrap_err();
            assert!(matches!(err, EmbedError::EmptyVector { ref name } if name == "Ghost"));
        }
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let embedding = vec![vec![vec![1.0, 2.0], vec![3.0]]];
        let err = pool_vector("Car", &embedding, PoolingTechnique::Min).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn unknown_technique_leaves_table_untouched() {
        let input = table(vec![("Car", vec![vec![vec![1.0, 5.0]]])]);
        let before = input.clone();
        let err = apply_pooling("median", &input).unwrap_err();
        assert!(matches!(err, EmbedError::UnsupportedTechnique { kind: "pooling", .. }));
        assert_eq!(input, before);
    }

    #[test]
    fn pools_whole_table_deterministically() {
        let input = table(vec![
            ("Bike", vec![vec![vec![1.0, 5.0], vec![3.0, 2.0]]]),
            ("Car", vec![vec![vec![0.0, 1.0]], vec![vec![2.0, 3.0]]]),
        ]);
        let first = apply_pooling("average", &input).unwrap();
        let second = apply_pooling("average", &input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.pooling, "average");
        assert_eq!(first.records[0].embedding, vec![2.0, 3.5]);
        assert_eq!(first.records[1].embedding, vec![1.0, 2.0]);
    }
}
