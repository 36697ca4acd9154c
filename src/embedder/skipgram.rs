//! Skip-gram with negative sampling, shared by the word2vec and FastText backends.
//!
//! Every vocabulary word maps to one or more rows of the input matrix. Word2vec
//! uses a single row per word; FastText adds hashed character n-gram rows. The
//! hidden representation of a word is the mean of its rows, and gradients are
//! spread evenly back over them.

use std::collections::HashMap;

use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::TrainingConfig;
use crate::dataset::NameTable;
use crate::text;

const MAX_EXP: f32 = 6.0;

/// Token counts and dense indices, ordered by descending frequency.
#[derive(Debug, Clone, Default)]
pub(crate) struct Vocabulary {
    index: HashMap<String, usize>,
    words: Vec<String>,
    counts: Vec<u64>,
}

impl Vocabulary {
    /// Counts tokens across `sentences`, keeping those seen at least `min_count` times.
    pub(crate) fn build(sentences: &[Vec<String>], min_count: u64) -> Self {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for token in sentences.iter().flatten() {
            *counts.entry(token.as_str()).or_default() += 1;
        }
        let mut entries: Vec<(&str, u64)> = counts
            .into_iter()
            .filter(|&(_, count)| count >= min_count.max(1))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut vocab = Self::default();
        for (idx, (word, count)) in entries.into_iter().enumerate() {
            vocab.index.insert(word.to_string(), idx);
            vocab.words.push(word.to_string());
            vocab.counts.push(count);
        }
        vocab
    }

    pub(crate) fn get(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub(crate) fn words(&self) -> &[String] {
        &self.words
    }

    pub(crate) fn len(&self) -> usize {
        self.words.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Maps a sentence to vocabulary indices, dropping pruned tokens.
    pub(crate) fn encode(&self, sentence: &[String]) -> Vec<usize> {
        sentence.iter().filter_map(|token| self.get(token)).collect()
    }
}

/// One training sentence per name: every token of the name, across sentences.
pub(crate) fn corpus(table: &NameTable) -> Vec<Vec<String>> {
    table
        .names()
        .map(|name| {
            text::tokenize(name)
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect()
        })
        .collect()
}

/// Trains the input matrix and returns it as `rows * dimensions` floats.
///
/// `inputs[w]` lists the input rows that make up vocabulary word `w`.
pub(crate) fn train(
    config: &TrainingConfig,
    vocab: &Vocabulary,
    sentences: &[Vec<usize>],
    inputs: &[Vec<usize>],
    rows: usize,
) -> Vec<f32> {
    let dim = config.dimensions.max(1);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let bound = 0.5 / dim as f32;
    let init = Uniform::new_inclusive(-bound, bound);
    let mut input: Vec<f32> = (0..rows * dim).map(|_| init.sample(&mut rng)).collect();

    if vocab.is_empty() || config.epochs == 0 {
        return input;
    }

    let mut output = vec![0.0f32; vocab.len() * dim];
    let noise = noise_distribution(vocab);
    let total_words = sentences.iter().map(Vec::len).sum::<usize>() * config.epochs;
    let mut processed = 0usize;
    let mut hidden = vec![0.0f32; dim];
    let mut grad = vec![0.0f32; dim];

    for epoch in 0..config.epochs {
        for sentence in sentences {
            for (pos, &center) in sentence.iter().enumerate() {
                let progress = processed as f32 / total_words.max(1) as f32;
                let alpha = (config.learning_rate * (1.0 - progress)).max(config.min_learning_rate);
                processed += 1;

                let reduced = rng.gen_range(0..config.window.max(1));
                let span = config.window.max(1) - reduced;
                let start = pos.saturating_sub(span);
                let end = (pos + span + 1).min(sentence.len());

                for (ctx_pos, &context) in sentence.iter().enumerate().take(end).skip(start) {
                    if ctx_pos == pos {
                        continue;
                    }
                    let rows_for_center = &inputs[center];
                    average_rows(&input, rows_for_center, dim, &mut hidden);
                    grad.iter_mut().for_each(|g| *g = 0.0);

                    update_output(&mut output, context, 1.0, alpha, dim, &hidden, &mut grad);
                    if let Some(noise) = &noise {
                        for _ in 0..config.negative {
                            let target = noise.sample(&mut rng);
                            if target == context {
                                continue;
                            }
                            update_output(&mut output, target, 0.0, alpha, dim, &hidden, &mut grad);
                        }
                    }

                    let share = 1.0 / rows_for_center.len() as f32;
                    for &row in rows_for_center {
                        let slot = &mut input[row * dim..(row + 1) * dim];
                        for (value, g) in slot.iter_mut().zip(&grad) {
                            *value += g * share;
                        }
                    }
                }
            }
        }
        debug!(epoch, words = processed, "finished skip-gram epoch");
    }
    input
}

/// Writes the mean of `rows` into `out`.
pub(crate) fn average_rows(matrix: &[f32], rows: &[usize], dim: usize, out: &mut [f32]) {
    out.iter_mut().for_each(|value| *value = 0.0);
    if rows.is_empty() {
        return;
    }
    for &row in rows {
        for (acc, value) in out.iter_mut().zip(&matrix[row * dim..(row + 1) * dim]) {
            *acc += value;
        }
    }
    let scale = 1.0 / rows.len() as f32;
    out.iter_mut().for_each(|value| *value *= scale);
}

fn update_output(
    output: &mut [f32],
    target: usize,
    label: f32,
    alpha: f32,
    dim: usize,
    hidden: &[f32],
    grad: &mut [f32],
) {
    let slot = &mut output[target * dim..(target + 1) * dim];
    let dot: f32 = hidden.iter().zip(slot.iter()).map(|(h, o)| h * o).sum();
    let g = (label - sigmoid(dot)) * alpha;
    for ((acc, o), h) in grad.iter_mut().zip(slot.iter_mut()).zip(hidden) {
        *acc += g * *o;
        *o += g * h;
    }
}

fn sigmoid(x: f32) -> f32 {
    if x > MAX_EXP {
        1.0
    } else if x < -MAX_EXP {
        0.0
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

/// Unigram distribution raised to the 3/4 power.
fn noise_distribution(vocab: &Vocabulary) -> Option<WeightedIndex<f64>> {
    let weights: Vec<f64> = vocab
        .counts
        .iter()
        .map(|&count| (count as f64).powf(0.75))
        .collect();
    WeightedIndex::new(weights).ok()
}
