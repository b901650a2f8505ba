//! Text → sparse TF-IDF vectors.
//!
//! Extraction runs in two explicit passes over the corpus:
//! 1. count: tokenize, drop stopwords, hash tokens into feature indices,
//!    accumulate term frequencies and document frequencies;
//! 2. weight: apply \(\mathrm{tf} \cdot \ln\frac{N+1}{\mathrm{df}+1}\) and L2-normalize.
//!
//! Feature hashing maps tokens into a fixed `dimension` with a stable FNV-1a
//! hash; collisions are accepted.

use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::sync::OnceLock;

use rayon::prelude::*;
use serde::Serialize;

use crate::item::Item;

/// Tokens shorter than this (in characters) are discarded.
pub const MIN_TOKEN_CHARS: usize = 2;

/// A stable 64-bit FNV-1a hasher.
///
/// `std`'s `DefaultHasher` makes no stability promise across releases, and
/// feature indices must not drift between runs.
struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    fn new() -> Self {
        Self {
            state: 0xcbf29ce484222325,
        }
    }
}

impl Hasher for Fnv1a64 {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        const PRIME: u64 = 0x00000100000001B3;
        for &b in bytes {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(PRIME);
        }
    }
}

/// Maps tokens to indices in `[0, dimension)`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureHasher {
    dimension: usize,
}

impl FeatureHasher {
    /// Create a hasher for the given feature-space width (must be >= 1).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Feature index of `token`.
    pub fn index(&self, token: &str) -> u32 {
        let mut hasher = Fnv1a64::new();
        hasher.write(token.as_bytes());
        (hasher.finish() % self.dimension as u64) as u32
    }

    /// Feature-space width.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A sparse vector with strictly increasing indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Build from `(index, value)` pairs. Pairs are sorted, duplicate indices
    /// summed, and zeros dropped.
    pub fn from_pairs(mut pairs: Vec<(u32, f64)>) -> Self {
        pairs.sort_unstable_by_key(|&(i, _)| i);
        let mut indices = Vec::with_capacity(pairs.len());
        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
        for (i, v) in pairs {
            if indices.last() == Some(&i) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                indices.push(i);
                values.push(v);
            }
        }
        let mut out = Self { indices, values };
        out.retain_nonzero();
        out
    }

    /// Non-zero entries as `(index, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// True if every entry is zero.
    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Scale to unit Euclidean norm. The zero vector is left unchanged.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }

    /// Dot product by merging the two index lists.
    pub fn dot(&self, other: &Self) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    fn retain_nonzero(&mut self) {
        if self.values.iter().all(|&v| v != 0.0) {
            return;
        }
        let (indices, values): (Vec<u32>, Vec<f64>) =
            self.iter().filter(|&(_, v)| v != 0.0).unzip();
        self.indices = indices;
        self.values = values;
    }
}

/// Lowercase `text` and split it on runs of non-word characters.
///
/// Word characters are Unicode alphanumerics and `_`. Tokens shorter than
/// [`MIN_TOKEN_CHARS`] are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// True if `token` (lowercase) is in the default stopword set.
pub fn is_stopword(token: &str) -> bool {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
        .contains(token)
}

/// Tokenize and drop stopwords.
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Term counts per feature index, sorted by index.
pub fn term_frequencies(tokens: &[String], hasher: &FeatureHasher) -> Vec<(u32, u32)> {
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for token in tokens {
        *counts.entry(hasher.index(token)).or_insert(0) += 1;
    }
    let mut tf: Vec<(u32, u32)> = counts.into_iter().collect();
    tf.sort_unstable_by_key(|&(i, _)| i);
    tf
}

/// Number of documents each feature index appears in.
#[derive(Debug, Clone, Default)]
pub struct DocumentFrequencies {
    num_docs: usize,
    counts: HashMap<u32, u32>,
}

impl DocumentFrequencies {
    /// Count over a corpus of term-frequency vectors.
    ///
    /// Per-worker maps are merged by addition, so the result does not depend
    /// on how rayon splits the input.
    pub fn count(tfs: &[Vec<(u32, u32)>]) -> Self {
        let counts = tfs
            .par_iter()
            .fold(HashMap::new, |mut acc: HashMap<u32, u32>, tf| {
                for &(index, _) in tf {
                    *acc.entry(index).or_insert(0) += 1;
                }
                acc
            })
            .reduce(HashMap::new, merge_counts);
        Self {
            num_docs: tfs.len(),
            counts,
        }
    }

    /// Documents counted.
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Document frequency of `index`.
    pub fn df(&self, index: u32) -> u32 {
        self.counts.get(&index).copied().unwrap_or(0)
    }

    /// \(\ln\frac{N+1}{\mathrm{df}+1}\), or 0 when `df < min_doc_freq`.
    pub fn idf(&self, index: u32, min_doc_freq: usize) -> f64 {
        let df = self.df(index);
        if (df as usize) < min_doc_freq {
            return 0.0;
        }
        ((self.num_docs as f64 + 1.0) / (df as f64 + 1.0)).ln()
    }
}

fn merge_counts(mut a: HashMap<u32, u32>, b: HashMap<u32, u32>) -> HashMap<u32, u32> {
    if a.len() < b.len() {
        return merge_counts(b, a);
    }
    for (k, v) in b {
        *a.entry(k).or_insert(0) += v;
    }
    a
}

/// Counters from [`extract_features`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    /// Items entering extraction.
    pub input: usize,
    /// Dropped for having fewer than `min_tokens` content tokens.
    pub too_few_tokens: usize,
    /// Kept, but every weight came out zero.
    pub zero_vectors: usize,
    /// Items with a feature vector.
    pub kept: usize,
}

/// Items that passed extraction, with their vectors (same order, same length).
#[derive(Debug, Clone, Default)]
pub struct Featurized {
    /// Surviving items, still in ascending id order.
    pub items: Vec<Item>,
    /// L2-normalized TF-IDF vector per item. May be the zero vector.
    pub vectors: Vec<SparseVector>,
    /// Extraction counters.
    pub stats: ExtractionStats,
}

/// Turn cleaned items into normalized TF-IDF vectors.
///
/// Items with fewer than `min_tokens` content tokens are removed. Document
/// frequencies are computed over the surviving items only.
pub fn extract_features(
    items: Vec<Item>,
    dimension: usize,
    min_tokens: usize,
    min_doc_freq: usize,
) -> Featurized {
    let hasher = FeatureHasher::new(dimension);
    let input = items.len();

    // Pass 1: count.
    let counted: Vec<Option<Vec<(u32, u32)>>> = items
        .par_iter()
        .map(|item| {
            let tokens = content_tokens(&item.text);
            (tokens.len() >= min_tokens).then(|| term_frequencies(&tokens, &hasher))
        })
        .collect();

    let (items, tfs): (Vec<Item>, Vec<Vec<(u32, u32)>>) = items
        .into_iter()
        .zip(counted)
        .filter_map(|(item, tf)| tf.map(|tf| (item, tf)))
        .unzip();

    let dfs = DocumentFrequencies::count(&tfs);

    // Pass 2: weight.
    let vectors: Vec<SparseVector> = tfs
        .par_iter()
        .map(|tf| {
            let weighted = tf
                .iter()
                .map(|&(index, count)| (index, count as f64 * dfs.idf(index, min_doc_freq)))
                .collect();
            let mut v = SparseVector::from_pairs(weighted);
            v.normalize();
            v
        })
        .collect();

    let stats = ExtractionStats {
        input,
        too_few_tokens: input - items.len(),
        zero_vectors: vectors.iter().filter(|v| v.is_zero()).count(),
        kept: items.len(),
    };

    Featurized {
        items,
        vectors,
        stats,
    }
}

/// Default stopword set (English function words).
///
/// Applied regardless of the item's language; other languages simply keep
/// their function words.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "couldn", "did", "didn", "do", "does", "doesn", "doing", "don", "down",
    "during", "each", "few", "for", "from", "further", "had", "hadn", "has", "hasn", "have",
    "haven", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
    "i", "if", "in", "into", "is", "isn", "it", "its", "itself", "just", "ll", "me", "mightn",
    "more", "most", "mustn", "my", "myself", "needn", "no", "nor", "not", "now", "of", "off",
    "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "re",
    "same", "shan", "she", "should", "shouldn", "so", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "ve", "very", "was", "wasn", "we", "were",
    "weren", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "won", "would", "wouldn", "you", "your", "yours", "yourself", "yourselves",
];
