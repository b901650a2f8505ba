//! Cosine scoring of candidate pairs.

use rayon::prelude::*;

use crate::blocking::CandidatePair;
use crate::features::SparseVector;

/// A scored unordered pair (`src < dst`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPair {
    /// Lower item index.
    pub src: u32,
    /// Higher item index.
    pub dst: u32,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f64,
}

/// One direction of a scored pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectedEdge {
    /// Item the edge belongs to.
    pub src: u32,
    /// Neighbor item.
    pub dst: u32,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f64,
}

/// Cosine similarity of two L2-normalized vectors, clamped to `[-1, 1]`
/// against rounding.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    a.dot(b).clamp(-1.0, 1.0)
}

/// Score every pair and keep those with `score >= min_cos`.
///
/// Input pairs may repeat; each `(src, dst)` appears once in the output with
/// its maximum score. Output is sorted by `(src, dst)`.
pub fn score_pairs(
    pairs: &[CandidatePair],
    vectors: &[SparseVector],
    min_cos: f64,
) -> Vec<ScoredPair> {
    let scored: Vec<ScoredPair> = pairs
        .par_iter()
        .filter_map(|p| {
            let score = cosine(&vectors[p.src as usize], &vectors[p.dst as usize]);
            (score >= min_cos).then_some(ScoredPair {
                src: p.src,
                dst: p.dst,
                score,
            })
        })
        .collect();
    merge_max(scored)
}

/// Collapse repeated `(src, dst)` entries to their maximum score.
pub fn merge_max(mut pairs: Vec<ScoredPair>) -> Vec<ScoredPair> {
    pairs.par_sort_unstable_by(|a, b| {
        (a.src, a.dst)
            .cmp(&(b.src, b.dst))
            .then_with(|| b.score.total_cmp(&a.score))
    });
    // Highest score sorts first within a key.
    pairs.dedup_by(|next, kept| next.src == kept.src && next.dst == kept.dst);
    pairs
}

/// Expand each pair into both directions.
pub fn expand_directed(pairs: &[ScoredPair]) -> Vec<DirectedEdge> {
    pairs
        .iter()
        .flat_map(|p| {
            [
                DirectedEdge {
                    src: p.src,
                    dst: p.dst,
                    score: p.score,
                },
                DirectedEdge {
                    src: p.dst,
                    dst: p.src,
                    score: p.score,
                },
            ]
        })
        .collect()
}
