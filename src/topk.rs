//! Per-item top-K neighbor lists.
//!
//! Ranking order everywhere is descending score, then ascending neighbor id.
//! Because item indices follow id order, the tie-break compares indices.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::scoring::DirectedEdge;

/// Final output record for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborList {
    /// The item this list belongs to.
    pub item_id: String,
    /// Neighbor ids, best first.
    pub similar_ids: Vec<String>,
    /// Scores aligned with `similar_ids`.
    pub scores: Vec<f64>,
}

impl NeighborList {
    /// A list with no neighbors.
    pub fn empty(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            similar_ids: Vec::new(),
            scores: Vec::new(),
        }
    }

    /// Number of neighbors.
    pub fn len(&self) -> usize {
        self.similar_ids.len()
    }

    /// True if there are no neighbors.
    pub fn is_empty(&self) -> bool {
        self.similar_ids.is_empty()
    }
}

/// A ranked neighbor: `(index, score)`.
pub type Ranked = (u32, f64);

fn rank_order(a: &Ranked, b: &Ranked) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Group directed edges by source and rank them.
///
/// Returns one entry per item index in `0..num_items`. Each source first keeps
/// at most `candidate_cap` edges, then the first `k` of those.
pub fn rank_neighbors(
    edges: &[DirectedEdge],
    num_items: usize,
    candidate_cap: usize,
    k: usize,
) -> Vec<Vec<Ranked>> {
    let mut grouped: Vec<Vec<Ranked>> = vec![Vec::new(); num_items];
    for e in edges {
        grouped[e.src as usize].push((e.dst, e.score));
    }

    grouped.par_iter_mut().for_each(|neighbors| {
        neighbors.sort_unstable_by(rank_order);
        neighbors.truncate(candidate_cap);
        neighbors.truncate(k);
    });
    grouped
}

/// Build the neighbor list of every item in `items`, in item order.
///
/// Items without edges get an explicit empty list.
pub fn aggregate(
    items: &[Item],
    edges: &[DirectedEdge],
    candidate_cap: usize,
    k: usize,
) -> Vec<NeighborList> {
    rank_neighbors(edges, items.len(), candidate_cap, k)
        .into_par_iter()
        .zip(items.par_iter())
        .map(|(ranked, item)| {
            let (similar_ids, scores) = ranked
                .into_iter()
                .map(|(idx, score)| (items[idx as usize].id.clone(), score))
                .unzip();
            NeighborList {
                item_id: item.id.clone(),
                similar_ids,
                scores,
            }
        })
        .collect()
}

/// An empty list for every item.
pub fn empty_lists(items: &[Item]) -> Vec<NeighborList> {
    items.iter().map(|i| NeighborList::empty(i.id.clone())).collect()
}
