//! Blocking: group items by `(language, table, signature)` and emit
//! within-bucket candidate pairs.
//!
//! Items are referred to by their index in the id-sorted item list, so index
//! order is lexicographic id order. Pairs are only ever formed inside one
//! bucket key, which carries the language, so items of different languages are
//! never paired.
//!
//! # Bucket cap
//!
//! A bucket holding more than `bucket_cap` members keeps only the lowest
//! `bucket_cap` ids. This is a blunt memory bound, not a relevance filter.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::lsh::Signature;

/// Grouping key for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    /// Interned language code (see [`intern_languages`]).
    pub language: u32,
    /// Hash table index.
    pub table: u32,
    /// Bucket signature within that table.
    pub signature: i64,
}

/// An unordered item pair, stored with `src < dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidatePair {
    /// Lower item index.
    pub src: u32,
    /// Higher item index.
    pub dst: u32,
}

impl CandidatePair {
    /// Order two distinct indices into a pair. `None` if they are equal.
    pub fn new(a: u32, b: u32) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { src: a, dst: b }),
            std::cmp::Ordering::Greater => Some(Self { src: b, dst: a }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Counters from [`candidate_pairs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockingStats {
    /// Items that were placed into buckets.
    pub indexed_items: usize,
    /// Distinct bucket keys.
    pub buckets: usize,
    /// Buckets with at least two members (the ones that yield pairs).
    pub shared_buckets: usize,
    /// Buckets truncated by the cap.
    pub capped_buckets: usize,
    /// Memberships removed by the cap.
    pub capped_members: usize,
    /// Deduplicated candidate pairs.
    pub candidate_pairs: usize,
}

/// Map language strings to dense codes in first-seen order.
pub fn intern_languages<'a, I>(languages: I) -> Vec<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut codes: HashMap<&'a str, u32> = HashMap::new();
    languages
        .into_iter()
        .map(|lang| {
            let next = codes.len() as u32;
            *codes.entry(lang).or_insert(next)
        })
        .collect()
}

/// Group items into buckets.
///
/// `signatures[i] == None` excludes item `i` from blocking. Member lists are
/// ascending and already truncated to `bucket_cap`. Buckets are returned in
/// key order.
pub fn assign_buckets(
    languages: &[u32],
    signatures: &[Option<Signature>],
    bucket_cap: usize,
) -> (Vec<(BucketKey, Vec<u32>)>, BlockingStats) {
    debug_assert_eq!(languages.len(), signatures.len());

    let mut buckets: HashMap<BucketKey, Vec<u32>> = HashMap::new();
    let mut stats = BlockingStats::default();

    for (idx, (lang, sig)) in languages.iter().zip(signatures).enumerate() {
        let Some(sig) = sig else { continue };
        stats.indexed_items += 1;
        for (table, &signature) in sig.iter().enumerate() {
            let key = BucketKey {
                language: *lang,
                table: table as u32,
                signature,
            };
            buckets.entry(key).or_default().push(idx as u32);
        }
    }

    let mut buckets: Vec<(BucketKey, Vec<u32>)> = buckets.into_iter().collect();
    buckets.sort_unstable_by_key(|(key, _)| *key);

    stats.buckets = buckets.len();
    for (_, members) in &mut buckets {
        if members.len() >= 2 {
            stats.shared_buckets += 1;
        }
        if members.len() > bucket_cap {
            stats.capped_buckets += 1;
            stats.capped_members += members.len() - bucket_cap;
            members.truncate(bucket_cap);
        }
    }

    (buckets, stats)
}

/// All deduplicated within-bucket pairs, sorted.
///
/// A pair that co-occurs in several tables is emitted once.
pub fn candidate_pairs(
    languages: &[u32],
    signatures: &[Option<Signature>],
    bucket_cap: usize,
) -> (Vec<CandidatePair>, BlockingStats) {
    let (buckets, mut stats) = assign_buckets(languages, signatures, bucket_cap);

    let mut pairs: Vec<CandidatePair> = buckets
        .par_iter()
        .filter(|(_, members)| members.len() >= 2)
        .flat_map_iter(|(_, members)| {
            members.iter().enumerate().flat_map(move |(i, &a)| {
                members[i + 1..]
                    .iter()
                    .map(move |&b| CandidatePair { src: a, dst: b })
            })
        })
        .collect();

    pairs.par_sort_unstable();
    pairs.dedup();

    stats.candidate_pairs = pairs.len();
    (pairs, stats)
}
