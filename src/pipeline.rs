//! End-to-end orchestration: clean → extract → index → block → score → rank.
//!
//! Each stage consumes the complete output of the previous one and hands an
//! owned, immutable result to the next. Two degenerate branches short-circuit
//! the run and are reported through [`RunStatus`]:
//!
//! - fewer than `min_items` usable items (after cleaning, or after the token
//!   gate) → [`RunStatus::InsufficientData`];
//! - no pair survives blocking and the cosine threshold →
//!   [`RunStatus::NoCandidates`].
//!
//! Both still produce an empty [`NeighborList`] for every surviving item.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::blocking::{candidate_pairs, intern_languages, BlockingStats};
use crate::config::{collision_probability, distance_from_cosine, SimilarityConfig};
use crate::error::{Error, Result};
use crate::features::{extract_features, ExtractionStats};
use crate::io::{columns, ItemSource, ResultSink};
use crate::item::{clean_items, CleaningStats, Item, RawItem, Record};
use crate::lsh::{LSHParams, Projections, Signature};
use crate::scoring::{expand_directed, score_pairs};
use crate::topk::{aggregate, empty_lists, NeighborList};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All stages ran and at least one pair was scored.
    Completed,
    /// Too few usable items to compare.
    InsufficientData,
    /// Items were indexed but no pair reached the cosine threshold.
    NoCandidates,
}

/// Per-stage counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    /// Cleaning counters.
    pub cleaning: CleaningStats,
    /// Feature extraction counters.
    pub extraction: ExtractionStats,
    /// Blocking counters.
    pub blocking: BlockingStats,
    /// Estimated chance that a pair exactly at `min_cos` shares a bucket.
    pub expected_recall: f64,
    /// Pairs at or above `min_cos`.
    pub scored_pairs: usize,
    /// Directed edges fed to ranking.
    pub directed_edges: usize,
    /// Neighbor lists emitted.
    pub output_lists: usize,
    /// Neighbor lists with at least one entry.
    pub non_empty_lists: usize,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// How the run ended.
    pub status: RunStatus,
    /// Stage counters.
    pub stats: PipelineStats,
    /// One list per surviving item, in ascending id order.
    #[serde(skip)]
    pub neighbors: Vec<NeighborList>,
}

impl PipelineReport {
    fn finish(status: RunStatus, mut stats: PipelineStats, neighbors: Vec<NeighborList>) -> Self {
        stats.output_lists = neighbors.len();
        stats.non_empty_lists = neighbors.iter().filter(|l| !l.is_empty()).count();
        Self {
            status,
            stats,
            neighbors,
        }
    }
}

/// A configured similarity pipeline with its projections fixed.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: SimilarityConfig,
    projections: Projections,
}

impl Pipeline {
    /// Validate `config` and draw projections from `config.seed`.
    pub fn new(config: SimilarityConfig) -> Result<Self> {
        config.validate()?;
        let projections = Projections::random(config.dimension, &LSHParams::from(&config))?;
        Ok(Self {
            config,
            projections,
        })
    }

    /// Validate `config` and use the given projections.
    ///
    /// The projections' table count and bucket width take precedence over
    /// `num_tables` and `bucket_width` in `config`.
    pub fn with_projections(config: SimilarityConfig, projections: Projections) -> Result<Self> {
        config.validate()?;
        if projections.dimension() != config.dimension {
            return Err(Error::DimensionMismatch {
                expected: config.dimension,
                got: projections.dimension(),
            });
        }
        Ok(Self {
            config,
            projections,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// The projections used for bucketing.
    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    /// Read from `source`, run, and replace the contents of `sink`.
    ///
    /// The sink is written once, at the end. When no item survives cleaning
    /// the sink is left untouched.
    pub fn run_job(
        &self,
        source: &mut dyn ItemSource,
        sink: &mut dyn ResultSink,
    ) -> Result<PipelineReport> {
        let records = source.read_records()?;
        info!(records = records.len(), "read item records");

        let report = self.run_records(&records)?;

        if report.neighbors.is_empty() {
            warn!("no usable items; result sink left untouched");
        } else {
            sink.overwrite(&report.neighbors)?;
            info!(
                lists = report.neighbors.len(),
                status = ?report.status,
                "wrote neighbor lists"
            );
        }
        Ok(report)
    }

    /// Run over loosely-typed source records.
    ///
    /// Fails if records exist but none carries the configured id column.
    pub fn run_records(&self, records: &[Record]) -> Result<PipelineReport> {
        if !records.is_empty() {
            let available = columns(records);
            if !available.contains(&self.config.id_column) {
                return Err(Error::MissingIdColumn {
                    column: self.config.id_column.clone(),
                    available: available.into_iter().collect(),
                });
            }
        }
        let raw = records
            .iter()
            .map(|r| RawItem::from_record(r, &self.config.id_column));
        Ok(self.run_items(raw))
    }

    /// Run over extracted items. Never fails.
    #[instrument(skip_all, fields(k = self.config.k, tables = self.projections.num_tables()))]
    pub fn run_items<I>(&self, raw: I) -> PipelineReport
    where
        I: IntoIterator<Item = RawItem>,
    {
        let cfg = &self.config;
        let mut stats = PipelineStats::default();

        let started = Instant::now();
        let (items, cleaning) = clean_items(raw, cfg);
        stats.cleaning = cleaning;
        info!(
            read = cleaning.read,
            kept = cleaning.kept,
            duplicates = cleaning.duplicates,
            "cleaned items"
        );

        if items.len() < cfg.min_items {
            return self.insufficient(items, stats, "after cleaning");
        }

        let featurized = extract_features(items, cfg.dimension, cfg.min_tokens, cfg.min_doc_freq);
        stats.extraction = featurized.stats;
        info!(
            kept = featurized.stats.kept,
            too_few_tokens = featurized.stats.too_few_tokens,
            zero_vectors = featurized.stats.zero_vectors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extracted features"
        );

        let items = featurized.items;
        let vectors = featurized.vectors;
        if items.len() < cfg.min_items {
            return self.insufficient(items, stats, "after token filter");
        }

        let started = Instant::now();
        let signatures = self.projections.signatures(&vectors);
        let signatures: Vec<Option<Signature>> = signatures
            .into_iter()
            .zip(&vectors)
            .map(|(sig, v)| (!v.is_zero()).then_some(sig))
            .collect();
        let languages = intern_languages(items.iter().map(|i| i.language.as_str()));
        let (pairs, blocking) = candidate_pairs(&languages, &signatures, cfg.bucket_cap);
        stats.blocking = blocking;
        stats.expected_recall = collision_probability(
            self.projections.bucket_width(),
            self.projections.num_tables(),
            distance_from_cosine(cfg.min_cos),
        );
        info!(
            buckets = blocking.buckets,
            capped_buckets = blocking.capped_buckets,
            candidate_pairs = blocking.candidate_pairs,
            expected_recall = stats.expected_recall,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "blocked candidates"
        );
        if blocking.capped_buckets > 0 {
            debug!(
                capped_members = blocking.capped_members,
                bucket_cap = cfg.bucket_cap,
                "bucket cap truncated memberships"
            );
        }

        let started = Instant::now();
        let scored = score_pairs(&pairs, &vectors, cfg.min_cos);
        drop(pairs);
        stats.scored_pairs = scored.len();
        info!(
            scored_pairs = scored.len(),
            min_cos = cfg.min_cos,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scored candidates"
        );

        if scored.is_empty() {
            warn!(
                items = items.len(),
                min_cos = cfg.min_cos,
                "no same-language pair reached the similarity threshold; \
                 emitting empty neighbor lists (try a lower min_cos or wider buckets)"
            );
            let lists = empty_lists(&items);
            return PipelineReport::finish(RunStatus::NoCandidates, stats, lists);
        }

        let edges = expand_directed(&scored);
        stats.directed_edges = edges.len();
        let lists = aggregate(&items, &edges, cfg.candidate_cap, cfg.k);
        debug!(lists = lists.len(), "ranked neighbors");

        PipelineReport::finish(RunStatus::Completed, stats, lists)
    }

    fn insufficient(
        &self,
        items: Vec<Item>,
        stats: PipelineStats,
        stage: &'static str,
    ) -> PipelineReport {
        warn!(
            items = items.len(),
            min_items = self.config.min_items,
            stage,
            "not enough items to compute similarity; emitting empty neighbor lists"
        );
        let lists = empty_lists(&items);
        PipelineReport::finish(RunStatus::InsufficientData, stats, lists)
    }
}
