//! `simjoin`: per-language top-K text similarity for large item sets.
//!
//! For every item the crate computes the K most similar other items that share
//! its language tag, without comparing all pairs:
//! - TF-IDF over hashed token features, L2-normalized ([`features`])
//! - bucketed random-projection LSH ([`lsh`]) to block items into buckets ([`blocking`])
//! - exact cosine scoring of within-bucket pairs ([`scoring`])
//! - deterministic top-K ranking with explicit empty lists for items without
//!   neighbors ([`topk`])
//!
//! [`pipeline::Pipeline`] sequences the stages. Storage stays behind the
//! [`io::ItemSource`] and [`io::ResultSink`] traits.
//!
//! # Example
//!
//! ```rust
//! use simjoin::{Pipeline, RawItem, RunStatus, SimilarityConfig};
//!
//! let config = SimilarityConfig { dimension: 1 << 12, min_tokens: 2, ..Default::default() };
//! let pipeline = Pipeline::new(config).unwrap();
//! let item = |id: &str, text: &str| RawItem {
//!     id: Some(id.into()),
//!     language: Some("en".into()),
//!     text: text.into(),
//! };
//! let report = pipeline.run_items(vec![
//!     item("a", "graph theory algorithms"),
//!     item("b", "graph algorithms basics"),
//!     item("c", "fresh pasta recipes"),
//! ]);
//! // Every surviving item gets a list, possibly empty.
//! assert_eq!(report.neighbors.len(), 3);
//! assert_ne!(report.status, RunStatus::InsufficientData);
//! ```

#![warn(missing_docs)]

pub mod blocking;
pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod item;
pub mod lsh;
pub mod pipeline;
pub mod scoring;
pub mod topk;

pub use blocking::{BucketKey, CandidatePair};
pub use config::SimilarityConfig;
pub use error::{Error, Result};
pub use features::{FeatureHasher, SparseVector};
pub use io::{ItemSource, JsonlItemSource, JsonlResultSink, ResultSink};
pub use item::{Item, RawItem, Record};
pub use lsh::{LSHParams, Projections};
pub use pipeline::{Pipeline, PipelineReport, PipelineStats, RunStatus};
pub use scoring::{DirectedEdge, ScoredPair};
pub use topk::NeighborList;
