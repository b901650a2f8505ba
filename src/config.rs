//! Pipeline configuration.
//!
//! Every knob has a default; [`SimilarityConfig::validate`] rejects values outside
//! their domain before any record is read.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default feature-space width (2^18).
pub const DEFAULT_DIMENSION: usize = 1 << 18;

/// Largest accepted feature-space width (2^22).
pub const MAX_DIMENSION: usize = 1 << 22;

/// Upper bound on `num_tables * dimension`, the number of `f32` entries held
/// by the dense projection directions (64 MiB).
pub const MAX_PROJECTION_ENTRIES: usize = 1 << 24;

/// Configuration for one similarity run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Field of the source record that holds the item identifier.
    pub id_column: String,
    /// Number of neighbors kept per item.
    pub k: usize,
    /// Feature hashing space size.
    pub dimension: usize,
    /// Minimum text length in characters (after whitespace collapsing).
    pub min_text_len: usize,
    /// Minimum number of tokens surviving stopword removal.
    pub min_tokens: usize,
    /// Features present in fewer documents than this get zero weight.
    pub min_doc_freq: usize,
    /// Width `W` of each projection bucket.
    pub bucket_width: f64,
    /// Number of independent hash tables `H`.
    pub num_tables: usize,
    /// Maximum members retained per bucket (lowest ids first).
    pub bucket_cap: usize,
    /// Pairs scoring below this cosine are dropped.
    pub min_cos: f64,
    /// Maximum directed edges kept per source before top-K selection.
    pub candidate_cap: usize,
    /// Debug sampling: keep at most this many cleaned items.
    pub limit: Option<usize>,
    /// Below this many usable items the run short-circuits.
    pub min_items: usize,
    /// Seed for the random projection directions.
    pub seed: u64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            id_column: "_id".to_string(),
            k: 5,
            dimension: DEFAULT_DIMENSION,
            min_text_len: 1,
            min_tokens: 5,
            min_doc_freq: 1,
            bucket_width: 2.0,
            num_tables: 5,
            bucket_cap: 500,
            min_cos: 0.05,
            candidate_cap: 50,
            limit: None,
            min_items: 2,
            seed: 42,
        }
    }
}

impl SimilarityConfig {
    /// Wider buckets and more tables: more candidate pairs, better recall.
    pub fn high_recall() -> Self {
        Self {
            bucket_width: 4.0,
            num_tables: 10,
            bucket_cap: 1000,
            ..Default::default()
        }
    }

    /// Narrow buckets and fewer tables: fewer, closer candidate pairs.
    pub fn high_precision() -> Self {
        Self {
            bucket_width: 1.0,
            num_tables: 3,
            min_cos: 0.2,
            ..Default::default()
        }
    }

    /// Threshold on Euclidean distance between unit vectors instead of cosine.
    ///
    /// For L2-normalized vectors \(\cos = 1 - d^2 / 2\).
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.min_cos = cosine_from_distance(max_distance).max(-1.0);
        self
    }

    /// Check every field against its domain.
    ///
    /// The returned error names the first offending field and its value.
    pub fn validate(&self) -> Result<()> {
        if self.id_column.trim().is_empty() {
            return Err(Error::invalid("id_column", &self.id_column, "must be non-empty"));
        }
        if self.k == 0 {
            return Err(Error::invalid("k", self.k, "must be >= 1"));
        }
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(Error::invalid("dimension", self.dimension, "must be in [1, 2^22]"));
        }
        if self.min_text_len == 0 {
            return Err(Error::invalid("min_text_len", self.min_text_len, "must be >= 1"));
        }
        if self.min_tokens == 0 {
            return Err(Error::invalid("min_tokens", self.min_tokens, "must be >= 1"));
        }
        if self.min_doc_freq == 0 {
            return Err(Error::invalid("min_doc_freq", self.min_doc_freq, "must be >= 1"));
        }
        if !(self.bucket_width.is_finite() && self.bucket_width > 0.0) {
            return Err(Error::invalid(
                "bucket_width",
                self.bucket_width,
                "must be finite and > 0",
            ));
        }
        if self.num_tables == 0 {
            return Err(Error::invalid("num_tables", self.num_tables, "must be >= 1"));
        }
        check_projection_size(self.dimension, self.num_tables)?;
        if self.bucket_cap < 2 {
            return Err(Error::invalid("bucket_cap", self.bucket_cap, "must be >= 2"));
        }
        if !(-1.0..=1.0).contains(&self.min_cos) {
            return Err(Error::invalid("min_cos", self.min_cos, "must be in [-1, 1]"));
        }
        if self.candidate_cap == 0 {
            return Err(Error::invalid("candidate_cap", self.candidate_cap, "must be >= 1"));
        }
        if self.limit == Some(0) {
            return Err(Error::invalid("limit", 0, "must be >= 1 when set"));
        }
        if self.min_items == 0 {
            return Err(Error::invalid("min_items", self.min_items, "must be >= 1"));
        }
        Ok(())
    }

    /// Probability that two unit vectors at Euclidean distance `distance` share
    /// a bucket in at least one table.
    ///
    /// Per table, a Gaussian projection with bucket width \(w\) collides with
    /// \(p(c) = 1 - 2\Phi(-w/c) - \frac{2}{\sqrt{2\pi}\,w/c}(1 - e^{-(w/c)^2/2})\)
    /// (Datar et al., 2004); across \(H\) tables \(P = 1 - (1 - p)^H\).
    pub fn candidate_probability(&self, distance: f64) -> f64 {
        collision_probability(self.bucket_width, self.num_tables, distance)
    }
}

/// Rejects `num_tables * dimension` above [`MAX_PROJECTION_ENTRIES`].
pub(crate) fn check_projection_size(dimension: usize, num_tables: usize) -> Result<()> {
    match dimension.checked_mul(num_tables) {
        Some(entries) if entries <= MAX_PROJECTION_ENTRIES => Ok(()),
        _ => Err(Error::invalid(
            "num_tables",
            num_tables,
            "num_tables * dimension must be <= 2^24 projection entries",
        )),
    }
}

/// Probability that two unit vectors at `distance` share a bucket in at least
/// one of `num_tables` tables of width `bucket_width`.
pub(crate) fn collision_probability(bucket_width: f64, num_tables: usize, distance: f64) -> f64 {
    if distance <= 0.0 {
        return 1.0;
    }
    let r = bucket_width / distance;
    let p = 1.0
        - 2.0 * normal_cdf(-r)
        - 2.0 / ((2.0 * std::f64::consts::PI).sqrt() * r) * (1.0 - (-r * r / 2.0).exp());
    let p = p.clamp(0.0, 1.0);
    let tables = i32::try_from(num_tables).unwrap_or(i32::MAX);
    1.0 - (1.0 - p).powi(tables)
}

/// Cosine similarity of two unit vectors at Euclidean distance `distance`.
pub fn cosine_from_distance(distance: f64) -> f64 {
    1.0 - distance * distance / 2.0
}

/// Euclidean distance of two unit vectors with cosine similarity `cosine`.
pub fn distance_from_cosine(cosine: f64) -> f64 {
    (2.0 - 2.0 * cosine.clamp(-1.0, 1.0)).sqrt()
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let y = 1.0
        - (((((1.061_405_429 * t - 1.453_152_027) * t) + 1.421_413_741) * t - 0.284_496_736) * t
            + 0.254_829_592)
            * t
            * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimilarityConfig::default().validate().unwrap();
        SimilarityConfig::high_recall().validate().unwrap();
        SimilarityConfig::high_precision().validate().unwrap();
    }

    #[test]
    fn zero_k_names_the_field() {
        let cfg = SimilarityConfig {
            k: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        match err {
            Error::InvalidConfig { name, value, .. } => {
                assert_eq!(name, "k");
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_non_positive_numbers() {
        let bad = [
            SimilarityConfig {
                dimension: 0,
                ..Default::default()
            },
            SimilarityConfig {
                bucket_width: 0.0,
                ..Default::default()
            },
            SimilarityConfig {
                bucket_width: f64::NAN,
                ..Default::default()
            },
            SimilarityConfig {
                num_tables: 0,
                ..Default::default()
            },
            SimilarityConfig {
                min_cos: 1.5,
                ..Default::default()
            },
            SimilarityConfig {
                limit: Some(0),
                ..Default::default()
            },
            SimilarityConfig {
                id_column: "  ".into(),
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }

    #[test]
    fn max_distance_maps_to_cosine() {
        let cfg = SimilarityConfig::default().with_max_distance(1.0);
        assert!((cfg.min_cos - 0.5).abs() < 1e-12);
        // The original job's permissive 2.5 saturates at -1.
        let cfg = SimilarityConfig::default().with_max_distance(2.5);
        assert_eq!(cfg.min_cos, -1.0);
        assert!((distance_from_cosine(0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn candidate_probability_decreases_with_distance() {
        let cfg = SimilarityConfig::default();
        let near = cfg.candidate_probability(0.2);
        let far = cfg.candidate_probability(1.4);
        assert!(near > far, "near={near} far={far}");
        assert!((0.0..=1.0).contains(&near));
        assert!((0.0..=1.0).contains(&far));
        assert_eq!(cfg.candidate_probability(0.0), 1.0);
    }

    #[test]
    fn dimension_is_bounded_by_projection_memory() {
        let largest = SimilarityConfig {
            dimension: MAX_DIMENSION,
            num_tables: MAX_PROJECTION_ENTRIES / MAX_DIMENSION,
            ..Default::default()
        };
        largest.validate().unwrap();

        let too_wide = SimilarityConfig {
            dimension: MAX_DIMENSION + 1,
            num_tables: 1,
            ..Default::default()
        };
        assert!(matches!(
            too_wide.validate(),
            Err(Error::InvalidConfig { name: "dimension", .. })
        ));

        let too_many_tables = SimilarityConfig {
            dimension: MAX_DIMENSION,
            num_tables: MAX_PROJECTION_ENTRIES / MAX_DIMENSION + 1,
            ..Default::default()
        };
        assert!(matches!(
            too_many_tables.validate(),
            Err(Error::InvalidConfig { name: "num_tables", .. })
        ));

        let huge = SimilarityConfig {
            dimension: 1 << 31,
            ..Default::default()
        };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn erf_matches_reference_points() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
    }
}
