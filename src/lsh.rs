//! Bucketed random-projection LSH.
//!
//! Each of `H` hash tables owns one Gaussian projection direction. A vector's
//! signature in table `h` is \(\lfloor \langle v, r_h \rangle / W \rfloor\).
//! Vectors that share a signature in at least one table are LSH-adjacent; for
//! unit vectors this is a proxy for small Euclidean distance and therefore high
//! cosine similarity.
//!
//! Directions are drawn once per run from a seeded RNG and passed around as an
//! explicit [`Projections`] value. Tests can inject their own directions with
//! [`Projections::from_directions`].

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::config::{check_projection_size, SimilarityConfig};
use crate::error::{Error, Result};
use crate::features::SparseVector;

/// Parameters for drawing projections.
#[derive(Debug, Clone, PartialEq)]
pub struct LSHParams {
    /// Number of hash tables.
    pub num_tables: usize,
    /// Bucket width `W`.
    pub bucket_width: f64,
    /// RNG seed for the projection directions.
    pub seed: u64,
}

impl Default for LSHParams {
    fn default() -> Self {
        Self::from(&SimilarityConfig::default())
    }
}

impl From<&SimilarityConfig> for LSHParams {
    fn from(config: &SimilarityConfig) -> Self {
        Self {
            num_tables: config.num_tables,
            bucket_width: config.bucket_width,
            seed: config.seed,
        }
    }
}

/// One bucket signature per hash table.
pub type Signature = Vec<i64>;

/// Fixed projection directions for one run.
#[derive(Debug, Clone)]
pub struct Projections {
    dimension: usize,
    bucket_width: f64,
    directions: Vec<Vec<f32>>,
}

impl Projections {
    /// Draw `num_tables` directions with i.i.d. standard normal entries.
    ///
    /// The same `(dimension, params)` always yields the same directions.
    /// Directions are dense, so `num_tables * dimension` is bounded by
    /// [`MAX_PROJECTION_ENTRIES`](crate::config::MAX_PROJECTION_ENTRIES).
    pub fn random(dimension: usize, params: &LSHParams) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::invalid("dimension", dimension, "must be >= 1"));
        }
        if params.num_tables == 0 {
            return Err(Error::invalid("num_tables", params.num_tables, "must be >= 1"));
        }
        check_projection_size(dimension, params.num_tables)?;
        check_width(params.bucket_width)?;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let directions: Vec<Vec<f32>> = (0..params.num_tables)
            .map(|_| {
                (0..dimension)
                    .map(|_| rng.sample::<f32, _>(StandardNormal))
                    .collect()
            })
            .collect();

        Ok(Self {
            dimension,
            bucket_width: params.bucket_width,
            directions,
        })
    }

    /// Use caller-provided directions, one per table. All must share a length.
    pub fn from_directions(directions: Vec<Vec<f32>>, bucket_width: f64) -> Result<Self> {
        let Some(first) = directions.first() else {
            return Err(Error::invalid("num_tables", 0, "must be >= 1"));
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(Error::invalid("dimension", 0, "must be >= 1"));
        }
        if let Some(bad) = directions.iter().find(|d| d.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }
        check_width(bucket_width)?;
        Ok(Self {
            dimension,
            bucket_width,
            directions,
        })
    }

    /// Number of hash tables.
    pub fn num_tables(&self) -> usize {
        self.directions.len()
    }

    /// Width of each direction.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Bucket width `W`.
    pub fn bucket_width(&self) -> f64 {
        self.bucket_width
    }

    /// \(\langle v, r_{table} \rangle\).
    pub fn project(&self, table: usize, vector: &SparseVector) -> f64 {
        let direction = &self.directions[table];
        vector
            .iter()
            .filter_map(|(i, x)| direction.get(i as usize).map(|&r| x * r as f64))
            .sum()
    }

    /// Bucket signature of `vector` in every table.
    pub fn signature(&self, vector: &SparseVector) -> Signature {
        (0..self.num_tables())
            .map(|t| (self.project(t, vector) / self.bucket_width).floor() as i64)
            .collect()
    }

    /// Signatures for a batch of vectors, in input order.
    pub fn signatures(&self, vectors: &[SparseVector]) -> Vec<Signature> {
        vectors.par_iter().map(|v| self.signature(v)).collect()
    }
}

fn check_width(bucket_width: f64) -> Result<()> {
    if bucket_width.is_finite() && bucket_width > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(
            "bucket_width",
            bucket_width,
            "must be finite and > 0",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(pairs: Vec<(u32, f64)>) -> SparseVector {
        let mut v = SparseVector::from_pairs(pairs);
        v.normalize();
        v
    }

    #[test]
    fn seeded_projections_are_reproducible() {
        let params = LSHParams::default();
        let a = Projections::random(64, &params).unwrap();
        let b = Projections::random(64, &params).unwrap();
        let v = unit(vec![(1, 1.0), (7, 2.0), (63, 0.5)]);
        assert_eq!(a.signature(&v), b.signature(&v));
        assert_eq!(a.num_tables(), params.num_tables);

        let other = Projections::random(
            64,
            &LSHParams {
                seed: 7,
                ..params
            },
        )
        .unwrap();
        assert_ne!(a.directions, other.directions);
    }

    #[test]
    fn signature_is_floor_of_scaled_projection() {
        let p = Projections::from_directions(vec![vec![1.0, 0.0], vec![-1.0, 0.0]], 0.5).unwrap();
        let v = SparseVector::from_pairs(vec![(0, 0.8)]);
        // 0.8 / 0.5 = 1.6 -> 1 ; -0.8 / 0.5 = -1.6 -> -2
        assert_eq!(p.signature(&v), vec![1, -2]);
    }

    #[test]
    fn identical_vectors_share_every_bucket() {
        let p = Projections::random(32, &LSHParams::default()).unwrap();
        let v = unit(vec![(3, 1.0), (9, 1.0)]);
        let w = unit(vec![(3, 1.0), (9, 1.0)]);
        assert_eq!(p.signature(&v), p.signature(&w));
    }

    #[test]
    fn rejects_bad_directions() {
        assert!(Projections::from_directions(vec![], 1.0).is_err());
        assert!(matches!(
            Projections::from_directions(vec![vec![1.0; 4], vec![1.0; 3]], 1.0),
            Err(Error::DimensionMismatch { expected: 4, got: 3 })
        ));
        assert!(Projections::from_directions(vec![vec![1.0; 4]], 0.0).is_err());
        assert!(Projections::random(0, &LSHParams::default()).is_err());
        assert!(matches!(
            Projections::random(1 << 31, &LSHParams::default()),
            Err(Error::InvalidConfig { name: "num_tables", .. })
        ));
    }

    #[test]
    fn default_params_follow_default_config() {
        let cfg = SimilarityConfig::default();
        let params = LSHParams::default();
        assert_eq!(params.num_tables, cfg.num_tables);
        assert_eq!(params.bucket_width, cfg.bucket_width);
        assert_eq!(params.seed, cfg.seed);
    }
}
