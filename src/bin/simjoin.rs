use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use simjoin::{JsonlItemSource, JsonlResultSink, Pipeline, SimilarityConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "simjoin",
    about = "Compute per-item top-K same-language text neighbors with TF-IDF + LSH blocking"
)]
struct Cli {
    /// JSONL file with one item record per line.
    #[arg(long, env = "SIMJOIN_INPUT")]
    input: PathBuf,

    /// JSONL file that receives one neighbor list per item (replaced on success).
    #[arg(long, env = "SIMJOIN_OUTPUT")]
    output: PathBuf,

    /// Optional JSON file with a full configuration; flags below override it.
    #[arg(long, env = "SIMJOIN_CONFIG")]
    config: Option<PathBuf>,

    /// Identifier field in the input records.
    #[arg(long = "id-col", env = "SIMJOIN_ID_COL")]
    id_column: Option<String>,

    /// Neighbors kept per item.
    #[arg(long, env = "SIMJOIN_K")]
    k: Option<usize>,

    /// Feature hashing dimension.
    #[arg(long, env = "SIMJOIN_DIMENSION")]
    dimension: Option<usize>,

    /// Minimum text length (characters).
    #[arg(long, env = "SIMJOIN_MIN_TEXT_LEN")]
    min_text_len: Option<usize>,

    /// Minimum content tokens after stopword removal.
    #[arg(long, env = "SIMJOIN_MIN_TOKENS")]
    min_tokens: Option<usize>,

    /// Features seen in fewer documents get zero weight.
    #[arg(long, env = "SIMJOIN_MIN_DOC_FREQ")]
    min_doc_freq: Option<usize>,

    /// LSH bucket width.
    #[arg(long = "bucket-length", alias = "bucket-width", env = "SIMJOIN_BUCKET_WIDTH")]
    bucket_width: Option<f64>,

    /// Number of LSH hash tables.
    #[arg(long = "num-hash-tables", env = "SIMJOIN_NUM_TABLES")]
    num_tables: Option<usize>,

    /// Maximum members kept per bucket.
    #[arg(long, env = "SIMJOIN_BUCKET_CAP")]
    bucket_cap: Option<usize>,

    /// Minimum cosine similarity for a neighbor.
    #[arg(long, env = "SIMJOIN_MIN_COS", conflicts_with = "max_dist")]
    min_cos: Option<f64>,

    /// Maximum Euclidean distance between unit vectors (alternative to --min-cos).
    #[arg(long, env = "SIMJOIN_MAX_DIST")]
    max_dist: Option<f64>,

    /// Directed edges kept per item before top-K.
    #[arg(long, env = "SIMJOIN_CANDIDATE_CAP")]
    candidate_cap: Option<usize>,

    /// Keep at most this many items (debug sampling).
    #[arg(long, env = "SIMJOIN_LIMIT")]
    limit: Option<usize>,

    /// Minimum usable items before similarity is attempted.
    #[arg(long, env = "SIMJOIN_MIN_ITEMS")]
    min_items: Option<usize>,

    /// Seed for the LSH projections.
    #[arg(long, env = "SIMJOIN_SEED")]
    seed: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn build_config(&self) -> Result<SimilarityConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => SimilarityConfig::default(),
        };

        if let Some(v) = &self.id_column {
            cfg.id_column = v.clone();
        }
        if let Some(v) = self.k {
            cfg.k = v;
        }
        if let Some(v) = self.dimension {
            cfg.dimension = v;
        }
        if let Some(v) = self.min_text_len {
            cfg.min_text_len = v;
        }
        if let Some(v) = self.min_tokens {
            cfg.min_tokens = v;
        }
        if let Some(v) = self.min_doc_freq {
            cfg.min_doc_freq = v;
        }
        if let Some(v) = self.bucket_width {
            cfg.bucket_width = v;
        }
        if let Some(v) = self.num_tables {
            cfg.num_tables = v;
        }
        if let Some(v) = self.bucket_cap {
            cfg.bucket_cap = v;
        }
        if let Some(v) = self.min_cos {
            cfg.min_cos = v;
        }
        if let Some(v) = self.max_dist {
            cfg = cfg.with_max_distance(v);
        }
        if let Some(v) = self.candidate_cap {
            cfg.candidate_cap = v;
        }
        if self.limit.is_some() {
            cfg.limit = self.limit;
        }
        if let Some(v) = self.min_items {
            cfg.min_items = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.build_config()?;
    let pipeline = Pipeline::new(config).context("invalid configuration")?;

    let mut source = JsonlItemSource::open(&cli.input)
        .with_context(|| format!("failed to open input {}", cli.input.display()))?;
    let mut sink = JsonlResultSink::new(&cli.output);

    let report = pipeline
        .run_job(&mut source, &mut sink)
        .context("similarity run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
