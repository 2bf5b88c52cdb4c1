use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bench: BenchConfig,
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
}

/// Benchmark run configuration: inputs, outputs and k-values
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// JSON corpus produced by the ingestion pipeline (section id -> section)
    pub corpus_path: PathBuf,
    /// Labeled test questions
    pub ground_truth_path: PathBuf,
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_k_values")]
    pub k_values: Vec<usize>,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    /// "openai" or "hashing"
    pub provider: String,
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub dimensions: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

/// Hybrid (BM25 + dense) retriever tuning
#[derive(Debug, Clone, Deserialize)]
pub struct HybridConfig {
    #[serde(default = "default_k1")]
    pub k1: f32,
    #[serde(default = "default_b")]
    pub b: f32,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            dense_weight: default_dense_weight(),
            rrf_k: default_rrf_k(),
        }
    }
}

/// Sentence-chunk retriever configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_expand_to_section")]
    pub expand_to_section: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            expand_to_section: default_expand_to_section(),
        }
    }
}

/// Baseline retriever configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineConfig {
    /// SQLite store holding externally computed section and query vectors
    #[serde(default)]
    pub vectors_db: Option<PathBuf>,
}

fn default_results_path() -> PathBuf {
    PathBuf::from("results/evaluation.json")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_k_values() -> Vec<usize> {
    vec![1, 3, 5, 10]
}

fn default_max_k() -> usize {
    10
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_max_retries() -> usize {
    3
}

fn default_k1() -> f32 {
    1.5
}

fn default_b() -> f32 {
    0.75
}

fn default_dense_weight() -> f32 {
    0.5
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_chunk_size() -> usize {
    3
}

fn default_expand_to_section() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RULEBENCH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RULEBENCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_path(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.bench.k_values.is_empty() {
            anyhow::bail!("bench.k_values must contain at least one value");
        }

        if self.bench.k_values.iter().any(|&k| k == 0) {
            anyhow::bail!("bench.k_values must all be greater than 0");
        }

        if self.bench.max_k == 0 {
            anyhow::bail!("bench.max_k must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be greater than 0");
        }

        if self.embeddings.provider == "openai" {
            std::env::var(&self.embeddings.api_key_env).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable with your OpenAI API key.",
                    self.embeddings.api_key_env
                )
            })?;
        }

        if !(0.0..=1.0).contains(&self.hybrid.dense_weight) {
            anyhow::bail!("hybrid.dense_weight must be between 0.0 and 1.0");
        }

        if self.hybrid.k1 < 0.0 {
            anyhow::bail!("hybrid.k1 must not be negative");
        }

        if !(0.0..=1.0).contains(&self.hybrid.b) {
            anyhow::bail!("hybrid.b must be between 0.0 and 1.0");
        }

        if self.hybrid.rrf_k < 0.0 {
            anyhow::bail!("hybrid.rrf_k must not be negative");
        }

        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be greater than 0");
        }

        Ok(())
    }

    /// Directory holding the embedding cache files
    pub fn cache_dir(&self) -> &Path {
        &self.bench.cache_dir
    }

    /// Largest k the evaluator asks retrievers for
    pub fn max_k(&self) -> usize {
        self.bench
            .k_values
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .max(self.bench.max_k)
    }
}
