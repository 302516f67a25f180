use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::CommentLensError;

/// Application configuration loaded from environment variables.
/// Every value has a default; only malformed values are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Backend
    pub backend_url: String,
    pub comments_path: String,
    pub embedding_path: String,
    pub analysis_path: String,

    // Embedding stage
    pub embedding_limit: usize,
    /// `None` fans out to the whole batch at once.
    pub embedding_concurrency: Option<usize>,

    // Clustering
    pub max_iterations: usize,
    pub kmeans_seed: Option<u64>,

    // Summaries
    pub summary_sample_size: usize,

    // Context watching
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            comments_path: "/get_youtube_comments".to_string(),
            embedding_path: "/get_embedding".to_string(),
            analysis_path: "/analyze_text".to_string(),
            embedding_limit: 100,
            embedding_concurrency: None,
            max_iterations: 50,
            kmeans_seed: None,
            summary_sample_size: 5,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, CommentLensError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Missing keys fall back to
    /// the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CommentLensError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let embedding_concurrency = match parse_opt::<usize>(&get, "COMMENTLENS_EMBEDDING_CONCURRENCY")? {
            Some(0) => None,
            other => other,
        };

        let config = Self {
            backend_url: get("COMMENTLENS_BACKEND_URL").unwrap_or(defaults.backend_url),
            comments_path: get("COMMENTLENS_COMMENTS_PATH").unwrap_or(defaults.comments_path),
            embedding_path: get("COMMENTLENS_EMBEDDING_PATH").unwrap_or(defaults.embedding_path),
            analysis_path: get("COMMENTLENS_ANALYSIS_PATH").unwrap_or(defaults.analysis_path),
            embedding_limit: parse_opt(&get, "COMMENTLENS_EMBEDDING_LIMIT")?
                .unwrap_or(defaults.embedding_limit),
            embedding_concurrency,
            max_iterations: parse_opt(&get, "COMMENTLENS_MAX_ITERATIONS")?
                .unwrap_or(defaults.max_iterations),
            kmeans_seed: parse_opt(&get, "COMMENTLENS_KMEANS_SEED")?,
            summary_sample_size: parse_opt(&get, "COMMENTLENS_SUMMARY_SAMPLE")?
                .unwrap_or(defaults.summary_sample_size),
            poll_interval: parse_opt::<u64>(&get, "COMMENTLENS_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CommentLensError> {
        if self.embedding_limit == 0 {
            return Err(CommentLensError::Config(
                "COMMENTLENS_EMBEDDING_LIMIT must be at least 1".to_string(),
            ));
        }
        if self.summary_sample_size == 0 {
            return Err(CommentLensError::Config(
                "COMMENTLENS_SUMMARY_SAMPLE must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CommentLensError::Config(
                "COMMENTLENS_POLL_INTERVAL_MS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        info!(
            backend_url = self.backend_url.as_str(),
            comments_path = self.comments_path.as_str(),
            embedding_path = self.embedding_path.as_str(),
            analysis_path = self.analysis_path.as_str(),
            embedding_limit = self.embedding_limit,
            embedding_concurrency = ?self.embedding_concurrency,
            max_iterations = self.max_iterations,
            kmeans_seed = ?self.kmeans_seed,
            summary_sample_size = self.summary_sample_size,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Configuration loaded"
        );
    }
}

fn parse_opt<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CommentLensError>
where
    T: FromStr,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CommentLensError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}
