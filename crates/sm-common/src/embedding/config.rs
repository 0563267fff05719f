use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Oracle implementation: "hash" or "disabled".
    pub embedder: String,
    /// Vector dimension for the hash embedder.
    pub dimension: usize,
    /// Upper bound on a single oracle call.
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedder: "hash".into(),
            dimension: 256,
            timeout: Duration::from_millis(2_000),
        }
    }
}

/// Read `SM_EMBEDDER`, `SM_EMBEDDING_DIMENSION` and `SM_EMBEDDING_TIMEOUT_MS`.
pub fn load_config_from_env() -> EmbeddingConfig {
    let defaults = EmbeddingConfig::default();

    EmbeddingConfig {
        embedder: std::env::var("SM_EMBEDDER")
            .ok()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.embedder),
        dimension: std::env::var("SM_EMBEDDING_DIMENSION")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(defaults.dimension),
        timeout: std::env::var("SM_EMBEDDING_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout),
    }
}
