pub mod config;
pub mod hash_embedder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::SkillLevel;
pub use config::{EmbeddingConfig, load_config_from_env};
pub use hash_embedder::HashEmbedder;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding oracle unavailable: {0}")]
    Unavailable(String),
    #[error("embedding oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding oracle returned an unusable vector: {0}")]
    InvalidVector(String),
}

/// Text-to-vector oracle. Implementations must be deterministic for a given
/// `version()`; stored vectors are only comparable within one version.
#[async_trait]
pub trait SkillEmbedder: Send + Sync {
    /// Implementation name ("hash", "disabled", ...).
    fn name(&self) -> &'static str;

    fn version(&self) -> &str;

    /// Length of every vector `embed` returns. Vectors of any other length
    /// are discarded by `SkillVectorBuilder`.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Oracle used when embeddings are switched off. Every call reports `Unavailable`,
/// so all scoring runs on skill coverage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEmbedder;

#[async_trait]
impl SkillEmbedder for DisabledEmbedder {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn version(&self) -> &str {
        "none"
    }

    fn dimension(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("embedding oracle disabled".into()))
    }
}

/// Factory for the oracle named in configuration. Unknown names fall back to hashing.
pub fn create_embedder(config: &EmbeddingConfig) -> Arc<dyn SkillEmbedder> {
    match config.embedder.as_str() {
        "disabled" | "none" | "off" => Arc::new(DisabledEmbedder),
        "hash" => Arc::new(HashEmbedder::new(config.dimension)),
        other => {
            warn!(embedder = other, "unknown embedder; using hash embedder");
            Arc::new(HashEmbedder::new(config.dimension))
        }
    }
}

/// Text form handed to the oracle: `"<skill> <level>"` entries joined by spaces,
/// in list order.
pub fn skill_text(skills: &[SkillLevel]) -> String {
    skills
        .iter()
        .map(|entry| format!("{} {}", entry.skill, entry.level))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds skill vectors for employees and projects.
///
/// Never fails: any oracle problem is logged and reported as `None`, which the
/// scorer reads as "similarity unavailable, use coverage".
#[derive(Clone)]
pub struct SkillVectorBuilder {
    embedder: Arc<dyn SkillEmbedder>,
    timeout: Duration,
}

impl SkillVectorBuilder {
    pub fn new(embedder: Arc<dyn SkillEmbedder>, timeout: Duration) -> Self {
        Self { embedder, timeout }
    }

    pub fn embedder_name(&self) -> &'static str {
        self.embedder.name()
    }

    pub async fn build(&self, skills: &[SkillLevel]) -> Option<Vec<f32>> {
        match self.try_build(skills).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(
                    embedder = self.embedder.name(),
                    error = %err,
                    "skill vector unavailable; coverage fallback will be used"
                );
                metrics::counter!("sm_embedding_fallback_total", "embedder" => self.embedder.name())
                    .increment(1);
                None
            }
        }
    }

    async fn try_build(&self, skills: &[SkillLevel]) -> Result<Vec<f32>, EmbeddingError> {
        let text = skill_text(skills);
        let vector = tokio::time::timeout(self.timeout, self.embedder.embed(&text))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))??;

        if vector.is_empty() {
            return Err(EmbeddingError::InvalidVector("empty vector".into()));
        }
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::InvalidVector(format!(
                "expected {expected} components, got {}",
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidVector("non-finite component".into()));
        }

        debug!(
            embedder = self.embedder.name(),
            version = self.embedder.version(),
            dimension = vector.len(),
            "built skill vector"
        );
        Ok(vector)
    }
}
