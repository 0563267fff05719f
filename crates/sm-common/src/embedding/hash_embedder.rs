use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use siphasher::sip::SipHasher13;

use super::{EmbeddingError, SkillEmbedder};
use crate::model::normalize_skill_key;

/// Fixed seeds keep vectors stable across processes and Rust versions.
/// Changing them changes every stored vector: bump `version()` too.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

/// Share of a phrase's weight given to each of its individual words, so
/// "machine learning" and "deep learning" overlap a little.
const WORD_WEIGHT_RATIO: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
struct WeightedToken {
    token: String,
    weight: f32,
}

/// Deterministic feature-hashing oracle.
///
/// Reads the `"<skill> <level>"` text: words up to a number form one skill
/// phrase weighted by that number. Each phrase is hashed with SipHash-1-3 into
/// a signed bucket and the result is L2 normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash(&self, token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn bucket(&self, token: &str) -> usize {
        (self.hash(token) % self.dimension as u64) as usize
    }

    fn sign(&self, token: &str) -> f32 {
        if self.hash(&format!("{token}_sign")) % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn flush_phrase(phrase: &mut Vec<&str>, weight: f32, tokens: &mut Vec<WeightedToken>) {
        if phrase.is_empty() {
            return;
        }
        if phrase.len() > 1 {
            for word in phrase.iter() {
                tokens.push(WeightedToken {
                    token: normalize_skill_key(word),
                    weight: weight * WORD_WEIGHT_RATIO,
                });
            }
        }
        tokens.push(WeightedToken {
            token: normalize_skill_key(&phrase.join(" ")),
            weight,
        });
        phrase.clear();
    }

    fn tokenize(text: &str) -> Vec<WeightedToken> {
        let mut tokens = Vec::new();
        let mut phrase: Vec<&str> = Vec::new();

        for word in text.split_whitespace() {
            match word.parse::<f32>() {
                Ok(level) if level.is_finite() && !phrase.is_empty() => {
                    Self::flush_phrase(&mut phrase, level.max(0.0), &mut tokens);
                }
                _ => phrase.push(word),
            }
        }
        Self::flush_phrase(&mut phrase, 1.0, &mut tokens);

        tokens
    }
}

#[async_trait]
impl SkillEmbedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];

        for wt in Self::tokenize(text) {
            let idx = self.bucket(&wt.token);
            vector[idx] += self.sign(&wt.token) * wt.weight;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}
