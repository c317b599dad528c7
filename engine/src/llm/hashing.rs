//! Offline embedder
//!
//! Feature-hashes lower-cased word tokens into a fixed number of buckets and
//! L2-normalises the result. Vectors carry no semantics beyond shared
//! vocabulary, but they are deterministic across processes, which is what
//! local development and tests need.

use super::{EmbeddingTask, Embedder, LLMError};
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed synchronously; the task hint does not change the vector.
    pub fn embed_sync(&self, text: &str) -> super::Result<Vec<f32>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(LLMError::Embedding("cannot embed empty text".to_string()));
        }

        let lower = trimmed.to_lowercase();
        let mut tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            // Punctuation-only input still gets a stable vector
            tokens.push(lower.as_str());
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            // Every token cancelled out; fall back to one bucket for the whole text
            let hash = fnv1a(lower.as_bytes());
            vector[(hash % self.dimension as u64) as usize] = 1.0;
        }

        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> super::Result<Vec<f32>> {
        self.embed_sync(text)
    }
}
