//! Offline feature-hashing embedder

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::EmbeddingError;

/// Hashes lowercase word unigrams and bigrams into a fixed number of
/// signed buckets, then L2-normalises. Same text, same vector.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("embedding.dims must be greater than zero");
        }
        Ok(Self { dims })
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let index = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        (index % self.dims, sign)
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-sha256"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            return Err(EmbeddingError::Empty);
        }

        let mut vec = vec![0.0f32; self.dims];
        for token in &tokens {
            let (i, sign) = self.bucket(token);
            vec[i] += sign;
        }
        for pair in tokens.windows(2) {
            let (i, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vec[i] += 0.5 * sign;
        }

        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let a = embedder.embed("Fix the login bug").unwrap();
        let b = embedder.embed("fix the LOGIN bug").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let query = embedder.embed("database migration schema").unwrap();
        let near = embedder.embed("write the database schema migration").unwrap();
        let far = embedder.embed("css button colour tweak").unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_rejects_empty_and_zero_dims() {
        let embedder = HashingEmbedder::new(8).unwrap();
        assert!(matches!(embedder.embed("  ... "), Err(EmbeddingError::Empty)));
        assert!(HashingEmbedder::new(0).is_err());
    }
}
