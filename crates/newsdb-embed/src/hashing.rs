use std::hash::Hasher;

use twox_hash::XxHash64;

use newsdb_core::traits::Embedder;
use newsdb_core::{Error, Result};

/// Feature-hashing embedder: each lowercased word and adjacent word pair is
/// hashed into a signed bucket, then the vector is L2-normalised. Texts that
/// share vocabulary end up close under cosine similarity.
pub struct HashingEmbedder {
    dim: usize,
    model_version: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        Ok(Self { dim, model_version: format!("hash:xxh64:d{dim}") })
    }

    fn bucket(&self, feature: &str, weight: f32, v: &mut [f32]) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(feature.as_bytes());
        let h = hasher.finish();
        let idx = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        for w in &words {
            self.bucket(w, 1.0, &mut v);
        }
        for pair in words.windows(2) {
            self.bucket(&format!("{} {}", pair[0], pair[1]), 0.5, &mut v);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
