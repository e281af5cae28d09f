// Embeddings module
// Text-to-vector gateway and weighted combination of multiple texts


pub mod client;

pub use client::EmbeddingClient;

use crate::{RecsError, Result};

/// Anything that can turn text into a fixed-dimension vector. The HTTP
/// client is the production implementation; tests substitute deterministic
/// stubs.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Combines several `(text, weight)` parts into one vector.
///
/// Missing or blank texts and non-finite weights are skipped. Surviving
/// parts are accumulated as `base * weight` and the sum is divided by the
/// sum of the surviving weights, so a single part comes back as its base
/// vector and equal-weight parts average.
#[inline]
pub fn embed_weighted(embedder: &dyn Embedder, parts: &[(Option<&str>, f32)]) -> Result<Vec<f32>> {
    let mut combined = vec![0.0_f32; embedder.dimension()];
    let mut weight_sum = 0.0_f32;

    for (text, weight) in parts {
        let Some(text) = text else { continue };
        if text.trim().is_empty() || !weight.is_finite() {
            continue;
        }

        let base = embedder.embed(text)?;
        if base.len() != combined.len() {
            return Err(RecsError::Embedding(format!(
                "Embedder returned {} dimensions, expected {}",
                base.len(),
                combined.len()
            )));
        }

        for (acc, value) in combined.iter_mut().zip(base.iter()) {
            *acc += value * weight;
        }
        weight_sum += weight;
    }

    if weight_sum == 0.0 {
        return Err(RecsError::Embedding(
            "No embeddable text in weighted parts".to_string(),
        ));
    }

    for value in &mut combined {
        *value /= weight_sum;
    }

    Ok(combined)
}
