//! Embedding blob codec and cosine similarity.
//!
//! Vectors are packed as little-endian f32, one float per dimension, no
//! header: the dimension is implicit from `blob.len() / 4`.

use crate::error::{Error, Result};

/// Serialize a vector to a storage blob.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a storage blob back into a vector.
///
/// Fails with `Error::Codec` if the blob length is not a multiple of 4.
pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::codec(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().expect("chunks_exact yields 4-byte chunks");
            f32::from_le_bytes(arr)
        })
        .collect())
}

/// Cosine similarity as a total function.
///
/// Returns 0.0 when either vector is absent, when the lengths differ, or
/// when either norm is zero; otherwise the standard cosine in [-1, 1].
pub fn cosine_similarity(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0.0,
    };
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
