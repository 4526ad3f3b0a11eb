//! Vector helpers shared by the in-memory and SQLite vector indexes.
//!
//! Similarity and distance follow the convention used throughout the
//! pipeline: `distance = 1 − cosine_similarity`, so a distance of `0.0`
//! means identical direction and relevance filtering can recover
//! similarity as `1 − distance`.

/// Cosine similarity between two embedding vectors, in `[-1.0, 1.0]`.
///
/// Degenerate inputs (empty, mismatched lengths, zero magnitude) return
/// `0.0` rather than an error — a useless score, not a failed search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Cosine distance: `1 − cosine_similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}

/// Encode an embedding as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a BLOB written by [`vec_to_blob`] back into an embedding.
/// Trailing bytes that do not fill a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
