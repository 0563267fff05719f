use tracing::warn;

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `None` when the vectors have different dimensions (they come from
/// different oracle versions and cannot be compared) and `0.0` when either
/// vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        warn!(
            a_len = a.len(),
            b_len = b.len(),
            "embedding dimension mismatch; similarity unavailable"
        );
        return None;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}
