//! Vector similarity and ranking

use super::entities::RetrievedChunk;
use std::cmp::Ordering;

/// Cosine similarity of two vectors. Mismatched lengths and zero vectors
/// score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
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
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Sort by score descending, most recently ingested first on ties, and keep
/// the top `k`.
pub fn rank_chunks(mut chunks: Vec<RetrievedChunk>, k: usize) -> Vec<RetrievedChunk> {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.seq.cmp(&a.seq))
    });
    chunks.truncate(k);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::scope::Scope;

    fn hit(doc: &str, score: f32, seq: u64) -> RetrievedChunk {
        RetrievedChunk {
            document_id: doc.to_string(),
            text: String::new(),
            scope: Scope::Global,
            score,
            seq,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_ties_prefer_most_recent() {
        let ranked = rank_chunks(
            vec![hit("old", 0.5, 1), hit("best", 0.9, 0), hit("new", 0.5, 7)],
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "new", "old"]);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let ranked = rank_chunks(vec![hit("a", 0.1, 0), hit("b", 0.2, 1)], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].document_id, "b");
    }
}
