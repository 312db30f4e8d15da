pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// How equal scores are ordered relative to each other. Both retrieval
/// stages rank stably: corpus order for the lexical shortlist, shortlist
/// order for the rerank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Earlier input position wins.
    #[default]
    InputOrder,
}

/// Indices of the `k` highest scores, best first, equal scores ordered by
/// `tie_break`. Returns every index when `k` exceeds the input length.
pub fn rank_top_k(scores: &[f32], k: usize, tie_break: TieBreak) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .total_cmp(&scores[a])
            .then_with(|| match tie_break {
                TieBreak::InputOrder => a.cmp(&b),
            })
    });
    order.truncate(k);
    order
}
