// Reciprocal-rank fusion

use std::collections::HashMap;

/// One entry of a fused ranking. Ranks are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub file_hash: String,
    pub score: f64,
    pub keyword_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

/// score = sum over lists of 1 / (k + rank). A list that does not contain an
/// item contributes nothing. Sorted by score descending, then file_hash.
pub fn reciprocal_rank_fusion<S: AsRef<str>>(keyword: &[S], semantic: &[S], k: f64) -> Vec<Fused> {
    let mut fused: HashMap<&str, Fused> = HashMap::new();

    for (list, is_keyword) in [(keyword, true), (semantic, false)] {
        for (i, hash) in list.iter().enumerate() {
            let hash = hash.as_ref();
            let rank = i + 1;
            let entry = fused.entry(hash).or_insert_with(|| Fused {
                file_hash: hash.to_string(),
                score: 0.0,
                keyword_rank: None,
                semantic_rank: None,
            });
            let slot = if is_keyword { &mut entry.keyword_rank } else { &mut entry.semantic_rank };
            // A repeated hash keeps its best rank
            if slot.is_none() {
                *slot = Some(rank);
                entry.score += 1.0 / (k + rank as f64);
            }
        }
    }

    let mut out: Vec<Fused> = fused.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.file_hash.cmp(&b.file_hash))
    });
    out
}
