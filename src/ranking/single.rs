//! Scoring steps for results from a single source. Each function is a pure
//! in-place transform so the pipeline can compose them differently for the
//! hybrid and lexical-only paths.

use std::collections::{HashMap, HashSet};

use crate::models::{RankingWeights, SearchResult};

/// Keep the first occurrence per `(url, title)`. Different keywords routinely
/// surface the same page; the earliest hit keeps the best native rank.
pub fn dedup_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert((r.url.clone(), r.title.clone())))
        .collect()
}

/// Copy similarity scores (doc id → score) onto results. Ids without a score
/// keep `vector_score = 0`.
pub fn apply_vector_scores(results: &mut [SearchResult], scores: &HashMap<String, f32>) {
    for r in results.iter_mut() {
        if let Some(score) = scores.get(&r.id) {
            r.vector_score = *score;
        }
    }
}

/// Weighted lexical/vector combination, in place.
pub fn combine_scores(results: &mut [SearchResult], weights: RankingWeights) {
    for r in results.iter_mut() {
        r.combined_score = weights.lexical * r.lexical_score + weights.vector * r.vector_score;
    }
}

/// Degraded path when no vector index is available: score purely by native
/// rank so order within a keyword's results is preserved exactly.
pub fn apply_lexical_ranking(results: &mut [SearchResult]) {
    for r in results.iter_mut() {
        r.vector_score = 0.0;
        r.combined_score = SearchResult::lexical_score_for_rank(r.original_rank);
    }
}

/// Sort by combined score descending, assign 1-based `final_rank`, truncate.
pub fn rank_and_limit(results: &mut Vec<SearchResult>, top: usize) {
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top);
    for (i, r) in results.iter_mut().enumerate() {
        r.final_rank = i + 1;
    }
}
