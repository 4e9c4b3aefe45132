//! Cross-source combination of two ranked result sets.
//!
//! The two sources score on incompatible scales (BM25-style relevance vs
//! rank-derived reciprocal scores), so scores are min-max normalized over the
//! pooled set before weighting. One pathological state is detected explicitly:
//! a source whose vector scores are uniformly zero while the other's are
//! populated. Normalizing across that pool would silently starve the zeroed
//! source, so combination switches to an equal-representation fallback
//! instead.

use crate::models::{RankedResult, RankingWeights, SearchResult, SourceType};

#[derive(Debug, Clone, Copy)]
pub struct CombineOptions {
    pub top: usize,
    pub weights: RankingWeights,
    pub wiki_boost: f32,
    pub index_boost: f32,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            top: 10,
            weights: RankingWeights::default(),
            wiki_boost: 1.1,
            index_boost: 1.0,
        }
    }
}

impl CombineOptions {
    fn boost_for(&self, source: SourceType) -> f32 {
        match source {
            SourceType::KeywordIndex => self.index_boost,
            SourceType::WikiConnector => self.wiki_boost,
        }
    }
}

/// Raw signals extracted from one result before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedScores {
    /// Best available semantic signal, `None` when the result has none.
    pub vector: Option<f32>,
    pub lexical: f32,
}

/// Pull the best available signals off a result. Vector priority: semantic
/// reranker score, then computed similarity. Exactly zero is the "never
/// scored" sentinel; negative cosine similarities are real scores and must
/// survive, min-max normalization handles them. Lexical priority: native
/// engine score, then the rank-derived score.
pub fn extract_scores(result: &SearchResult) -> ExtractedScores {
    let vector = result.reranker_score.or_else(|| {
        (result.vector_score != 0.0).then_some(result.vector_score)
    });
    let lexical = result.search_score.unwrap_or_else(|| {
        if result.lexical_score > 0.0 {
            result.lexical_score
        } else {
            SearchResult::lexical_score_for_rank(result.original_rank)
        }
    });
    ExtractedScores { vector, lexical }
}

/// Whether any result in the set carries a usable vector signal.
pub fn vector_scores_usable(results: &[SearchResult]) -> bool {
    results.iter().any(|r| extract_scores(r).vector.is_some())
}

/// Combine two sources' results into one ranked list of at most `opts.top`.
pub fn combine(
    a: Vec<SearchResult>,
    b: Vec<SearchResult>,
    opts: &CombineOptions,
) -> Vec<RankedResult> {
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }

    if !a.is_empty() && !b.is_empty() {
        let usable_a = vector_scores_usable(&a);
        let usable_b = vector_scores_usable(&b);
        if usable_a != usable_b {
            let starved = if usable_a { &b } else { &a };
            tracing::warn!(
                "Vector score imbalance: {} results from {} have no vector signal; \
                 using equal-representation fallback",
                starved.len(),
                starved[0].source_type.tag()
            );
            return equal_representation(a, b, opts.top);
        }
    }

    let pooled: Vec<SearchResult> = a.into_iter().chain(b).collect();
    let extracted: Vec<ExtractedScores> = pooled.iter().map(extract_scores).collect();

    let vector_norm = Normalizer::over(extracted.iter().filter_map(|e| e.vector));
    let lexical_norm = Normalizer::over(extracted.iter().map(|e| e.lexical));

    let mut ranked: Vec<RankedResult> = pooled
        .into_iter()
        .zip(extracted)
        .map(|(result, scores)| {
            let normalized_vector = scores.vector.map(|v| vector_norm.apply(v)).unwrap_or(0.0);
            let normalized_lexical = lexical_norm.apply(scores.lexical);
            let boost = opts.boost_for(result.source_type);
            let combined = (opts.weights.lexical * normalized_lexical
                + opts.weights.vector * normalized_vector)
                * boost;
            RankedResult {
                result,
                combined_score: combined,
                final_rank: 0,
                normalized_vector_score: normalized_vector,
                normalized_lexical_score: normalized_lexical,
                source_boost: boost,
                fallback_mode: false,
            }
        })
        .collect();

    ranked.sort_by(|x, y| {
        y.combined_score
            .partial_cmp(&x.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(opts.top);
    for (i, r) in ranked.iter_mut().enumerate() {
        r.final_rank = i + 1;
    }
    ranked
}

/// Fallback for the vector-imbalance defect: the top ⌈N/2⌉ of `a` and top
/// ⌊N/2⌋ of `b` in their native order, interleaved a,b,a,b. When one side
/// runs short the other fills the remainder.
fn equal_representation(
    a: Vec<SearchResult>,
    b: Vec<SearchResult>,
    top: usize,
) -> Vec<RankedResult> {
    let take_a = top.div_ceil(2).min(a.len());
    let take_b = (top - take_a).min(b.len());
    // When one side runs short, give its unused slots to the other
    let take_a = (top - take_b).min(a.len());

    let mut iter_a = a.into_iter().take(take_a);
    let mut iter_b = b.into_iter().take(take_b);
    let mut merged: Vec<SearchResult> = Vec::with_capacity(take_a + take_b);
    loop {
        match (iter_a.next(), iter_b.next()) {
            (None, None) => break,
            (x, y) => {
                merged.extend(x);
                merged.extend(y);
            }
        }
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(i, result)| RankedResult {
            result,
            // Synthetic monotone score, positional only
            combined_score: SearchResult::lexical_score_for_rank(i + 1),
            final_rank: i + 1,
            normalized_vector_score: 0.0,
            normalized_lexical_score: 0.0,
            source_boost: 1.0,
            fallback_mode: true,
        })
        .collect()
}

/// Min-max normalization over one signal of the pooled set. A degenerate pool
/// (empty, or all values equal) maps everything to a neutral 0.5 so the other
/// signal decides.
struct Normalizer {
    min: f32,
    range: f32,
}

impl Normalizer {
    fn over(values: impl Iterator<Item = f32>) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for v in values {
            min = min.min(v);
            max = max.max(v);
        }
        Self {
            min,
            range: max - min,
        }
    }

    fn apply(&self, value: f32) -> f32 {
        if !self.range.is_finite() || self.range <= f32::EPSILON {
            return 0.5;
        }
        ((value - self.min) / self.range).clamp(0.0, 1.0)
    }
}
