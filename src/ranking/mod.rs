pub mod combine;
pub mod single;

pub use combine::{combine, CombineOptions};
pub use single::{
    apply_lexical_ranking, apply_vector_scores, combine_scores, dedup_results, rank_and_limit,
};
