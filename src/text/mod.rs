//! Text analysis for article tagging and recommendation.
//!
//! - [`tokenize`]: split text into lowercase words, CJK runs into bigrams
//! - [`extract_tags`]: the most frequent non-stopword words of an article
//! - [`cosine_similarity`] / [`rank_similar`]: compare keyword maps

mod keywords;
mod similarity;
mod stopwords;
mod tokenize;

pub use keywords::{extract_tags, html_text, most_common, TagMap, TagOptions};
pub use similarity::{cosine_similarity, rank_similar};
pub use stopwords::is_stopword;
pub use tokenize::tokenize;
