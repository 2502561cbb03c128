//! Active-learning record matcher: MinHash LSH blocking, per-field distances,
//! a logistic regression pair classifier and match-graph clustering.

pub mod classifier;
pub mod dedup;
pub mod distance;
pub mod lsh;
pub mod matcher;

pub use matcher::{ActiveLearner, ActiveMatcher};
