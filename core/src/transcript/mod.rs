/// Transcript storage and merge-time deduplication
pub mod dedup;
pub mod store;

pub use store::{MergeReport, Transcript};
