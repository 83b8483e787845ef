pub mod criteria;
pub mod two_stage;

pub use criteria::{Candidate, SegmentVectors, VectorSearchCriteria};
pub use two_stage::TwoStageRescorer;

#[cfg(test)]
mod tests;
