// Engagement metrics: buffered visit counting, the cross-instance flush
// lease, the quality score function and its periodic refresh pass.

pub mod handlers;
pub mod lease;
pub mod refresh;
pub mod scoring;
pub mod visits;
