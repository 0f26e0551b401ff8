//! Per-instrument streaming estimators the Coordinator consults when
//! building orders: the linear-regression trend channel and the
//! support/resistance band aggregator.

pub mod lrc;
pub mod sr;

pub use lrc::{LrcConfig, LrcEstimator, LrcRegistry, LrcSnapshot, TrendState};
pub use sr::{DepthSample, DepthSide, RepPoint, SrAggregator, SrConfig, SrRegistry, SrSnapshot};
