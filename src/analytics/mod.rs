//! Windowed aggregation, trend detection and reporting

pub mod aggregator;
pub mod summary;
pub mod trends;
pub mod window;

pub use aggregator::Aggregator;
pub use summary::{EntityTotals, Summary};
pub use trends::{rank, TrendDetector, TrendError, TrendSignal};
pub use window::{
    AggregateWindow, EngagementTotals, FoldOutcome, SentimentDistribution, WindowKey, WindowSpec,
    TOP_INFLUENCERS,
};
