pub mod fast;
pub mod schema;
pub mod slow;

pub use fast::build_fast_report;
pub use schema::MarketReport;
pub use slow::{calculate_slow_metrics, enrich_report, SlowMetrics};
