pub mod enrich;
pub mod gravity;
pub mod metrics;
pub mod threshold;

pub use enrich::{fetch_snapshot, EnrichmentOptions};
pub use threshold::assess_latest;
