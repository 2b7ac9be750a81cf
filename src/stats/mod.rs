//! Statistics about collection activity.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, CollectionStats, PersistedStats,
    SharedStats, StatsSnapshot,
};
