pub mod kv;
pub mod memory;
pub mod rules;
pub mod sqlite;
pub mod stats;

pub use kv::{KeyChange, KvStore, StoreError};
pub use memory::MemoryKvStore;
pub use rules::{rules_from_change, RuleStore, RULES_KEY};
pub use sqlite::SqliteKvStore;
pub use stats::{StatsStore, STATS_KEY};
