pub mod scheduler;
pub mod stats;
