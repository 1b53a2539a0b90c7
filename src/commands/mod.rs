pub mod message;
pub mod service;
pub mod summary;

pub use message::{Command, CommandResponse};
pub use service::{CommandError, CommandService};
pub use summary::{FilterStatus, RuleSummary};
