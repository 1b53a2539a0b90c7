pub mod item;
pub mod rules;
pub mod stats;

pub use item::{Decision, NormalizedItem, Reason};
pub use rules::{MatchIn, RuleList, RuleSet};
pub use stats::Stats;
