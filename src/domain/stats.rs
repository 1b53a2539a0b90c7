use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::item::Reason;

/// Aggregate classification counters shared by every scan instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total_processed: u64,
    pub total_hidden: u64,
    pub hidden_by_blocked_keyword: u64,
    pub hidden_by_focus_mode: u64,
    pub hidden_by_subreddit: u64,
    pub hidden_by_user: u64,
    pub shown: u64,
}

impl Stats {
    /// Counts one classification outcome.
    pub fn apply(&mut self, reason: Reason) {
        self.total_processed += 1;
        let slot = match reason {
            Reason::None => {
                self.shown += 1;
                return;
            }
            Reason::BlockedKeyword => &mut self.hidden_by_blocked_keyword,
            Reason::FocusMode => &mut self.hidden_by_focus_mode,
            Reason::BlockedSubreddit => &mut self.hidden_by_subreddit,
            Reason::BlockedUser => &mut self.hidden_by_user,
        };
        *slot += 1;
        self.total_hidden += 1;
    }

    pub fn hidden_by_sum(&self) -> u64 {
        self.hidden_by_blocked_keyword
            + self.hidden_by_focus_mode
            + self.hidden_by_subreddit
            + self.hidden_by_user
    }

    /// `totalProcessed == totalHidden + shown` and the per-reason counters
    /// add up to `totalHidden`.
    pub fn is_consistent(&self) -> bool {
        self.total_processed == self.total_hidden + self.shown
            && self.total_hidden == self.hidden_by_sum()
    }

    /// Missing counters read as zero; a document of the wrong shape reads as
    /// a fresh record.
    pub fn from_document(document: &Value) -> Self {
        serde_json::from_value(document.clone()).unwrap_or_else(|err| {
            tracing::warn!(target: "stats", error = %err, "stored stats unreadable; starting from zero");
            Stats::default()
        })
    }
}
