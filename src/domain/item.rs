use serde::{Deserialize, Serialize};

/// Structured fields extracted from one feed entry. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub title: Option<String>,
    pub content: Option<String>,
    pub subreddit: Option<String>,
    pub author: Option<String>,
}

/// Why an item was hidden. `None` means it was shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reason {
    #[default]
    None,
    BlockedKeyword,
    FocusMode,
    BlockedSubreddit,
    BlockedUser,
}

impl Reason {
    pub fn label(&self) -> &'static str {
        match self {
            Reason::None => "none",
            Reason::BlockedKeyword => "blockedKeyword",
            Reason::FocusMode => "focusMode",
            Reason::BlockedSubreddit => "blockedSubreddit",
            Reason::BlockedUser => "blockedUser",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub hide: bool,
    pub reason: Reason,
}

impl Decision {
    pub const SHOW: Decision = Decision {
        hide: false,
        reason: Reason::None,
    };

    pub const fn hide(reason: Reason) -> Self {
        Self { hide: true, reason }
    }
}
