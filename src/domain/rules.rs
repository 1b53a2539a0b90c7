use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Locations a keyword list may be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchIn {
    pub title: bool,
    pub content: bool,
    pub author: bool,
}

impl MatchIn {
    pub const fn new(title: bool, content: bool, author: bool) -> Self {
        Self {
            title,
            content,
            author,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeConfig {
    pub enabled: bool,
    pub keep_seen_titles_count: u32,
}

/// The full persisted filtering configuration.
///
/// Domains, flairs, score, age and dedupe settings are stored and editable but
/// not consulted by the classifier yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub enabled: bool,
    pub blocked_keywords: Vec<String>,
    pub blocked_keywords_match_in: MatchIn,
    pub blocked_domains: Vec<String>,
    pub blocked_users: Vec<String>,
    pub blocked_subreddits: Vec<String>,
    pub blocked_flairs: Vec<String>,
    pub min_score: Option<f64>,
    pub max_age_hours: Option<f64>,
    pub dedupe: DedupeConfig,
    /// Milliseconds since the unix epoch.
    pub paused_until: Option<i64>,
    pub focus_keywords: Vec<String>,
    pub focus_mode_enabled: bool,
    pub focus_keywords_match_in: MatchIn,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_keywords: Vec::new(),
            blocked_keywords_match_in: MatchIn::new(true, true, false),
            blocked_domains: Vec::new(),
            blocked_users: Vec::new(),
            blocked_subreddits: Vec::new(),
            blocked_flairs: Vec::new(),
            min_score: None,
            max_age_hours: None,
            dedupe: DedupeConfig {
                enabled: true,
                keep_seen_titles_count: 500,
            },
            paused_until: None,
            focus_keywords: Vec::new(),
            focus_mode_enabled: false,
            focus_keywords_match_in: MatchIn::new(true, true, true),
        }
    }
}

/// The editable string lists of a [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleList {
    BlockedKeywords,
    BlockedDomains,
    BlockedUsers,
    BlockedSubreddits,
    BlockedFlairs,
    FocusKeywords,
}

impl RuleList {
    pub const ALL: [RuleList; 6] = [
        RuleList::BlockedKeywords,
        RuleList::BlockedDomains,
        RuleList::BlockedUsers,
        RuleList::BlockedSubreddits,
        RuleList::BlockedFlairs,
        RuleList::FocusKeywords,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RuleList::BlockedKeywords => "blockedKeywords",
            RuleList::BlockedDomains => "blockedDomains",
            RuleList::BlockedUsers => "blockedUsers",
            RuleList::BlockedSubreddits => "blockedSubreddits",
            RuleList::BlockedFlairs => "blockedFlairs",
            RuleList::FocusKeywords => "focusKeywords",
        }
    }

    /// Accepts the document field name (`blockedKeywords`) or the short
    /// forms used by the bot (`keyword`, `user`, `sub`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim();
        if let Some(list) = Self::ALL.iter().find(|list| list.name() == key) {
            return Some(*list);
        }
        match key.to_ascii_lowercase().as_str() {
            "keyword" | "keywords" => Some(RuleList::BlockedKeywords),
            "domain" | "domains" => Some(RuleList::BlockedDomains),
            "user" | "users" => Some(RuleList::BlockedUsers),
            "sub" | "subreddit" | "subreddits" => Some(RuleList::BlockedSubreddits),
            "flair" | "flairs" => Some(RuleList::BlockedFlairs),
            "focus" => Some(RuleList::FocusKeywords),
            _ => None,
        }
    }
}

impl RuleSet {
    pub fn list(&self, list: RuleList) -> &[String] {
        match list {
            RuleList::BlockedKeywords => &self.blocked_keywords,
            RuleList::BlockedDomains => &self.blocked_domains,
            RuleList::BlockedUsers => &self.blocked_users,
            RuleList::BlockedSubreddits => &self.blocked_subreddits,
            RuleList::BlockedFlairs => &self.blocked_flairs,
            RuleList::FocusKeywords => &self.focus_keywords,
        }
    }

    pub fn list_mut(&mut self, list: RuleList) -> &mut Vec<String> {
        match list {
            RuleList::BlockedKeywords => &mut self.blocked_keywords,
            RuleList::BlockedDomains => &mut self.blocked_domains,
            RuleList::BlockedUsers => &mut self.blocked_users,
            RuleList::BlockedSubreddits => &mut self.blocked_subreddits,
            RuleList::BlockedFlairs => &mut self.blocked_flairs,
            RuleList::FocusKeywords => &mut self.focus_keywords,
        }
    }

    /// Whether rules should be applied at `now_ms`.
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.paused_until {
            Some(until) => now_ms >= until,
            None => true,
        }
    }

    /// Builds a complete rule set from a persisted, possibly partial or
    /// outdated, document.
    ///
    /// Top-level keys replace the defaults. Object-valued defaults
    /// (`*MatchIn`, `dedupe`) are merged one level deep so a document written
    /// before a sub-field existed still gets that sub-field's default. `null`
    /// values and keys whose value has the wrong shape keep the default.
    pub fn from_document(document: &Value) -> Self {
        let defaults = RuleSet::default();
        let Some(stored) = document.as_object() else {
            tracing::warn!(target: "rules", "stored rules are not an object; using defaults");
            return defaults;
        };
        let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
            return defaults;
        };

        for (key, value) in stored {
            if value.is_null() {
                continue;
            }
            let candidate = match (merged.get(key), value) {
                (Some(Value::Object(base)), Value::Object(overlay)) => {
                    Value::Object(merge_one_level(base, overlay))
                }
                _ => value.clone(),
            };
            let previous = merged.insert(key.clone(), candidate);
            if serde_json::from_value::<RuleSet>(Value::Object(merged.clone())).is_err() {
                tracing::warn!(target: "rules", key = %key, "ignoring malformed stored rule field");
                match previous {
                    Some(previous) => {
                        merged.insert(key.clone(), previous);
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or(defaults)
    }
}

fn merge_one_level(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        if !value.is_null() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(RuleSet::from_document(&json!({})), RuleSet::default());
        assert_eq!(RuleSet::from_document(&json!("garbage")), RuleSet::default());
    }

    #[test]
    fn old_shaped_match_in_keeps_new_sub_fields() {
        let stored = json!({
            "blockedKeywords": ["politics"],
            "blockedKeywordsMatchIn": { "title": false }
        });
        let rules = RuleSet::from_document(&stored);
        assert_eq!(rules.blocked_keywords, vec!["politics".to_string()]);
        assert_eq!(rules.blocked_keywords_match_in, MatchIn::new(false, true, false));
        assert_eq!(rules.focus_keywords_match_in, MatchIn::new(true, true, true));
        assert_eq!(rules.dedupe.keep_seen_titles_count, 500);
    }

    #[test]
    fn malformed_fields_fall_back_to_defaults() {
        let stored = json!({
            "enabled": "yes",
            "blockedUsers": ["spez"],
            "pausedUntil": null,
            "focusModeEnabled": true
        });
        let rules = RuleSet::from_document(&stored);
        assert!(rules.enabled);
        assert!(rules.focus_mode_enabled);
        assert_eq!(rules.blocked_users, vec!["spez".to_string()]);
        assert_eq!(rules.paused_until, None);
    }

    #[test]
    fn serializes_with_document_field_names() {
        let value = serde_json::to_value(RuleSet::default()).unwrap();
        assert_eq!(value["blockedKeywordsMatchIn"]["author"], json!(false));
        assert_eq!(value["dedupe"]["keepSeenTitlesCount"], json!(500));
        assert_eq!(value["pausedUntil"], Value::Null);
    }

    #[test]
    fn pause_gates_activity() {
        let rules = RuleSet {
            paused_until: Some(1_000),
            ..RuleSet::default()
        };
        assert!(!rules.is_active_at(999));
        assert!(rules.is_active_at(1_000));
        let disabled = RuleSet {
            enabled: false,
            ..RuleSet::default()
        };
        assert!(!disabled.is_active_at(0));
    }

    #[test]
    fn rule_list_parses_short_and_document_names() {
        assert_eq!(RuleList::parse("blockedFlairs"), Some(RuleList::BlockedFlairs));
        assert_eq!(RuleList::parse("Sub"), Some(RuleList::BlockedSubreddits));
        assert_eq!(RuleList::parse("minScore"), None);
    }
}
