use chrono::{DateTime, Utc};

use crate::domain::{Decision, MatchIn, NormalizedItem, Reason, RuleSet};

/// Decides whether `item` should be hidden under `rules` at `now`.
///
/// Rules are checked in priority order and the first match wins: blocked
/// keywords, focus mode, blocked subreddits, blocked users. Absent fields
/// never match.
pub fn classify(item: &NormalizedItem, rules: &RuleSet, now: DateTime<Utc>) -> Decision {
    if !rules.is_active_at(now.timestamp_millis()) {
        return Decision::SHOW;
    }

    let fields = ItemFields::new(item);

    if !rules.blocked_keywords.is_empty()
        && fields.any_location_matches(rules.blocked_keywords_match_in, &rules.blocked_keywords)
    {
        return Decision::hide(Reason::BlockedKeyword);
    }

    if rules.focus_mode_enabled
        && !rules.focus_keywords.is_empty()
        && !fields.any_location_matches(rules.focus_keywords_match_in, &rules.focus_keywords)
    {
        return Decision::hide(Reason::FocusMode);
    }

    if let Some(subreddit) = fields.subreddit.as_deref() {
        if matches_entry(subreddit, &rules.blocked_subreddits) {
            return Decision::hide(Reason::BlockedSubreddit);
        }
    }

    if let Some(author) = fields.author.as_deref() {
        if matches_entry(author, &rules.blocked_users) {
            return Decision::hide(Reason::BlockedUser);
        }
    }

    Decision::SHOW
}

struct ItemFields<'a> {
    title: &'a str,
    content: &'a str,
    author: Option<String>,
    subreddit: Option<String>,
}

impl<'a> ItemFields<'a> {
    fn new(item: &'a NormalizedItem) -> Self {
        Self {
            title: item.title.as_deref().unwrap_or(""),
            content: item.content.as_deref().unwrap_or(""),
            author: normalize(item.author.as_deref()),
            subreddit: normalize(item.subreddit.as_deref()),
        }
    }

    fn any_location_matches(&self, locations: MatchIn, keywords: &[String]) -> bool {
        (locations.title && contains_any_keyword(self.title, keywords))
            || (locations.content && contains_any_keyword(self.content, keywords))
            || (locations.author
                && self
                    .author
                    .as_deref()
                    .is_some_and(|author| contains_any_keyword(author, keywords)))
    }
}

/// Lowercased and trimmed; blank input becomes `None`.
fn normalize(raw: Option<&str>) -> Option<String> {
    raw.map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

fn contains_any_keyword(text: &str, keywords: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .filter(|keyword| !keyword.trim().is_empty())
        .any(|keyword| haystack.contains(&keyword.to_lowercase()))
}

fn matches_entry(value: &str, entries: &[String]) -> bool {
    entries
        .iter()
        .filter_map(|entry| normalize(Some(entry)))
        .any(|entry| entry == value)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn item(title: &str, content: &str, subreddit: &str, author: &str) -> NormalizedItem {
        NormalizedItem {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            subreddit: Some(subreddit.to_string()),
            author: Some(author.to_string()),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn blocked_keyword_in_title_hides() {
        let rules = RuleSet {
            blocked_keywords: strings(&["politics"]),
            blocked_keywords_match_in: MatchIn::new(true, true, false),
            ..RuleSet::default()
        };
        let post = item("Daily politics roundup", "", "news", "bob");
        assert_eq!(
            classify(&post, &rules, Utc::now()),
            Decision::hide(Reason::BlockedKeyword)
        );
    }

    #[test]
    fn focus_mode_hides_off_topic_items() {
        let rules = RuleSet {
            focus_mode_enabled: true,
            focus_keywords: strings(&["rust"]),
            focus_keywords_match_in: MatchIn::new(true, true, true),
            ..RuleSet::default()
        };
        let off_topic = item("New JS framework", "", "programming", "x");
        assert_eq!(
            classify(&off_topic, &rules, Utc::now()),
            Decision::hide(Reason::FocusMode)
        );
        let on_topic = item("Rust 1.80 released", "", "programming", "x");
        assert_eq!(classify(&on_topic, &rules, Utc::now()), Decision::SHOW);
    }

    #[test]
    fn blocked_subreddit_is_case_insensitive() {
        let rules = RuleSet {
            blocked_subreddits: strings(&["news"]),
            ..RuleSet::default()
        };
        let post = item("Anything", "", "News", "bob");
        assert_eq!(
            classify(&post, &rules, Utc::now()),
            Decision::hide(Reason::BlockedSubreddit)
        );
    }

    #[test]
    fn inactive_rules_never_hide() {
        let strict = RuleSet {
            blocked_keywords: strings(&["a", "e", "o"]),
            blocked_users: strings(&["bob"]),
            blocked_subreddits: strings(&["news"]),
            focus_mode_enabled: true,
            focus_keywords: strings(&["zzz"]),
            ..RuleSet::default()
        };
        let now = Utc::now();
        let disabled = RuleSet {
            enabled: false,
            ..strict.clone()
        };
        let paused = RuleSet {
            paused_until: Some((now + Duration::minutes(30)).timestamp_millis()),
            ..strict.clone()
        };
        let post = item("a post about everything", "more", "news", "bob");
        assert_eq!(classify(&post, &disabled, now), Decision::SHOW);
        assert_eq!(classify(&post, &paused, now), Decision::SHOW);
        assert_eq!(classify(&NormalizedItem::default(), &paused, now), Decision::SHOW);

        let expired = RuleSet {
            paused_until: Some((now - Duration::minutes(1)).timestamp_millis()),
            ..strict
        };
        assert!(classify(&post, &expired, now).hide);
    }

    #[test]
    fn blocked_keyword_beats_focus_match() {
        let rules = RuleSet {
            blocked_keywords: strings(&["drama"]),
            focus_mode_enabled: true,
            focus_keywords: strings(&["rust"]),
            ..RuleSet::default()
        };
        let post = item("Rust drama again", "", "rust", "x");
        assert_eq!(
            classify(&post, &rules, Utc::now()),
            Decision::hide(Reason::BlockedKeyword)
        );
    }

    #[test]
    fn focus_mode_without_keywords_hides_nothing() {
        let rules = RuleSet {
            focus_mode_enabled: true,
            ..RuleSet::default()
        };
        assert_eq!(
            classify(&item("anything", "", "pics", "x"), &rules, Utc::now()),
            Decision::SHOW
        );
        assert_eq!(classify(&NormalizedItem::default(), &rules, Utc::now()), Decision::SHOW);
    }

    #[test]
    fn disabled_title_location_is_ignored() {
        let rules = RuleSet {
            blocked_keywords: strings(&["politics"]),
            blocked_keywords_match_in: MatchIn::new(false, true, false),
            ..RuleSet::default()
        };
        let title_only = item("politics thread", "nothing here", "news", "bob");
        assert_eq!(classify(&title_only, &rules, Utc::now()), Decision::SHOW);
        let in_body = item("thread", "all about POLITICS", "news", "bob");
        assert_eq!(
            classify(&in_body, &rules, Utc::now()),
            Decision::hide(Reason::BlockedKeyword)
        );
    }

    #[test]
    fn author_location_matches_normalized_author() {
        let rules = RuleSet {
            blocked_keywords: strings(&["bot"]),
            blocked_keywords_match_in: MatchIn::new(false, false, true),
            ..RuleSet::default()
        };
        let post = item("hello", "", "pics", "  AutoModeratorBot ");
        assert_eq!(
            classify(&post, &rules, Utc::now()),
            Decision::hide(Reason::BlockedKeyword)
        );
    }

    #[test]
    fn focus_mode_treats_missing_author_as_no_match() {
        let rules = RuleSet {
            focus_mode_enabled: true,
            focus_keywords: strings(&["ferris"]),
            focus_keywords_match_in: MatchIn::new(false, false, true),
            ..RuleSet::default()
        };
        let post = NormalizedItem {
            title: Some("ferris".into()),
            ..NormalizedItem::default()
        };
        assert_eq!(
            classify(&post, &rules, Utc::now()),
            Decision::hide(Reason::FocusMode)
        );
    }

    #[test]
    fn blocked_user_requires_exact_match() {
        let rules = RuleSet {
            blocked_users: strings(&[" Spez ", ""]),
            ..RuleSet::default()
        };
        assert_eq!(
            classify(&item("t", "", "pics", "spez"), &rules, Utc::now()),
            Decision::hide(Reason::BlockedUser)
        );
        assert_eq!(
            classify(&item("t", "", "pics", "spez2"), &rules, Utc::now()),
            Decision::SHOW
        );
        assert_eq!(
            classify(&item("t", "", "pics", ""), &rules, Utc::now()),
            Decision::SHOW
        );
    }

    #[test]
    fn subreddit_rule_precedes_user_rule() {
        let rules = RuleSet {
            blocked_users: strings(&["bob"]),
            blocked_subreddits: strings(&["news"]),
            ..RuleSet::default()
        };
        assert_eq!(
            classify(&item("t", "", "news", "bob"), &rules, Utc::now()),
            Decision::hide(Reason::BlockedSubreddit)
        );
    }

    #[test]
    fn blank_keywords_do_not_match_everything() {
        let rules = RuleSet {
            blocked_keywords: strings(&["", "   "]),
            ..RuleSet::default()
        };
        assert_eq!(
            classify(&item("anything", "at all", "pics", "x"), &rules, Utc::now()),
            Decision::SHOW
        );
    }
}
