use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use super::message::{Command, CommandResponse};
use crate::{
    domain::{RuleList, RuleSet},
    store::{RuleStore, StoreError},
    tasks::stats::StatsAggregator,
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid command: {0}")]
    Malformed(String),
    #[error("Invalid rules object")]
    InvalidRules,
    #[error("Invalid rule type")]
    InvalidRuleType,
    #[error("Invalid value")]
    InvalidValue,
    #[error("Invalid pause duration")]
    InvalidPause,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes rule and stats commands against the shared stores.
///
/// Invalid input is answered with `success: false` before anything is
/// written.
#[derive(Clone)]
pub struct CommandService {
    rules: RuleStore,
    stats: StatsAggregator,
    default_pause: Duration,
}

impl CommandService {
    pub fn new(rules: RuleStore, stats: StatsAggregator, default_pause: Duration) -> Self {
        Self {
            rules,
            stats,
            default_pause,
        }
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub async fn handle(&self, command: Command) -> CommandResponse {
        let name = command.name();
        let mutates = command.mutates_state();
        match self.execute(command).await {
            Ok(response) => {
                if mutates {
                    tracing::info!(target: "commands", command = name, "command applied");
                }
                response
            }
            Err(err) => {
                tracing::warn!(target: "commands", command = name, error = %err, "command rejected");
                CommandResponse::failure(err.to_string())
            }
        }
    }

    /// Decodes a JSON command and answers it.
    pub async fn handle_json(&self, raw: &Value) -> CommandResponse {
        match serde_json::from_value::<Command>(raw.clone()) {
            Ok(command) => self.handle(command).await,
            Err(err) => {
                tracing::warn!(target: "commands", error = %err, "undecodable command");
                CommandResponse::failure(CommandError::Malformed(err.to_string()).to_string())
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<CommandResponse, CommandError> {
        match command {
            Command::GetRules => Ok(CommandResponse::with_rules(self.rules.load().await?)),
            Command::SaveRules { rules } => {
                if !rules.is_object() {
                    return Err(CommandError::InvalidRules);
                }
                let rules = RuleSet::from_document(&rules);
                self.rules.save(&rules).await?;
                Ok(CommandResponse::with_rules(rules))
            }
            Command::ResetRules => Ok(CommandResponse::with_rules(self.rules.reset().await?)),
            Command::SetEnabled { enabled } => {
                let rules = self.rules.update(|rules| rules.enabled = enabled).await?;
                Ok(CommandResponse::with_rules(rules))
            }
            Command::PauseFor { minutes } => {
                let pause = match minutes {
                    Some(0) => return Err(CommandError::InvalidPause),
                    Some(minutes) => Duration::from_secs(u64::from(minutes) * 60),
                    None => self.default_pause,
                };
                let pause_ms = i64::try_from(pause.as_millis()).map_err(|_| CommandError::InvalidPause)?;
                let until = Utc::now().timestamp_millis().saturating_add(pause_ms);
                let rules = self
                    .rules
                    .update(|rules| rules.paused_until = Some(until))
                    .await?;
                Ok(CommandResponse::with_rules(rules))
            }
            Command::AddRuleEntry { rule_type, value } => {
                let (list, value) = validate_entry(&rule_type, &value)?;
                let mut added = false;
                let rules = self
                    .rules
                    .update(|rules| {
                        let entries = rules.list_mut(list);
                        if !entries.iter().any(|entry| same_entry(entry, &value)) {
                            entries.push(value.clone());
                            added = true;
                        }
                    })
                    .await?;
                let response = CommandResponse::with_rules(rules);
                Ok(if added {
                    response
                } else {
                    response.message("already present")
                })
            }
            Command::RemoveRuleEntry { rule_type, value } => {
                let (list, value) = validate_entry(&rule_type, &value)?;
                let mut removed = false;
                let rules = self
                    .rules
                    .update(|rules| {
                        let entries = rules.list_mut(list);
                        let before = entries.len();
                        entries.retain(|entry| !same_entry(entry, &value));
                        removed = entries.len() != before;
                    })
                    .await?;
                let response = CommandResponse::with_rules(rules);
                Ok(if removed {
                    response
                } else {
                    response.message("not found")
                })
            }
            Command::SetFocusMode { enabled } => {
                let rules = self
                    .rules
                    .update(|rules| rules.focus_mode_enabled = enabled)
                    .await?;
                Ok(CommandResponse::with_rules(rules))
            }
            Command::GetStats => {
                self.stats.flush().await;
                Ok(CommandResponse::with_stats(self.stats.read().await?))
            }
            Command::ResetStats => Ok(CommandResponse::with_stats(self.stats.reset().await?)),
            Command::Ping => Ok(CommandResponse::ok().message("PONG")),
        }
    }
}

fn validate_entry(rule_type: &str, value: &str) -> Result<(RuleList, String), CommandError> {
    let list = RuleList::parse(rule_type).ok_or(CommandError::InvalidRuleType)?;
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Err(CommandError::InvalidValue);
    }
    Ok((list, value))
}

/// Stored entries may come from `SaveRules` unnormalized; compare them the
/// way the classifier matches them.
fn same_entry(entry: &str, normalized: &str) -> bool {
    entry.trim().to_lowercase() == normalized
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        domain::{Reason, Stats},
        infrastructure::shutdown::Shutdown,
        store::{KvStore, MemoryKvStore, StatsStore, RULES_KEY},
        tasks::stats::StatsWriteMode,
    };

    struct Fixture {
        service: CommandService,
        kv: Arc<MemoryKvStore>,
        stats: StatsAggregator,
        shutdown: Shutdown,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.shutdown.trigger();
        }
    }

    fn fixture() -> Fixture {
        let (shutdown, listener) = Shutdown::new();
        let kv = Arc::new(MemoryKvStore::new());
        let (stats, _) =
            StatsAggregator::start(StatsStore::new(kv.clone()), StatsWriteMode::Serialized, listener);
        let service = CommandService::new(
            RuleStore::new(kv.clone()),
            stats.clone(),
            Duration::from_secs(30 * 60),
        );
        Fixture {
            service,
            kv,
            stats,
            shutdown,
        }
    }

    #[tokio::test]
    async fn add_rule_entry_normalizes_and_deduplicates() {
        let f = fixture();
        let add = |value: &str| Command::AddRuleEntry {
            rule_type: "blockedKeywords".into(),
            value: value.into(),
        };
        let first = f.service.handle(add("  Politics ")).await;
        assert!(first.success);
        assert_eq!(first.rules.unwrap().blocked_keywords, vec!["politics"]);

        let second = f.service.handle(add("POLITICS")).await;
        assert!(second.success);
        assert_eq!(second.message.as_deref(), Some("already present"));
        assert_eq!(f.service.rules().load().await.unwrap().blocked_keywords, vec!["politics"]);
    }

    #[tokio::test]
    async fn invalid_input_leaves_state_untouched() {
        let f = fixture();
        let before = f.service.rules().load().await.unwrap();

        let bad_type = f
            .service
            .handle(Command::AddRuleEntry {
                rule_type: "blockedEverything".into(),
                value: "x".into(),
            })
            .await;
        assert_eq!(bad_type.error.as_deref(), Some("Invalid rule type"));

        let blank = f
            .service
            .handle(Command::AddRuleEntry {
                rule_type: "focusKeywords".into(),
                value: "   ".into(),
            })
            .await;
        assert_eq!(blank.error.as_deref(), Some("Invalid value"));

        let not_object = f.service.handle(Command::SaveRules { rules: json!([1, 2]) }).await;
        assert_eq!(not_object.error.as_deref(), Some("Invalid rules object"));

        let zero = f.service.handle(Command::PauseFor { minutes: Some(0) }).await;
        assert!(!zero.success);

        let undecodable = f
            .service
            .handle_json(&json!({"type": "SET_ENABLED", "enabled": "nope"}))
            .await;
        assert!(!undecodable.success);

        assert_eq!(f.service.rules().load().await.unwrap(), before);
        assert!(f.kv.get(RULES_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pause_and_enable_toggle_activity() {
        let f = fixture();
        let paused = f.service.handle(Command::PauseFor { minutes: None }).await;
        let rules = paused.rules.unwrap();
        let now = Utc::now().timestamp_millis();
        let until = rules.paused_until.unwrap();
        assert!(until > now + 29 * 60 * 1000 && until <= now + 30 * 60 * 1000);
        assert!(!rules.is_active_at(now));
        assert!(rules.is_active_at(until));

        let disabled = f.service.handle(Command::SetEnabled { enabled: false }).await;
        assert!(!disabled.rules.unwrap().enabled);
    }

    #[tokio::test]
    async fn remove_and_focus_commands_edit_the_saved_rules() {
        let f = fixture();
        f.service
            .handle_json(&json!({"type": "ADD_RULE_ENTRY", "ruleType": "user", "value": "Spez"}))
            .await;
        f.service
            .handle_json(&json!({"type": "SET_FOCUS_MODE", "enabled": true}))
            .await;
        let removed = f
            .service
            .handle_json(&json!({"type": "REMOVE_RULE_ENTRY", "ruleType": "blockedUsers", "value": "spez"}))
            .await;
        let rules = removed.rules.unwrap();
        assert!(rules.blocked_users.is_empty());
        assert!(rules.focus_mode_enabled);

        let missing = f
            .service
            .handle(Command::RemoveRuleEntry {
                rule_type: "blockedUsers".into(),
                value: "spez".into(),
            })
            .await;
        assert_eq!(missing.message.as_deref(), Some("not found"));
    }

    #[tokio::test]
    async fn entries_saved_with_non_ascii_case_are_matched() {
        let f = fixture();
        f.service
            .handle(Command::SaveRules {
                rules: json!({"blockedKeywords": ["Ärger"]}),
            })
            .await;

        let duplicate = f
            .service
            .handle(Command::AddRuleEntry {
                rule_type: "keyword".into(),
                value: "ärger".into(),
            })
            .await;
        assert_eq!(duplicate.message.as_deref(), Some("already present"));
        assert_eq!(duplicate.rules.unwrap().blocked_keywords, vec!["Ärger"]);

        let removed = f
            .service
            .handle(Command::RemoveRuleEntry {
                rule_type: "keyword".into(),
                value: "ÄRGER".into(),
            })
            .await;
        assert_eq!(removed.message, None);
        assert!(removed.rules.unwrap().blocked_keywords.is_empty());
    }

    #[tokio::test]
    async fn save_rules_merges_partial_documents() {
        let f = fixture();
        let response = f
            .service
            .handle(Command::SaveRules {
                rules: json!({"blockedSubreddits": ["politics"], "blockedKeywordsMatchIn": {"author": true}}),
            })
            .await;
        let rules = response.rules.unwrap();
        assert_eq!(rules.blocked_subreddits, vec!["politics"]);
        assert!(rules.blocked_keywords_match_in.title);
        assert!(rules.blocked_keywords_match_in.author);
        assert!(rules.enabled);

        let reset = f.service.handle(Command::ResetRules).await;
        assert_eq!(reset.rules.unwrap(), RuleSet::default());
    }

    #[tokio::test]
    async fn stats_commands_report_and_reset() {
        let f = fixture();
        f.stats.record(Reason::BlockedUser);
        f.stats.record(Reason::None);
        let stats = f.service.handle(Command::GetStats).await.stats.unwrap();
        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.hidden_by_user, 1);

        let reset = f.service.handle(Command::ResetStats).await;
        assert_eq!(reset.stats, Some(Stats::default()));

        let ping = f.service.handle_json(&json!({"type": "PING"})).await;
        assert_eq!(ping.message.as_deref(), Some("PONG"));
    }
}
