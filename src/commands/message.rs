use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{RuleSet, Stats};

/// Requests accepted by [`super::CommandService`]. On the wire a command is
/// a JSON object tagged by `type`, e.g. `{"type": "SET_ENABLED", "enabled": false}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Command {
    GetRules,
    SaveRules {
        rules: Value,
    },
    ResetRules,
    SetEnabled {
        enabled: bool,
    },
    /// Pauses filtering; `minutes` falls back to the configured default.
    #[serde(alias = "PAUSE_FOR_30_MINUTES")]
    PauseFor {
        #[serde(default)]
        minutes: Option<u32>,
    },
    #[serde(alias = "ADD_RULE")]
    AddRuleEntry {
        rule_type: String,
        value: String,
    },
    RemoveRuleEntry {
        rule_type: String,
        value: String,
    },
    SetFocusMode {
        enabled: bool,
    },
    GetStats,
    ResetStats,
    Ping,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetRules => "GET_RULES",
            Command::SaveRules { .. } => "SAVE_RULES",
            Command::ResetRules => "RESET_RULES",
            Command::SetEnabled { .. } => "SET_ENABLED",
            Command::PauseFor { .. } => "PAUSE_FOR",
            Command::AddRuleEntry { .. } => "ADD_RULE_ENTRY",
            Command::RemoveRuleEntry { .. } => "REMOVE_RULE_ENTRY",
            Command::SetFocusMode { .. } => "SET_FOCUS_MODE",
            Command::GetStats => "GET_STATS",
            Command::ResetStats => "RESET_STATS",
            Command::Ping => "PING",
        }
    }

    pub fn mutates_state(&self) -> bool {
        !matches!(self, Command::GetRules | Command::GetStats | Command::Ping)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_rules(rules: RuleSet) -> Self {
        Self {
            rules: Some(rules),
            ..Self::ok()
        }
    }

    pub fn with_stats(stats: Stats) -> Self {
        Self {
            stats: Some(stats),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn commands_decode_from_tagged_json() {
        let cases = [
            (json!({"type": "GET_RULES"}), Command::GetRules),
            (json!({"type": "SET_ENABLED", "enabled": false}), Command::SetEnabled { enabled: false }),
            (json!({"type": "PAUSE_FOR"}), Command::PauseFor { minutes: None }),
            (
                json!({"type": "PAUSE_FOR_30_MINUTES"}),
                Command::PauseFor { minutes: None },
            ),
            (
                json!({"type": "ADD_RULE", "ruleType": "blockedUsers", "value": "spez"}),
                Command::AddRuleEntry {
                    rule_type: "blockedUsers".into(),
                    value: "spez".into(),
                },
            ),
            (json!({"type": "PING"}), Command::Ping),
        ];
        for (raw, expected) in cases {
            assert_eq!(serde_json::from_value::<Command>(raw).unwrap(), expected);
        }
    }

    #[test]
    fn wrongly_typed_fields_are_rejected() {
        assert!(serde_json::from_value::<Command>(json!({"type": "SET_ENABLED", "enabled": "yes"})).is_err());
        assert!(serde_json::from_value::<Command>(json!({"type": "LAUNCH"})).is_err());
    }

    #[test]
    fn failure_response_omits_empty_fields() {
        let encoded = serde_json::to_value(CommandResponse::failure("Invalid value")).unwrap();
        assert_eq!(encoded, json!({"success": false, "error": "Invalid value"}));
    }
}
