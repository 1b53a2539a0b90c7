use std::sync::Arc;

use tokio::sync::broadcast;

use super::kv::{KeyChange, KvStore, StoreError};
use crate::domain::RuleSet;

pub const RULES_KEY: &str = "rf_rules";

/// Loads and persists the single [`RuleSet`] document.
///
/// Saves overwrite the whole document. Two writers racing a
/// load-modify-save can clobber each other; the later save wins.
#[derive(Clone)]
pub struct RuleStore {
    kv: Arc<dyn KvStore>,
}

impl RuleStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Defaults merged with whatever is persisted. Only transport faults
    /// are reported; a missing or malformed document reads as defaults.
    pub async fn load(&self) -> Result<RuleSet, StoreError> {
        let stored = self.kv.get(RULES_KEY).await?;
        Ok(stored
            .as_ref()
            .map(RuleSet::from_document)
            .unwrap_or_default())
    }

    pub async fn save(&self, rules: &RuleSet) -> Result<(), StoreError> {
        self.kv.set(RULES_KEY, serde_json::to_value(rules)?).await?;
        tracing::debug!(target: "rules", "rules saved");
        Ok(())
    }

    pub async fn reset(&self) -> Result<RuleSet, StoreError> {
        let defaults = RuleSet::default();
        self.save(&defaults).await?;
        tracing::info!(target: "rules", "rules reset to defaults");
        Ok(defaults)
    }

    /// Load, apply `change`, save. Returns the saved rules.
    pub async fn update<F>(&self, change: F) -> Result<RuleSet, StoreError>
    where
        F: FnOnce(&mut RuleSet),
    {
        let mut rules = self.load().await?;
        change(&mut rules);
        self.save(&rules).await?;
        Ok(rules)
    }

    /// Notifications for the rules document only.
    pub fn subscribe(&self) -> broadcast::Receiver<KeyChange> {
        self.kv.subscribe(RULES_KEY)
    }
}

/// The new rule set carried by a store notification, if it is one.
pub fn rules_from_change(change: &KeyChange) -> Option<RuleSet> {
    if change.key != RULES_KEY {
        return None;
    }
    change
        .new_value
        .as_ref()
        .filter(|value| value.is_object())
        .map(RuleSet::from_document)
}
