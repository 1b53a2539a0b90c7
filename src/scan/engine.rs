use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

use super::{
    collection::{ChangeBatch, ChangeFeed, CollectionError, FeedCollection, NodeId},
    profile::{ItemKind, ScanProfile},
};
use crate::{
    domain::{Decision, RuleSet},
    extract::{Extractor, FeedExtractor},
    filter::classify,
    infrastructure::shutdown::ShutdownListener,
    store::{rules_from_change, RuleStore},
    tasks::stats::StatsAggregator,
};

/// Per-item processing state. Absent from the mark table means unseen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMark {
    pub processed: bool,
    pub hidden: bool,
    /// Element the visibility effect was applied to.
    pub container: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Unseen,
    Shown,
    Hidden,
}

/// Counters for one pass over a set of candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub visited: usize,
    pub processed: usize,
    pub hidden: usize,
    pub shown: usize,
    /// Visibility flips actually applied to the collection.
    pub effect_changes: usize,
    pub failures: usize,
}

impl ScanReport {
    fn absorb(&mut self, other: ScanReport) {
        self.visited += other.visited;
        self.processed += other.processed;
        self.hidden += other.hidden;
        self.shown += other.shown;
        self.effect_changes += other.effect_changes;
        self.failures += other.failures;
    }
}

enum Outcome {
    AlreadyProcessed,
    Applied { decision: Decision, changed: bool },
}

/// Keeps one view of the feed consistent with the current rules.
///
/// Every item is classified once per rule version. A rule change clears all
/// marks, reveals everything this engine hid, and scans the whole view
/// again.
pub struct ScanEngine<X = FeedExtractor> {
    name: String,
    profile: ScanProfile,
    collection: FeedCollection,
    extractor: X,
    stats: StatsAggregator,
    rules: Arc<RuleSet>,
    marks: HashMap<NodeId, ScanMark>,
}

impl<X: Extractor> ScanEngine<X> {
    pub fn new(
        name: impl Into<String>,
        profile: ScanProfile,
        collection: FeedCollection,
        extractor: X,
        stats: StatsAggregator,
    ) -> Self {
        Self {
            name: name.into(),
            profile,
            collection,
            extractor,
            stats,
            rules: Arc::new(RuleSet::default()),
            marks: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    pub fn state(&self, item: NodeId) -> ItemState {
        match self.marks.get(&item) {
            Some(mark) if mark.processed && mark.hidden => ItemState::Hidden,
            Some(mark) if mark.processed => ItemState::Shown,
            _ => ItemState::Unseen,
        }
    }

    pub fn tracked(&self) -> usize {
        self.marks.len()
    }

    /// Visits every item currently in the view.
    pub fn scan_all(&mut self) -> ScanReport {
        let candidates = self.profile.candidates(&self.collection.read(), None);
        self.process_candidates(candidates)
    }

    /// Applies one change-feed delivery: forgets removed items and processes
    /// items inside the inserted subtrees.
    pub fn handle_batch(&mut self, batch: ChangeBatch) -> ScanReport {
        for removed in &batch.removed {
            self.marks.remove(removed);
        }
        let candidates: Vec<(NodeId, ItemKind)> = {
            let tree = self.collection.read();
            batch
                .inserted
                .iter()
                .flat_map(|root| self.profile.candidates(&tree, Some(*root)))
                .collect()
        };
        self.process_candidates(candidates)
    }

    /// Replaces the rule snapshot and re-evaluates the whole view.
    pub fn reconcile(&mut self, rules: Arc<RuleSet>) -> ScanReport {
        self.rules = rules;
        let revealed = self
            .marks
            .drain()
            .filter(|(_, mark)| mark.hidden)
            .filter(|(_, mark)| self.collection.set_hidden(mark.container, false).unwrap_or(false))
            .count();
        // Anything still hidden has no live mark behind it.
        let stale = self.collection.reveal_all();
        if stale > 0 {
            tracing::debug!(target: "scan", view = %self.name, stale, "revealed unmarked hidden nodes");
        }
        let revealed = revealed + stale;
        tracing::info!(
            target: "scan",
            view = %self.name,
            revealed,
            active = self.rules.is_active_at(Utc::now().timestamp_millis()),
            "re-filtering after rule change"
        );
        let mut report = self.scan_all();
        report.effect_changes += revealed;
        report
    }

    /// Reconciles against `rules` unless they equal the current snapshot.
    pub fn adopt(&mut self, rules: RuleSet) -> Option<ScanReport> {
        if *self.rules == rules {
            tracing::debug!(target: "scan", view = %self.name, "rules unchanged; keeping marks");
            return None;
        }
        Some(self.reconcile(Arc::new(rules)))
    }

    /// Reloads rules after missed notifications. A failed load keeps the
    /// current snapshot.
    pub async fn resync(&mut self, rule_store: &RuleStore) -> Option<ScanReport> {
        match rule_store.load().await {
            Ok(rules) => self.adopt(rules),
            Err(err) => {
                tracing::warn!(target: "scan", view = %self.name, error = %err, "reload failed; keeping current rules");
                None
            }
        }
    }

    fn process_candidates(&mut self, candidates: Vec<(NodeId, ItemKind)>) -> ScanReport {
        let mut report = ScanReport::default();
        for (item, kind) in candidates {
            report.visited += 1;
            match self.process_item(item, kind) {
                Ok(Outcome::AlreadyProcessed) => {}
                Ok(Outcome::Applied { decision, changed }) => {
                    report.processed += 1;
                    if decision.hide {
                        report.hidden += 1;
                    } else {
                        report.shown += 1;
                    }
                    if changed {
                        report.effect_changes += 1;
                    }
                }
                Err(err) => {
                    report.failures += 1;
                    tracing::warn!(target: "scan", view = %self.name, error = %err, "failed to process item");
                }
            }
        }
        report
    }

    fn process_item(&mut self, item: NodeId, kind: ItemKind) -> Result<Outcome, CollectionError> {
        if self.marks.get(&item).is_some_and(|mark| mark.processed) {
            return Ok(Outcome::AlreadyProcessed);
        }

        let (decision, container) = {
            let tree = self.collection.read();
            if !tree.contains(item) {
                return Err(CollectionError::UnknownNode(item));
            }
            let fields = self.extractor.extract(&tree, item);
            let decision = classify(&fields, &self.rules, Utc::now());
            if decision.hide {
                tracing::debug!(
                    target: "scan",
                    view = %self.name,
                    reason = decision.reason.label(),
                    title = fields.title.as_deref().unwrap_or("-"),
                    "hiding item"
                );
            }
            (decision, self.profile.container(&tree, item, kind))
        };

        // Nested items can resolve to a shared ancestor; a shown item must not
        // reveal a sibling that hid it.
        let held = !decision.hide
            && container != item
            && self
                .marks
                .iter()
                .any(|(other, mark)| *other != item && mark.hidden && mark.container == container);
        let changed = if held {
            false
        } else {
            self.collection.set_hidden(container, decision.hide)?
        };
        self.marks.insert(
            item,
            ScanMark {
                processed: true,
                hidden: decision.hide,
                container,
            },
        );
        self.stats.record(decision.reason);
        Ok(Outcome::Applied { decision, changed })
    }
}

impl<X: Extractor + 'static> ScanEngine<X> {
    pub fn spawn(
        self,
        feed: ChangeFeed,
        rule_store: RuleStore,
        shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(feed, rule_store, shutdown))
    }

    /// Loads rules, scans the view, then follows the change feed and rule
    /// notifications until shutdown.
    pub async fn run(mut self, mut feed: ChangeFeed, rule_store: RuleStore, mut shutdown: ShutdownListener) {
        let mut rule_changes = rule_store.subscribe();
        match rule_store.load().await {
            Ok(rules) => self.rules = Arc::new(rules),
            Err(err) => {
                tracing::warn!(target: "scan", view = %self.name, error = %err, "could not load rules; filtering with defaults");
            }
        }
        let report = self.scan_all();
        tracing::info!(target: "scan", view = %self.name, found = report.visited, hidden = report.hidden, "initial scan finished");

        let mut rules_open = true;
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                batch = feed.next_batch() => match batch {
                    Some(batch) => {
                        let report = self.handle_batch(batch);
                        if report.processed > 0 || report.failures > 0 {
                            tracing::debug!(target: "scan", view = %self.name, ?report, "change batch handled");
                        }
                    }
                    None => break,
                },
                change = rule_changes.recv(), if rules_open => match change {
                    Ok(change) => {
                        if let Some(rules) = rules_from_change(&change) {
                            self.adopt(rules);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "scan", view = %self.name, skipped, "missed rule notifications; reloading");
                        self.resync(&rule_store).await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!(target: "scan", view = %self.name, "rule notifications closed; rules frozen");
                        rules_open = false;
                    }
                },
            }
        }

        let released = self.marks.len();
        self.marks.clear();
        tracing::info!(target: "scan", view = %self.name, released, "scan engine stopped");
    }
}
