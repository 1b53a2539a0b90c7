use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use thiserror::Error;
use tokio::sync::mpsc;

use super::selector::Selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("node {0} is no longer part of the collection")]
    UnknownNode(NodeId),
}

/// Description of a subtree to insert.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.push((name.to_string(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hidden: bool,
}

/// The live item collection: a forest of element-like nodes.
#[derive(Debug, Default)]
pub struct FeedTree {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl FeedTree {
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|node| node.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(&id).and_then(|node| {
            node.attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.hidden)
    }

    /// Concatenated text of the node and all of its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node_id in self.subtree(id) {
            if let Some(text) = self.nodes.get(&node_id).and_then(|n| n.text.as_deref()) {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
        out
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        match self.nodes.get(&id) {
            Some(node) => selector.matches(&node.tag, |name| {
                self.attr(id, name).map(str::to_string)
            }),
            None => false,
        }
    }

    pub fn matches_any(&self, id: NodeId, selectors: &[Selector]) -> bool {
        selectors.iter().any(|selector| self.matches(id, selector))
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(id).filter(|id| self.contains(*id));
        while let Some(node_id) = current {
            if self.matches(node_id, selector) {
                return Some(node_id);
            }
            current = self.parent(node_id);
        }
        None
    }

    pub fn closest_any(&self, id: NodeId, selectors: &[Selector]) -> Option<NodeId> {
        selectors
            .iter()
            .find_map(|selector| self.closest(id, selector))
    }

    /// First strict descendant of `id` matching `selector`, in document order.
    pub fn query_first(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        self.subtree(id)
            .into_iter()
            .skip(1)
            .find(|node_id| self.matches(*node_id, selector))
    }

    /// Strict descendants of `id` matching `selector`, in document order.
    pub fn query_within(&self, id: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.subtree(id)
            .into_iter()
            .skip(1)
            .filter(|node_id| self.matches(*node_id, selector))
            .collect()
    }

    /// Every node of the subtree rooted at `root` (inclusive) that matches any
    /// selector, each reported once, in document order.
    pub fn select_in(&self, root: NodeId, selectors: &[Selector]) -> Vec<NodeId> {
        self.subtree(root)
            .into_iter()
            .filter(|node_id| self.matches_any(*node_id, selectors))
            .collect()
    }

    /// Every node of the collection matching any selector, in document order.
    pub fn select_all(&self, selectors: &[Selector]) -> Vec<NodeId> {
        self.roots
            .iter()
            .flat_map(|root| self.select_in(*root, selectors))
            .collect()
    }

    pub fn hidden_nodes(&self) -> Vec<NodeId> {
        let mut hidden: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.hidden)
            .map(|(id, _)| *id)
            .collect();
        hidden.sort();
        hidden
    }

    /// First root whose `name` attribute equals `value`.
    pub fn find_root_by_attr(&self, name: &str, value: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|root| self.attr(*root, name) == Some(value))
    }

    /// Sets the hidden flag; returns whether it changed.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> Result<bool, CollectionError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(CollectionError::UnknownNode(id))?;
        let changed = node.hidden != hidden;
        node.hidden = hidden;
        Ok(changed)
    }

    fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    fn insert(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> Result<NodeId, CollectionError> {
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(CollectionError::UnknownNode(parent));
            }
        }
        let id = self.allocate(parent, spec);
        match parent {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        Ok(id)
    }

    fn allocate(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        let NodeSpec {
            tag,
            attrs,
            text,
            children,
        } = spec;
        self.nodes.insert(
            id,
            Node {
                tag,
                attrs,
                text,
                parent,
                children: Vec::new(),
                hidden: false,
            },
        );
        let child_ids: Vec<NodeId> = children
            .into_iter()
            .map(|child| self.allocate(Some(id), child))
            .collect();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = child_ids;
        }
        id
    }

    fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>, CollectionError> {
        if !self.contains(id) {
            return Err(CollectionError::UnknownNode(id));
        }
        let removed = self.subtree(id);
        match self.parent(id) {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }
        for node_id in &removed {
            self.nodes.remove(node_id);
        }
        Ok(removed)
    }
}

/// One delivery of the change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Roots of inserted subtrees.
    pub inserted: Vec<NodeId>,
    /// Every node that left the collection, descendants included.
    pub removed: Vec<NodeId>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }

    fn absorb(&mut self, other: ChangeBatch) {
        self.inserted.extend(other.inserted);
        self.removed.extend(other.removed);
    }
}

/// Shared handle to the live collection. Structural changes are published
/// to every [`ChangeFeed`] obtained from [`FeedCollection::subscribe`].
#[derive(Clone, Default)]
pub struct FeedCollection {
    tree: Arc<RwLock<FeedTree>>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ChangeBatch>>>>,
}

impl FeedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, FeedTree> {
        self.tree.read()
    }

    pub fn subscribe(&self) -> ChangeFeed {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        ChangeFeed { receiver }
    }

    pub fn insert(&self, parent: Option<NodeId>, spec: NodeSpec) -> Result<NodeId, CollectionError> {
        let id = self.tree.write().insert(parent, spec)?;
        self.publish(ChangeBatch {
            inserted: vec![id],
            removed: Vec::new(),
        });
        Ok(id)
    }

    pub fn remove(&self, id: NodeId) -> Result<Vec<NodeId>, CollectionError> {
        let removed = self.tree.write().remove(id)?;
        self.publish(ChangeBatch {
            inserted: Vec::new(),
            removed: removed.clone(),
        });
        Ok(removed)
    }

    pub fn set_hidden(&self, id: NodeId, hidden: bool) -> Result<bool, CollectionError> {
        self.tree.write().set_hidden(id, hidden)
    }

    /// Reveals every hidden node; returns how many changed.
    pub fn reveal_all(&self) -> usize {
        let mut tree = self.tree.write();
        let hidden = tree.hidden_nodes();
        hidden
            .into_iter()
            .filter(|id| tree.set_hidden(*id, false).unwrap_or(false))
            .count()
    }

    fn publish(&self, batch: ChangeBatch) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(batch.clone()).is_ok());
    }
}

/// Receiving side of the change feed.
pub struct ChangeFeed {
    receiver: mpsc::UnboundedReceiver<ChangeBatch>,
}

impl ChangeFeed {
    /// Waits for the next delivery and folds in whatever else is already
    /// queued. Returns `None` once the collection is gone.
    pub async fn next_batch(&mut self) -> Option<ChangeBatch> {
        let mut batch = self.receiver.recv().await?;
        while let Ok(more) = self.receiver.try_recv() {
            batch.absorb(more);
        }
        Some(batch)
    }
}
