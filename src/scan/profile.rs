use std::collections::HashSet;

use super::{
    collection::{FeedTree, NodeId},
    selector::Selector,
};

/// Picks the element whose visibility represents an item.
///
/// Candidates are tried in order with `closest` (the item itself counts),
/// then up to `ancestor_fallback` levels of ancestors starting from the
/// farthest, then the item.
#[derive(Debug, Clone, Default)]
pub struct ContainerPolicy {
    pub candidates: Vec<Selector>,
    pub ancestor_fallback: usize,
}

impl ContainerPolicy {
    pub fn resolve(&self, tree: &FeedTree, item: NodeId) -> NodeId {
        if let Some(container) = tree.closest_any(item, &self.candidates) {
            return container;
        }
        let mut ancestors = Vec::with_capacity(self.ancestor_fallback);
        let mut current = item;
        for _ in 0..self.ancestor_fallback {
            match tree.parent(current) {
                Some(parent) => {
                    ancestors.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        ancestors.last().copied().unwrap_or(item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A feed post element.
    Post,
    /// An item embedded in a larger card (search results).
    Nested,
}

#[derive(Debug, Clone)]
pub struct NestedItems {
    pub selectors: Vec<Selector>,
    pub containers: ContainerPolicy,
}

/// Which nodes of a view are items and where their visibility lives.
#[derive(Debug, Clone)]
pub struct ScanProfile {
    pub posts: Vec<Selector>,
    pub post_containers: ContainerPolicy,
    pub nested: Option<NestedItems>,
}

impl ScanProfile {
    /// Regular listing pages.
    pub fn feed() -> Self {
        let posts = vec![
            Selector::tag("shreddit-post"),
            Selector::attr_equals("data-testid", "post-container").on("div"),
            Selector::class("Post"),
        ];
        Self {
            post_containers: ContainerPolicy {
                candidates: posts.clone(),
                ancestor_fallback: 0,
            },
            posts,
            nested: None,
        }
    }

    /// Search pages: feed posts plus bare result anchors inside result cards.
    pub fn search() -> Self {
        Self {
            nested: Some(NestedItems {
                selectors: vec![Selector::attr_equals("data-testid", "post-title").on("a")],
                containers: ContainerPolicy {
                    candidates: vec![
                        Selector::tag("article"),
                        Selector::class("result").on("div"),
                        Selector::class("post").on("div"),
                        Selector::attr_contains("data-testid", "post").on("div"),
                    ],
                    ancestor_fallback: 2,
                },
            }),
            ..Self::feed()
        }
    }

    /// Items in the subtree at `root` (inclusive), or in the whole
    /// collection when `root` is `None`. Each node is reported once, in
    /// document order; nested items inside a post are left to the post.
    pub fn candidates(&self, tree: &FeedTree, root: Option<NodeId>) -> Vec<(NodeId, ItemKind)> {
        let select = |selectors: &[Selector]| match root {
            Some(root) => tree.select_in(root, selectors),
            None => tree.select_all(selectors),
        };

        let mut seen = HashSet::new();
        let mut found: Vec<(NodeId, ItemKind)> = select(&self.posts)
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(|id| (id, ItemKind::Post))
            .collect();

        if let Some(nested) = &self.nested {
            found.extend(
                select(&nested.selectors)
                    .into_iter()
                    .filter(|id| tree.closest_any(*id, &self.posts).is_none())
                    .filter(|id| seen.insert(*id))
                    .map(|id| (id, ItemKind::Nested)),
            );
        }
        found
    }

    pub fn container(&self, tree: &FeedTree, item: NodeId, kind: ItemKind) -> NodeId {
        match (kind, &self.nested) {
            (ItemKind::Nested, Some(nested)) => nested.containers.resolve(tree, item),
            _ => self.post_containers.resolve(tree, item),
        }
    }
}
