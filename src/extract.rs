use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    domain::NormalizedItem,
    scan::{
        collection::{FeedTree, NodeId},
        selector::Selector,
    },
};

static SUBREDDIT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/r/([^/?#]+)").expect("valid subreddit regex"));
static USER_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:user|u)/([^/?#]+)").expect("valid user regex"));
static SUBREDDIT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^r/").expect("valid prefix regex"));
static USER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^u/").expect("valid prefix regex"));

const MIN_FALLBACK_CONTENT_LEN: usize = 20;

/// Turns a node of the live collection into the fields the classifier reads.
///
/// Implementations must not fail: missing structure yields `None` fields.
pub trait Extractor: Send + Sync {
    fn extract(&self, tree: &FeedTree, node: NodeId) -> NormalizedItem;
}

/// Best-effort extractor for feed posts and search-result anchors.
#[derive(Debug, Clone)]
pub struct FeedExtractor {
    search_anchor: Selector,
    title_selectors: Vec<Selector>,
    content_selectors: Vec<Selector>,
}

impl Default for FeedExtractor {
    fn default() -> Self {
        Self {
            search_anchor: Selector::attr_equals("data-testid", "post-title").on("a"),
            title_selectors: vec![
                Selector::attr_equals("slot", "title"),
                Selector::attr_equals("slot", "full-post-link").on("a"),
                Selector::tag("h3"),
                Selector::attr_equals("data-testid", "post-title"),
            ],
            content_selectors: vec![
                Selector::attr_equals("data-testid", "post-content"),
                Selector::attr_equals("slot", "text-body"),
                Selector::class("text-body"),
                Selector::tag("post-body"),
            ],
        }
    }
}

impl Extractor for FeedExtractor {
    fn extract(&self, tree: &FeedTree, node: NodeId) -> NormalizedItem {
        let is_search_anchor = tree.matches(node, &self.search_anchor);
        let mut item = NormalizedItem {
            title: self.title(tree, node),
            content: self.content(tree, node),
            subreddit: subreddit_from_attrs(tree, node),
            author: author(tree, node),
        };

        if item.title.is_none() && is_search_anchor {
            item.title = tree
                .attr(node, "aria-label")
                .and_then(clean)
                .or_else(|| clean(&tree.text_content(node)));
        }
        if item.subreddit.is_none() && is_search_anchor {
            item.subreddit = tree
                .attr(node, "href")
                .and_then(|href| capture(&SUBREDDIT_PATH, href));
        }
        if item.subreddit.is_none() {
            item.subreddit = subreddit_from_link(tree, node);
        }
        item
    }
}

impl FeedExtractor {
    fn title(&self, tree: &FeedTree, node: NodeId) -> Option<String> {
        self.title_selectors.iter().find_map(|selector| {
            tree.query_first(node, selector)
                .and_then(|found| clean(&tree.text_content(found)))
        })
    }

    fn content(&self, tree: &FeedTree, node: NodeId) -> Option<String> {
        let direct = self.content_selectors.iter().find_map(|selector| {
            tree.query_first(node, selector)
                .and_then(|found| clean(&tree.text_content(found)))
        });
        if direct.is_some() {
            return direct;
        }

        let title_nodes: Vec<NodeId> = self
            .title_selectors
            .iter()
            .flat_map(|selector| tree.query_within(node, selector))
            .collect();
        let title_texts: Vec<String> = title_nodes
            .iter()
            .map(|id| tree.text_content(*id).trim().to_lowercase())
            .collect();

        let paragraphs = [Selector::tag("p"), Selector::class("text"), Selector::class("content")];
        let fallback = paragraphs
            .iter()
            .flat_map(|selector| tree.query_within(node, selector))
            .filter(|candidate| {
                !title_nodes
                    .iter()
                    .any(|title| is_within(tree, *candidate, *title))
            })
            .map(|candidate| tree.text_content(candidate).trim().to_string())
            .find(|text| {
                text.chars().count() > MIN_FALLBACK_CONTENT_LEN
                    && !title_texts.contains(&text.to_lowercase())
            });
        fallback
    }
}

fn subreddit_from_attrs(tree: &FeedTree, node: NodeId) -> Option<String> {
    tree.attr(node, "subreddit-prefixed-name")
        .and_then(|value| clean(&SUBREDDIT_PREFIX.replace(value.trim(), "")))
        .or_else(|| tree.attr(node, "subreddit-name").and_then(clean))
}

fn subreddit_from_link(tree: &FeedTree, node: NodeId) -> Option<String> {
    let link = tree
        .query_first(node, &Selector::attr_equals("data-click-id", "subreddit").on("a"))
        .or_else(|| tree.query_first(node, &Selector::attr_contains("href", "/r/").on("a")))?;
    tree.attr(link, "href")
        .and_then(|href| capture(&SUBREDDIT_PATH, href))
        .or_else(|| {
            let text = tree.text_content(link);
            clean(&SUBREDDIT_PREFIX.replace(text.trim(), ""))
        })
}

fn author(tree: &FeedTree, node: NodeId) -> Option<String> {
    if let Some(value) = tree.attr(node, "author") {
        if let Some(author) = clean(&USER_PREFIX.replace(value.trim(), "")) {
            return Some(author);
        }
    }
    let link = [
        Selector::attr_equals("data-click-id", "user").on("a"),
        Selector::attr_contains("href", "/user/").on("a"),
        Selector::attr_contains("href", "/u/").on("a"),
    ]
    .iter()
    .find_map(|selector| tree.query_first(node, selector))?;
    tree.attr(link, "href")
        .and_then(|href| capture(&USER_PATH, href))
        .or_else(|| {
            let text = tree.text_content(link);
            clean(&USER_PREFIX.replace(text.trim(), ""))
        })
}

fn is_within(tree: &FeedTree, node: NodeId, ancestor: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = tree.parent(id);
    }
    false
}

fn capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .and_then(|m| clean(m.as_str()))
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::collection::{FeedCollection, NodeSpec};

    #[test]
    fn extracts_feed_post_from_attributes_and_children() {
        let collection = FeedCollection::new();
        let node = collection
            .insert(
                None,
                NodeSpec::new("shreddit-post")
                    .attr("subreddit-prefixed-name", "r/rust")
                    .attr("author", "u/ferris")
                    .child(NodeSpec::new("h3").text("  Rust 1.80 released "))
                    .child(NodeSpec::new("div").attr("slot", "text-body").text("LazyCell is stable")),
            )
            .unwrap();
        let item = FeedExtractor::default().extract(&collection.read(), node);
        assert_eq!(item.title.as_deref(), Some("Rust 1.80 released"));
        assert_eq!(item.content.as_deref(), Some("LazyCell is stable"));
        assert_eq!(item.subreddit.as_deref(), Some("rust"));
        assert_eq!(item.author.as_deref(), Some("ferris"));
    }

    #[test]
    fn search_anchor_uses_aria_label_and_href() {
        let collection = FeedCollection::new();
        let card = collection
            .insert(
                None,
                NodeSpec::new("div").attr("class", "search-result").child(
                    NodeSpec::new("a")
                        .attr("data-testid", "post-title")
                        .attr("href", "/r/programming/comments/abc/new_js_framework/")
                        .attr("aria-label", "New JS framework"),
                ),
            )
            .unwrap();
        let tree = collection.read();
        let anchor = tree.query_first(card, &Selector::tag("a")).unwrap();
        let item = FeedExtractor::default().extract(&tree, anchor);
        assert_eq!(item.title.as_deref(), Some("New JS framework"));
        assert_eq!(item.subreddit.as_deref(), Some("programming"));
        assert_eq!(item.author, None);
        assert_eq!(item.content, None);
    }

    #[test]
    fn falls_back_to_links_and_long_paragraphs() {
        let collection = FeedCollection::new();
        let node = collection
            .insert(
                None,
                NodeSpec::new("div")
                    .attr("data-testid", "post-container")
                    .child(NodeSpec::new("h3").text("A title that is long enough to skip"))
                    .child(NodeSpec::new("p").text("short"))
                    .child(NodeSpec::new("p").text("a paragraph with more than twenty characters"))
                    .child(NodeSpec::new("a").attr("href", "/r/AskReddit/").text("r/AskReddit"))
                    .child(NodeSpec::new("a").attr("href", "/user/someone/").text("u/someone")),
            )
            .unwrap();
        let item = FeedExtractor::default().extract(&collection.read(), node);
        assert_eq!(
            item.content.as_deref(),
            Some("a paragraph with more than twenty characters")
        );
        assert_eq!(item.subreddit.as_deref(), Some("AskReddit"));
        assert_eq!(item.author.as_deref(), Some("someone"));
    }

    #[test]
    fn empty_node_yields_empty_item() {
        let collection = FeedCollection::new();
        let node = collection.insert(None, NodeSpec::new("div")).unwrap();
        assert_eq!(
            FeedExtractor::default().extract(&collection.read(), node),
            NormalizedItem::default()
        );
    }
}
