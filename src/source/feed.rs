use std::collections::VecDeque;

use crate::{
    config::FeedTarget,
    domain::NormalizedItem,
    extract::{Extractor, FeedExtractor},
    scan::{FeedCollection, NodeId, ScanProfile},
};

use super::reddit::RawPost;

const POST_ID_ATTR: &str = "post-id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub duplicates: usize,
    pub evicted: usize,
}

/// A visible entry of the feed, for previews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleItem {
    pub post_id: Option<String>,
    pub item: NormalizedItem,
}

/// The collection backing one feed target. New posts are appended as root
/// subtrees; once more than `retain` are held the oldest are removed.
pub struct LiveFeed {
    target: FeedTarget,
    profile: ScanProfile,
    collection: FeedCollection,
    retain: usize,
    order: VecDeque<NodeId>,
}

impl LiveFeed {
    pub fn new(target: FeedTarget, retain: usize) -> Self {
        let profile = if target.is_search() {
            ScanProfile::search()
        } else {
            ScanProfile::feed()
        };
        Self {
            target,
            profile,
            collection: FeedCollection::new(),
            retain: retain.max(1),
            order: VecDeque::new(),
        }
    }

    pub fn target(&self) -> &FeedTarget {
        &self.target
    }

    pub fn profile(&self) -> &ScanProfile {
        &self.profile
    }

    pub fn collection(&self) -> &FeedCollection {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Appends unseen posts oldest-first so the newest end up last.
    pub fn ingest(&mut self, posts: Vec<RawPost>) -> IngestReport {
        let mut report = IngestReport::default();
        for post in posts.into_iter().rev() {
            if self
                .collection
                .read()
                .find_root_by_attr(POST_ID_ATTR, &post.id)
                .is_some()
            {
                report.duplicates += 1;
                continue;
            }
            let spec = if self.target.is_search() {
                post.search_node()
            } else {
                post.feed_node()
            };
            match self.collection.insert(None, spec) {
                Ok(root) => {
                    self.order.push_back(root);
                    report.added += 1;
                }
                Err(err) => {
                    tracing::warn!(target: "source", view = %self.target, error = %err, "failed to insert post");
                }
            }
        }

        while self.order.len() > self.retain {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.collection.remove(oldest).is_ok() {
                report.evicted += 1;
            }
        }
        report
    }

    /// Items whose container is currently shown, newest first.
    pub fn visible_items(&self, limit: usize) -> Vec<VisibleItem> {
        let extractor = FeedExtractor::default();
        let tree = self.collection.read();
        let mut visible = Vec::new();
        for root in self.order.iter().rev() {
            if visible.len() >= limit {
                break;
            }
            for (item, kind) in self.profile.candidates(&tree, Some(*root)) {
                if tree.is_hidden(self.profile.container(&tree, item, kind)) {
                    continue;
                }
                visible.push(VisibleItem {
                    post_id: tree.attr(*root, POST_ID_ATTR).map(str::to_string),
                    item: extractor.extract(&tree, item),
                });
            }
        }
        visible.truncate(limit);
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, title: &str) -> RawPost {
        RawPost {
            id: id.into(),
            title: title.into(),
            selftext: String::new(),
            author: Some("someone".into()),
            subreddit: Some("rust".into()),
            permalink: format!("/r/rust/comments/{id}/x/"),
            link_flair_text: None,
            score: 1,
            created_utc: 0.0,
        }
    }

    #[test]
    fn ingest_skips_known_posts_and_evicts_oldest() {
        let mut feed = LiveFeed::new(FeedTarget::Subreddit("rust".into()), 3);
        let mut changes = feed.collection().subscribe();

        let first = feed.ingest(vec![post("b", "B"), post("a", "A")]);
        assert_eq!(first.added, 2);

        let second = feed.ingest(vec![post("d", "D"), post("c", "C"), post("b", "B")]);
        assert_eq!(second.added, 2);
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.evicted, 1);
        assert_eq!(feed.len(), 3);

        let tree = feed.collection().read();
        assert!(tree.find_root_by_attr(POST_ID_ATTR, "a").is_none());
        assert!(tree.find_root_by_attr(POST_ID_ATTR, "d").is_some());
        drop(tree);

        let titles: Vec<_> = feed
            .visible_items(10)
            .into_iter()
            .filter_map(|visible| visible.item.title)
            .collect();
        assert_eq!(titles, vec!["D", "C", "B"]);

        let batch = futures::executor::block_on(changes.next_batch()).unwrap();
        assert_eq!(batch.inserted.len(), 4);
        assert!(!batch.removed.is_empty());
    }

    #[test]
    fn hidden_items_are_left_out_of_the_preview() {
        let mut feed = LiveFeed::new(FeedTarget::Search("rust".into()), 10);
        feed.ingest(vec![post("b", "B"), post("a", "A")]);
        let newest = *feed.order.back().unwrap();
        feed.collection().set_hidden(newest, true).unwrap();

        let visible = feed.visible_items(10);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].post_id.as_deref(), Some("a"));
        assert_eq!(visible[0].item.subreddit.as_deref(), Some("rust"));
    }
}
