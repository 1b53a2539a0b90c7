use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use super::{
    feed::{IngestReport, LiveFeed},
    reddit::RedditClient,
};
use crate::config::FeedTarget;

pub type SharedFeed = Arc<Mutex<LiveFeed>>;

/// Refreshes every configured feed from the listing API.
pub struct FeedPoller {
    client: RedditClient,
    feeds: Vec<SharedFeed>,
}

impl FeedPoller {
    pub fn new(client: RedditClient, feeds: Vec<SharedFeed>) -> Self {
        Self { client, feeds }
    }

    pub fn feeds(&self) -> &[SharedFeed] {
        &self.feeds
    }

    pub fn find(&self, target: &FeedTarget) -> Option<SharedFeed> {
        self.feeds
            .iter()
            .find(|feed| feed.lock().target() == target)
            .cloned()
    }

    pub async fn poll(&self, feed: &SharedFeed) -> Result<IngestReport> {
        let target = feed.lock().target().clone();
        let posts = self.client.fetch(&target).await?;
        let report = feed.lock().ingest(posts);
        tracing::info!(
            target: "source",
            view = %target,
            added = report.added,
            duplicates = report.duplicates,
            evicted = report.evicted,
            "feed refreshed"
        );
        Ok(report)
    }

    /// Polls each feed in turn; one failing feed does not stop the others.
    pub async fn poll_all(&self) -> usize {
        let mut refreshed = 0;
        for feed in &self.feeds {
            match self.poll(feed).await {
                Ok(_) => refreshed += 1,
                Err(err) => {
                    let target = feed.lock().target().clone();
                    tracing::warn!(target: "source", view = %target, error = %err, "feed refresh failed");
                }
            }
        }
        refreshed
    }
}
