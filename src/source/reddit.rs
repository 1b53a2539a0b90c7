use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::{config::{FeedTarget, SourceConfig}, scan::NodeSpec};

/// One post from a listing response, reduced to what the feed renders.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    kind: String,
    data: serde_json::Value,
}

impl RawPost {
    /// Subtree shaped like a rendered listing post.
    pub fn feed_node(&self) -> NodeSpec {
        let mut post = NodeSpec::new("shreddit-post")
            .attr("post-id", &self.id)
            .attr("permalink", &self.permalink)
            .attr("score", self.score.to_string())
            .attr("created-timestamp", (self.created_utc as i64).to_string());
        if let Some(subreddit) = &self.subreddit {
            post = post.attr("subreddit-prefixed-name", format!("r/{subreddit}"));
        }
        if let Some(author) = self.author.as_deref().filter(|a| *a != "[deleted]") {
            post = post.attr("author", author);
        }
        post = post.child(
            NodeSpec::new("a")
                .attr("slot", "full-post-link")
                .attr("href", &self.permalink)
                .text(&self.title),
        );
        if let Some(flair) = &self.link_flair_text {
            post = post.child(NodeSpec::new("shreddit-post-flair").text(flair));
        }
        if !self.selftext.trim().is_empty() {
            post = post.child(
                NodeSpec::new("div")
                    .attr("slot", "text-body")
                    .child(NodeSpec::new("p").text(&self.selftext)),
            );
        }
        post
    }

    /// Subtree shaped like a search-result card: a bare title anchor with the
    /// subreddit only present in its link.
    pub fn search_node(&self) -> NodeSpec {
        let mut card = NodeSpec::new("div")
            .attr("class", "search-result-card")
            .attr("post-id", &self.id)
            .child(
                NodeSpec::new("a")
                    .attr("data-testid", "post-title")
                    .attr("href", &self.permalink)
                    .attr("aria-label", &self.title)
                    .text(&self.title),
            );
        if let Some(author) = self.author.as_deref().filter(|a| *a != "[deleted]") {
            card = card.child(
                NodeSpec::new("a")
                    .attr("href", format!("/user/{author}/"))
                    .text(format!("u/{author}")),
            );
        }
        card
    }
}

/// Parses a listing document. Non-post children and posts that fail to
/// decode are skipped.
pub fn parse_listing(body: &str) -> Result<Vec<RawPost>> {
    let listing: Listing = serde_json::from_str(body).context("listing is not valid JSON")?;
    let posts = listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .filter_map(|child| match serde_json::from_value::<RawPost>(child.data) {
            Ok(post) => Some(post),
            Err(err) => {
                tracing::debug!(target: "source", error = %err, "skipping undecodable post");
                None
            }
        })
        .collect();
    Ok(posts)
}

pub struct RedditClient {
    client: Client,
    base_url: Url,
    limit: usize,
    timeout: std::time::Duration,
}

impl RedditClient {
    pub fn new(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            limit: config.item_limit,
            timeout: config.fetch_timeout,
        }
    }

    pub fn endpoint(&self, target: &FeedTarget) -> Result<Url> {
        let mut url = match target {
            FeedTarget::Subreddit(name) => self.base_url.join(&format!("r/{name}/new.json"))?,
            FeedTarget::Search(_) => self.base_url.join("search.json")?,
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.limit.to_string());
            query.append_pair("raw_json", "1");
            if let FeedTarget::Search(q) = target {
                query.append_pair("q", q);
                query.append_pair("sort", "new");
            }
        }
        Ok(url)
    }

    /// Newest posts first, as the listing returns them.
    pub async fn fetch(&self, target: &FeedTarget) -> Result<Vec<RawPost>> {
        let url = self.endpoint(target)?;
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("listing request rejected: {url}"))?;
        let body = response.text().await?;
        parse_listing(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::NormalizedItem,
        extract::{Extractor, FeedExtractor},
        scan::{FeedCollection, ScanProfile},
    };

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "children": [
                {"kind": "t3", "data": {
                    "id": "abc", "title": "Async traits are stable",
                    "selftext": "After a long wait the feature finally landed in stable.",
                    "author": "ferris", "subreddit": "rust",
                    "permalink": "/r/rust/comments/abc/async_traits/",
                    "score": 420, "created_utc": 1714521600.0
                }},
                {"kind": "t1", "data": {"id": "comment"}},
                {"kind": "t3", "data": {"title": "missing id"}}
            ]
        }
    }"#;

    fn config(base: &str) -> SourceConfig {
        SourceConfig {
            base_url: Url::parse(base).unwrap(),
            views: Vec::new(),
            item_limit: 10,
            retain: 50,
            fetch_timeout: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn listing_keeps_only_decodable_posts() {
        let posts = parse_listing(LISTING).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "abc");
        assert!(parse_listing("<html>").is_err());
    }

    #[test]
    fn feed_node_extracts_like_a_rendered_post() {
        let post = &parse_listing(LISTING).unwrap()[0];
        let collection = FeedCollection::new();
        let root = collection.insert(None, post.feed_node()).unwrap();
        let tree = collection.read();
        assert_eq!(
            ScanProfile::feed().candidates(&tree, None),
            vec![(root, crate::scan::ItemKind::Post)]
        );
        assert_eq!(
            FeedExtractor::default().extract(&tree, root),
            NormalizedItem {
                title: Some("Async traits are stable".into()),
                content: Some("After a long wait the feature finally landed in stable.".into()),
                subreddit: Some("rust".into()),
                author: Some("ferris".into()),
            }
        );
    }

    #[test]
    fn search_node_yields_a_nested_item() {
        let post = &parse_listing(LISTING).unwrap()[0];
        let collection = FeedCollection::new();
        let card = collection.insert(None, post.search_node()).unwrap();
        let tree = collection.read();
        let profile = ScanProfile::search();
        let candidates = profile.candidates(&tree, None);
        assert_eq!(candidates.len(), 1);
        let (anchor, kind) = candidates[0];
        assert_eq!(profile.container(&tree, anchor, kind), card);
        let item = FeedExtractor::default().extract(&tree, anchor);
        assert_eq!(item.subreddit.as_deref(), Some("rust"));
        assert_eq!(item.title.as_deref(), Some("Async traits are stable"));
    }

    #[test]
    fn endpoints_carry_limit_and_query() {
        let client = RedditClient::new(Client::new(), &config("https://example.test/"));
        let listing = client
            .endpoint(&FeedTarget::Subreddit("rust".into()))
            .unwrap();
        assert_eq!(
            listing.as_str(),
            "https://example.test/r/rust/new.json?limit=10&raw_json=1"
        );
        let search = client
            .endpoint(&FeedTarget::Search("tokio runtime".into()))
            .unwrap();
        assert_eq!(search.path(), "/search.json");
        assert!(search.query().unwrap().contains("q=tokio+runtime"));
    }
}
