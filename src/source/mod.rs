pub mod feed;
pub mod poller;
pub mod reddit;

pub use feed::{IngestReport, LiveFeed, VisibleItem};
pub use poller::{FeedPoller, SharedFeed};
pub use reddit::{RawPost, RedditClient};
