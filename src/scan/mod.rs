pub mod collection;
pub mod engine;
pub mod profile;
pub mod selector;

pub use collection::{ChangeBatch, ChangeFeed, CollectionError, FeedCollection, FeedTree, NodeId, NodeSpec};
pub use engine::{ItemState, ScanEngine, ScanMark, ScanReport};
pub use profile::{ItemKind, ScanProfile};
pub use selector::Selector;
