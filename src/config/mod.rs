pub mod env;
mod loader;

pub use env::{AppConfig, DirectoryConfig, FeedTarget, SourceConfig};
pub use loader::load_config;
