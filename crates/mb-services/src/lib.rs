//! mb-services
//!
//! Application services over the `mb-core` ports: the social graph, feeds,
//! search, and the synchronizer that keeps the search index in step with the store.

pub mod app;
pub mod feed;
pub mod graph;
pub mod search;
pub mod sync;

pub use app::Microblog;
pub use feed::FeedService;
pub use graph::SocialGraph;
pub use search::SearchService;
pub use sync::SearchSynchronizer;
