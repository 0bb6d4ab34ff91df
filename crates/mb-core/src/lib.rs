//! mb-core
//!
//! The central domain model and interface definitions for the microblog.

pub mod changes;
pub mod error;
pub mod models;
pub mod searchable;
pub mod traits;

// Re-exporting for easier access in other crates
pub use changes::*;
pub use error::*;
pub use models::*;
pub use searchable::*;
pub use traits::*;
