//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the sync core and an external
//! system (time, filesystem, metadata providers). Implementations live in
//! `src/adapters/`.

pub mod clock;
pub mod filesystem;
pub mod metadata;

pub use clock::Clock;
pub use filesystem::FileSystem;
pub use metadata::{LookupFuture, MetadataProvider};
