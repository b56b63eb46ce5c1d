//! Ranked-feed cache: a sorted-set store abstraction plus key derivation.

pub mod keys;
pub mod store;

pub use store::{FeedStore, MemoryFeedStore, StoreError};
