//! Application services layer.

pub mod error;
pub mod feed;
pub mod jobs;
pub mod pagination;
pub mod ranker;
pub mod repos;
