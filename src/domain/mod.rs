//! Domain model shared across the service.

pub mod entities;
pub mod feeds;
