//! Rivus: backend feed service.
//!
//! Layered as domain (entities and invariants), application (feed
//! orchestration, ranking client, ingestion jobs), cache (ranked-feed store),
//! and infra (Postgres repositories, HTTP surface, telemetry).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
