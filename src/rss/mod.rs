//! RSS ingestion.
//!
//! Operator-registered feeds are fetched on a schedule through an SSRF-safe
//! fetcher, parsed, deduplicated into the item store, and tracked for health.

pub mod failure;
pub mod fetcher;
pub mod health;
pub mod parser;
pub mod pipeline;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod ssrf;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use failure::{FailureReason, FetchFailure, FetchResult};
pub use fetcher::{FetchSettings, Fetcher};
pub use health::HealthTracker;
pub use pipeline::{persist_items, CycleReport, FeedPipeline, HealthGate, PersistStats};
pub use repository::{FeedRepository, ItemRepository};
pub use retry::RetryPolicy;
pub use scheduler::Orchestrator;
pub use service::{FeedService, Preview};
pub use ssrf::{AddressGuard, Resolve, SystemResolver};
pub use types::{
    CandidateItem, CycleOutcome, Feed, FeedHealth, HealthStatus, Item, NewFeed,
    DEFAULT_CRITICAL_THRESHOLD, MAX_LAST_ERROR_LENGTH, UNTITLED,
};
pub use worker::{Dispatch, WorkerPool};
