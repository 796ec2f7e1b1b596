//! # Modwarden
//!
//! Moderation backend for community chat servers: configuration
//! synchronization, stats aggregation, and real-time dashboard fan-out.
//!
//! ## Architecture
//!
//! ```text
//! Bot (Moderator) -> ConfigCache -> HTTP API -> Redis (config/stats)
//!                                      |
//!                                 BroadcastHub -> dashboards (WebSocket)
//! ```
//!
//! The backend binary (`main.rs`) serves the API; a bot embeds the library
//! side: [`guard::Moderator`] fed by [`cache::ConfigCache`] and
//! [`client::ApiClient`].
//!
//! ## Modules
//!
//! - [`document`]: per-community configuration documents
//! - [`stats`]: running counters and the event fold
//! - [`event`]: domain events, wire and classified forms
//! - [`store`]: durable Redis key/value access
//! - [`hub`]: subscriber registry and change notices
//! - [`api`]: HTTP handlers, auth middleware, WebSocket endpoint
//! - [`cache`]: consumer-side read-through TTL cache
//! - [`client`]: HTTP client for the backend API
//! - [`guard`]: the rule-evaluation pipeline

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod document;
pub mod event;
pub mod guard;
pub mod hub;
pub mod shutdown;
pub mod stats;
pub mod store;

// Re-export commonly used types at crate root
pub use cache::ConfigCache;
pub use client::ApiClient;
pub use document::AutomodConfig;
pub use event::{IngestEvent, ModEvent, TicketAction};
pub use guard::Moderator;
pub use hub::{BroadcastHub, Notice};
pub use stats::StatsDocument;

/// Shared-secret header checked on every JSON endpoint.
pub const API_KEY_HEADER: &str = "x-api-key";
