//! # mixlite-core
//!
//! Core library for mixlite - an offline-first analytics client.
//!
//! This library provides:
//! - A durable, size-bounded transaction queue over a key/value store
//! - Event and profile-update assembly from session and caller properties
//! - An ordered delivery pipeline with at-least-once semantics
//! - Host environment detection (browser pages, native processes)
//! - Configuration management and logging infrastructure
//!
//! ## Delivery model
//!
//! Every tracking call is persisted before anything touches the network.
//! Drains run after each enqueue and on the ready and reconnect triggers;
//! they send queued transactions one at a time, oldest first, and remove
//! only the ones the endpoint accepted.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mixlite_core::{ClientBuilder, Config};
//!
//! # async fn run() -> mixlite_core::Result<()> {
//! let config = Config::load()?;
//! let client = ClientBuilder::from_config(&config)?.build()?;
//!
//! client.init("project-token", config.client.init_options());
//! client.identify("user-42");
//! client.track("checkout", None);
//! client.flush().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use client::{Client, ClientBuilder, People};
pub use config::{Config, InitOptions};
pub use environment::{BrowserContext, BrowserInfo, Environment, NativeContext};
pub use error::{Error, Result};
pub use pipeline::{DeliveryPipeline, DeliveryStats, DrainOutcome, DrainReport};
pub use queue::TransactionQueue;
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use transport::{Endpoints, HttpTransport, OutboundRequest, Transport};
pub use types::*;

// Public modules
pub mod builder;
pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
