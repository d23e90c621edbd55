//! # Stayline Workers
//!
//! The two background loops that drain the event queue:
//!
//! - [`DispatchWorker`]: publishes queue entries to the external bus with
//!   retry and exponential backoff
//! - [`MaterializeWorker`]: converts recognized events into scheduled
//!   follow-up actions, idempotently
//!
//! Each worker is a single-threaded cooperative polling loop with its own
//! poll interval and a `watch`-channel shutdown signal, checked between
//! iterations and between rows of a claimed batch. Rows are processed
//! sequentially, one transaction at a time, so a poisoned row never affects
//! its neighbors, and a row-level error never escapes the loop.
//!
//! Both workers are safe to run in multiple processes at once: the claim
//! step's lock-and-skip discipline (see `stayline_core::queue::QueueStore`)
//! partitions the backlog across instances.
//!
//! # Example
//!
//! ```ignore
//! use stayline_workers::{DispatchConfig, DispatchWorker};
//!
//! let (mut worker, shutdown) = DispatchWorker::new(store, Some(bus), DispatchConfig::default());
//!
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.send(true).ok();
//! });
//!
//! worker.run().await;
//! ```

pub use config::{DispatchConfig, MaterializeConfig};
pub use dispatch::DispatchWorker;
pub use materialize::MaterializeWorker;

pub mod config;
pub mod dispatch;
pub mod materialize;
