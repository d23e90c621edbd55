//! # Stayline Testing
//!
//! Fast, deterministic in-memory adapters for testing the delivery pipeline
//! without PostgreSQL or a message bus:
//!
//! - [`InMemoryPipeline`]: one shared state implementing the queue,
//!   scheduled-action, and notification-log store traits, mirroring the
//!   production setup where all three live in the same database
//! - [`InMemoryBusPublisher`]: records published messages and supports
//!   scripted failures for at-least-once and backoff tests

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning is a test bug, not a documented panic

pub use bus::InMemoryBusPublisher;
pub use stores::InMemoryPipeline;

pub mod bus;
pub mod stores;
