//! # Stayline Postgres
//!
//! `PostgreSQL` implementations of the pipeline stores, plus the producer
//! enqueue API and the schema bootstrap. Uses sqlx with raw SQL and a shared
//! connection pool.
//!
//! The three tables (`event_queue`, `scheduled_actions`,
//! `notification_log`) live in the producing services' database on purpose:
//! that is what lets a producer insert a queue entry inside the same
//! transaction as its business write (the transactional-outbox property),
//! and what lets the materializer finalize a queue row and create an action
//! in one transaction.
//!
//! Multi-instance safety comes from the claim statement's
//! `FOR UPDATE SKIP LOCKED`: concurrent claimants partition the pending
//! backlog instead of blocking on or double-processing each other's rows.
//!
//! # Example
//!
//! ```ignore
//! use stayline_postgres::{PostgresQueueStore, enqueue, run_migrations};
//!
//! let pool = sqlx::PgPool::connect(&database_url).await?;
//! run_migrations(&pool).await?;
//!
//! // Producer side, inside a business transaction:
//! let mut tx = pool.begin().await?;
//! // ... business writes ...
//! enqueue(&mut tx, &new_entry).await?;
//! tx.commit().await?;
//!
//! // Worker side:
//! let store = PostgresQueueStore::new(pool.clone());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use action_store::PostgresActionStore;
pub use notification_log::PostgresNotificationLog;
pub use producer::enqueue;
pub use queue_store::PostgresQueueStore;
pub use schema::run_migrations;

pub mod action_store;
pub mod notification_log;
pub mod producer;
pub mod queue_store;
pub mod schema;

use stayline_core::store::StoreError;

/// Map a sqlx error into the shared store error.
fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
