//! Database layer for data persistence and access.
//!
//! This module implements the PostgreSQL data access layer using SQLx. It follows the
//! Repository pattern: each table gets a repository that borrows a connection, so the caller
//! decides whether the work runs inside a transaction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ ReservationService  │  (reservations - ledger, state machine, sweeper)
//! └──────────┬──────────┘
//!            │
//!            ↓
//! ┌─────────────────────┐
//! │   Storage backend   │  (storage - PostgresStorage or InMemoryStorage)
//! └──────────┬──────────┘
//!            │
//!            ↓
//! ┌─────────────────────┐
//! │    Repositories     │  (db::handlers - queries)
//! └──────────┬──────────┘
//!            │
//!            ↓
//! ┌─────────────────────┐
//! │     PostgreSQL      │
//! └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations ([`handlers::Events`], [`handlers::Reservations`])
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Row locks
//!
//! The `get_for_update` repository methods issue `SELECT ... FOR UPDATE`. The lock is held until
//! the surrounding transaction commits or rolls back, so they are only meaningful on a
//! connection borrowed from a transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let event = Events::new(&mut tx).get_for_update(event_id).await?;
//! // ... mutate under the lock ...
//! tx.commit().await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
