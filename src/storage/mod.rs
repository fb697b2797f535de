//! SQLite storage layer for docembed.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`migrations`] - Embedded schema migrations
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use events::{Event, EventType};
pub use sqlite::{cosine_similarity, DeletedEmbedding, MutationContext, SqliteStorage};
