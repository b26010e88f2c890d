//! Repository layer for board storage.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for boards.
//! - Isolate SQLite query details from services and the drag engine.
//!
//! # Invariants
//! - Repositories only accept connections at the latest schema version.
//! - Repository APIs return semantic errors (`ProjectNotFound`,
//!   `ColumnNotEmpty`, ...) in addition to DB transport errors.

pub mod board_repo;
pub mod sqlite_gateway;
