//! Board ordering model.
//!
//! # Responsibility
//! - Define the board/column/task ordering projection rendered by the view.
//! - Provide pure, invariant-preserving moves over an owned board value.
//!
//! # Invariants
//! - Task and column `order` values stay dense after every accepted move.
//! - Ownership of a working board is exclusive to its current holder.

pub mod board;
pub mod order;
