//! Flutter-facing bindings for the kanban board core.

pub mod api;
