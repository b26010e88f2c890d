//! Core domain logic for kanban board reordering.
//! This crate is the single source of truth for ordering invariants.

pub mod db;
pub mod drag;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use drag::{BoardEvent, DragError, DragPhase, DragSession, DropOutcome, DropResolution};
pub use gateway::{ColumnOrder, GatewayError, GatewayResult, PersistenceGateway, TaskPlacement};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::board::{
    Board, Column, ColumnId, ElementKind, InvariantViolation, ProjectId, TaskId, TaskRef, UserId,
};
pub use model::order::{OrderError, OrderResult};
pub use reconcile::{plan_reorder, CommitId, CommitKind, PendingCommit, ReorderPlan};
pub use repo::board_repo::{
    BoardRepository, MemberRole, Project, RepoError, RepoResult, SqliteBoardRepository,
    TaskRecord,
};
pub use repo::sqlite_gateway::SqliteBoardGateway;
pub use service::board_service::{BoardService, ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
