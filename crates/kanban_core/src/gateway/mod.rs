//! Persistence gateway contract for board ordering.
//!
//! # Responsibility
//! - Define the transactional bulk-reorder calls consumed by reconciliation.
//! - Define the board snapshot fetch used as last-confirmed state.
//!
//! # Invariants
//! - `reorder_columns` and `reorder_tasks` are all-or-nothing.
//! - Callers must already be authorized for the project; implementations
//!   report `Unauthorized` otherwise.

use crate::db::DbError;
use crate::model::board::{Board, ColumnId, ProjectId, TaskId, UserId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// New rank for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnOrder {
    pub id: ColumnId,
    pub order: i64,
}

/// New rank and owning column for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlacement {
    pub id: TaskId,
    pub order: i64,
    pub column_id: ColumnId,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures reported by a persistence gateway.
///
/// Reconciliation treats every variant the same way: roll back and report.
#[derive(Debug)]
pub enum GatewayError {
    /// Acting user is not a member of the project.
    Unauthorized {
        project_id: ProjectId,
        user_id: UserId,
    },
    ProjectNotFound(ProjectId),
    /// Payload references rows outside the project.
    Validation(String),
    /// Backend could not be reached or answered with a transport failure.
    Unavailable(String),
    Db(DbError),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized {
                project_id,
                user_id,
            } => write!(f, "user {user_id} is not a member of project {project_id}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::Validation(message) => write!(f, "invalid reorder payload: {message}"),
            Self::Unavailable(message) => write!(f, "persistence unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage collaborator consumed by the reconciliation engine.
pub trait PersistenceGateway {
    /// Rewrites the rank of every listed column in one transaction.
    fn reorder_columns(&self, project_id: ProjectId, columns: &[ColumnOrder])
        -> GatewayResult<()>;
    /// Rewrites rank and column of every listed task in one transaction.
    fn reorder_tasks(&self, project_id: ProjectId, tasks: &[TaskPlacement]) -> GatewayResult<()>;
    /// Loads the current stored board for the project.
    fn fetch_board(&self, project_id: ProjectId) -> GatewayResult<Board>;
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for &G {
    fn reorder_columns(
        &self,
        project_id: ProjectId,
        columns: &[ColumnOrder],
    ) -> GatewayResult<()> {
        (**self).reorder_columns(project_id, columns)
    }

    fn reorder_tasks(&self, project_id: ProjectId, tasks: &[TaskPlacement]) -> GatewayResult<()> {
        (**self).reorder_tasks(project_id, tasks)
    }

    fn fetch_board(&self, project_id: ProjectId) -> GatewayResult<Board> {
        (**self).fetch_board(project_id)
    }
}
