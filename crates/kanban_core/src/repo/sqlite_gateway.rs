//! SQLite implementation of the persistence gateway.
//!
//! # Responsibility
//! - Apply bulk column/task reorders for one acting user.
//! - Record a `moved` activity row whenever a task changes column.
//!
//! # Invariants
//! - The actor must be a project member before anything is read or written.
//! - Every id in a payload must belong to the project; otherwise nothing
//!   is written.
//! - Each call is one `IMMEDIATE` transaction.
//!
//! No version check guards concurrent reorders of the same project; the
//! last writer wins and may leave gaps.

use crate::gateway::{ColumnOrder, GatewayError, GatewayResult, PersistenceGateway, TaskPlacement};
use crate::model::board::{Board, ColumnId, ProjectId, TaskId, UserId};
use crate::repo::board_repo::{
    ensure_project_exists, load_board, member_role, parse_uuid, RepoError, RepoResult,
    SqliteBoardRepository,
};
use log::warn;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};

impl From<RepoError> for GatewayError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => Self::Db(err),
            RepoError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Gateway bound to one connection and one acting user.
pub struct SqliteBoardGateway<'conn> {
    conn: &'conn Connection,
    actor: UserId,
}

impl<'conn> SqliteBoardGateway<'conn> {
    /// Creates gateway from migrated connection.
    pub fn try_new(conn: &'conn Connection, actor: UserId) -> RepoResult<Self> {
        let repo = SqliteBoardRepository::try_new(conn)?;
        Ok(Self {
            conn: repo.connection(),
            actor,
        })
    }

    pub fn actor(&self) -> UserId {
        self.actor
    }

    fn authorize(&self, conn: &Connection, project_id: ProjectId) -> GatewayResult<()> {
        ensure_project_exists(conn, project_id)?;
        if member_role(conn, project_id, self.actor)?.is_none() {
            warn!(
                "event=gateway_authorize module=repo status=error project_id={} user_id={} error_code=not_member",
                project_id, self.actor
            );
            return Err(GatewayError::Unauthorized {
                project_id,
                user_id: self.actor,
            });
        }
        Ok(())
    }
}

impl PersistenceGateway for SqliteBoardGateway<'_> {
    fn reorder_columns(
        &self,
        project_id: ProjectId,
        columns: &[ColumnOrder],
    ) -> GatewayResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        self.authorize(&tx, project_id)?;

        let known: HashSet<ColumnId> = project_column_ids(&tx, project_id)?.into_iter().collect();
        let mut seen = HashSet::new();
        for column in columns {
            if !known.contains(&column.id) {
                return Err(GatewayError::Validation(format!(
                    "column {} is not part of project {}",
                    column.id, project_id
                )));
            }
            if !seen.insert(column.id) {
                return Err(GatewayError::Validation(format!(
                    "column {} listed more than once",
                    column.id
                )));
            }
        }

        for column in columns {
            tx.execute(
                "UPDATE board_columns
                 SET sort_order = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE column_uuid = ?1
                   AND project_uuid = ?3;",
                params![
                    column.id.to_string(),
                    column.order,
                    project_id.to_string()
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn reorder_tasks(&self, project_id: ProjectId, tasks: &[TaskPlacement]) -> GatewayResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        self.authorize(&tx, project_id)?;

        let columns: HashSet<ColumnId> =
            project_column_ids(&tx, project_id)?.into_iter().collect();
        let current = project_task_columns(&tx, project_id)?;
        let mut seen = HashSet::new();
        for task in tasks {
            if !current.contains_key(&task.id) {
                return Err(GatewayError::Validation(format!(
                    "task {} is not part of project {}",
                    task.id, project_id
                )));
            }
            if !columns.contains(&task.column_id) {
                return Err(GatewayError::Validation(format!(
                    "column {} is not part of project {}",
                    task.column_id, project_id
                )));
            }
            if !seen.insert(task.id) {
                return Err(GatewayError::Validation(format!(
                    "task {} listed more than once",
                    task.id
                )));
            }
        }

        for task in tasks {
            let previous = current.get(&task.id).copied();
            if let Some(previous) = previous.filter(|column_id| *column_id != task.column_id) {
                tx.execute(
                    "INSERT INTO activity_logs (
                        task_uuid,
                        user_uuid,
                        action,
                        field,
                        old_value,
                        new_value
                    ) VALUES (?1, ?2, 'moved', 'column', ?3, ?4);",
                    params![
                        task.id.to_string(),
                        self.actor.to_string(),
                        previous.to_string(),
                        task.column_id.to_string(),
                    ],
                )?;
            }
            tx.execute(
                "UPDATE tasks
                 SET sort_order = ?2,
                     column_uuid = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE task_uuid = ?1
                   AND project_uuid = ?4;",
                params![
                    task.id.to_string(),
                    task.order,
                    task.column_id.to_string(),
                    project_id.to_string(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn fetch_board(&self, project_id: ProjectId) -> GatewayResult<Board> {
        self.authorize(self.conn, project_id)?;
        Ok(load_board(self.conn, project_id)?)
    }
}

fn project_column_ids(conn: &Connection, project_id: ProjectId) -> RepoResult<Vec<ColumnId>> {
    let mut stmt = conn.prepare("SELECT column_uuid FROM board_columns WHERE project_uuid = ?1;")?;
    let mut rows = stmt.query([project_id.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(parse_uuid(row.get::<_, String>(0)?, "board_columns.column_uuid")?);
    }
    Ok(ids)
}

fn project_task_columns(
    conn: &Connection,
    project_id: ProjectId,
) -> RepoResult<HashMap<TaskId, ColumnId>> {
    let mut stmt =
        conn.prepare("SELECT task_uuid, column_uuid FROM tasks WHERE project_uuid = ?1;")?;
    let mut rows = stmt.query([project_id.to_string()])?;
    let mut map = HashMap::new();
    while let Some(row) = rows.next()? {
        map.insert(
            parse_uuid(row.get::<_, String>(0)?, "tasks.task_uuid")?,
            parse_uuid(row.get::<_, String>(1)?, "tasks.column_uuid")?,
        );
    }
    Ok(map)
}
