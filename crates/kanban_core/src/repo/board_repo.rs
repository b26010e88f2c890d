//! Board repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist projects, memberships, columns and tasks.
//! - Load one project's columns and tasks as a [`Board`] snapshot.
//!
//! # Invariants
//! - Column and task listings are deterministic: `sort_order ASC, uuid ASC`.
//! - Appends use `max(sort_order) + 1`; deletes renumber the touched
//!   sequence densely inside the same transaction.
//! - A column holding tasks is never deleted.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::board::{Board, Column, ColumnId, ProjectId, TaskId, TaskRef, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Columns every new project starts with, in board order.
pub const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from board repository operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    ProjectNotFound(ProjectId),
    /// Column does not exist in the named project.
    ColumnNotFound(ColumnId),
    /// Task does not exist in the named project.
    TaskNotFound(TaskId),
    /// Column still holds tasks and cannot be deleted.
    ColumnNotEmpty { column_id: ColumnId, tasks: usize },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::ColumnNotFound(id) => write!(f, "column not found: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::ColumnNotEmpty { column_id, tasks } => {
                write!(f, "column {column_id} still holds {tasks} task(s)")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "board repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "board repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "board repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid board data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Membership role inside one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    /// Owners and admins may manage any task on the board.
    pub fn can_manage_board(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// Project read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub project_uuid: ProjectId,
    pub name: String,
    pub owner_uuid: UserId,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

/// Task read model with ownership metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_uuid: TaskId,
    pub project_uuid: ProjectId,
    pub column_uuid: ColumnId,
    pub title: String,
    pub sort_order: i64,
    pub creator_uuid: UserId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One `activity_logs` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub task_uuid: TaskId,
    pub user_uuid: UserId,
    pub action: String,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: i64,
}

/// Repository interface for board storage.
pub trait BoardRepository {
    /// Creates a project, its owner membership and the default columns.
    fn create_project(&self, name: &str, owner: UserId) -> RepoResult<Project>;
    fn get_project(&self, project_id: ProjectId) -> RepoResult<Option<Project>>;
    /// Adds a member, or changes the role of an existing one.
    fn add_member(&self, project_id: ProjectId, user_id: UserId, role: MemberRole)
        -> RepoResult<()>;
    fn member_role(&self, project_id: ProjectId, user_id: UserId)
        -> RepoResult<Option<MemberRole>>;
    /// Appends a column at the end of the board.
    fn create_column(&self, project_id: ProjectId, name: &str) -> RepoResult<Column>;
    fn rename_column(&self, project_id: ProjectId, column_id: ColumnId, name: &str)
        -> RepoResult<()>;
    /// Deletes an empty column and renumbers the rest.
    fn delete_column(&self, project_id: ProjectId, column_id: ColumnId) -> RepoResult<()>;
    /// Appends a task at the end of a column.
    fn create_task(
        &self,
        project_id: ProjectId,
        column_id: ColumnId,
        title: &str,
        creator: UserId,
    ) -> RepoResult<TaskRecord>;
    fn get_task(&self, task_id: TaskId) -> RepoResult<Option<TaskRecord>>;
    /// Deletes a task and renumbers its column.
    fn delete_task(&self, project_id: ProjectId, task_id: TaskId) -> RepoResult<()>;
    /// Loads the project's ordering snapshot.
    fn load_board(&self, project_id: ProjectId) -> RepoResult<Board>;
    /// Lists activity rows of one task, oldest first.
    fn task_activity(&self, task_id: TaskId) -> RepoResult<Vec<ActivityEntry>>;
}

/// SQLite-backed board repository.
pub struct SqliteBoardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoardRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_board_connection_ready(conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn connection(&self) -> &'conn Connection {
        self.conn
    }
}

impl BoardRepository for SqliteBoardRepository<'_> {
    fn create_project(&self, name: &str, owner: UserId) -> RepoResult<Project> {
        let project_uuid = Uuid::new_v4();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO projects (project_uuid, name, owner_uuid) VALUES (?1, ?2, ?3);",
            params![project_uuid.to_string(), name, owner.to_string()],
        )?;
        tx.execute(
            "INSERT INTO project_members (project_uuid, user_uuid, role)
             VALUES (?1, ?2, 'owner');",
            params![project_uuid.to_string(), owner.to_string()],
        )?;
        for (index, column_name) in DEFAULT_COLUMNS.iter().enumerate() {
            tx.execute(
                "INSERT INTO board_columns (column_uuid, project_uuid, name, sort_order)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    Uuid::new_v4().to_string(),
                    project_uuid.to_string(),
                    column_name,
                    index as i64,
                ],
            )?;
        }
        tx.commit()?;

        self.get_project(project_uuid)?
            .ok_or(RepoError::ProjectNotFound(project_uuid))
    }

    fn get_project(&self, project_id: ProjectId) -> RepoResult<Option<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_uuid, name, owner_uuid, created_at, updated_at
             FROM projects
             WHERE project_uuid = ?1;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn add_member(
        &self,
        project_id: ProjectId,
        user_id: UserId,
        role: MemberRole,
    ) -> RepoResult<()> {
        ensure_project_exists(self.conn, project_id)?;
        self.conn.execute(
            "INSERT INTO project_members (project_uuid, user_uuid, role)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_uuid, user_uuid) DO UPDATE SET role = excluded.role;",
            params![project_id.to_string(), user_id.to_string(), role.as_str()],
        )?;
        Ok(())
    }

    fn member_role(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> RepoResult<Option<MemberRole>> {
        member_role(self.conn, project_id, user_id)
    }

    fn create_column(&self, project_id: ProjectId, name: &str) -> RepoResult<Column> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_project_exists(&tx, project_id)?;
        let column_uuid = Uuid::new_v4();
        let sort_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0)
             FROM board_columns
             WHERE project_uuid = ?1;",
            [project_id.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO board_columns (column_uuid, project_uuid, name, sort_order)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                column_uuid.to_string(),
                project_id.to_string(),
                name,
                sort_order
            ],
        )?;
        tx.commit()?;
        Ok(Column::new(column_uuid, name, sort_order))
    }

    fn rename_column(
        &self,
        project_id: ProjectId,
        column_id: ColumnId,
        name: &str,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE board_columns
             SET name = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE column_uuid = ?1
               AND project_uuid = ?2;",
            params![column_id.to_string(), project_id.to_string(), name],
        )?;
        if changed == 0 {
            return Err(RepoError::ColumnNotFound(column_id));
        }
        Ok(())
    }

    fn delete_column(&self, project_id: ProjectId, column_id: ColumnId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_column_in_project(&tx, project_id, column_id)?;

        let tasks: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE column_uuid = ?1;",
            [column_id.to_string()],
            |row| row.get(0),
        )?;
        if tasks > 0 {
            return Err(RepoError::ColumnNotEmpty {
                column_id,
                tasks: tasks as usize,
            });
        }

        tx.execute(
            "DELETE FROM board_columns WHERE column_uuid = ?1;",
            [column_id.to_string()],
        )?;
        let remaining = list_column_ids(&tx, project_id)?;
        for (index, id) in remaining.into_iter().enumerate() {
            tx.execute(
                "UPDATE board_columns
                 SET sort_order = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE column_uuid = ?1;",
                params![id.to_string(), index as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn create_task(
        &self,
        project_id: ProjectId,
        column_id: ColumnId,
        title: &str,
        creator: UserId,
    ) -> RepoResult<TaskRecord> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_column_in_project(&tx, project_id, column_id)?;
        let task_uuid = Uuid::new_v4();
        let sort_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0)
             FROM tasks
             WHERE column_uuid = ?1;",
            [column_id.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO tasks (
                task_uuid,
                project_uuid,
                column_uuid,
                title,
                sort_order,
                creator_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                task_uuid.to_string(),
                project_id.to_string(),
                column_id.to_string(),
                title,
                sort_order,
                creator.to_string(),
            ],
        )?;
        tx.commit()?;

        self.get_task(task_uuid)?
            .ok_or(RepoError::TaskNotFound(task_uuid))
    }

    fn get_task(&self, task_id: TaskId) -> RepoResult<Option<TaskRecord>> {
        self.conn
            .query_row(
                "SELECT
                    task_uuid,
                    project_uuid,
                    column_uuid,
                    title,
                    sort_order,
                    creator_uuid,
                    created_at,
                    updated_at
                 FROM tasks
                 WHERE task_uuid = ?1;",
                [task_id.to_string()],
                |row| Ok(parse_task_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn delete_task(&self, project_id: ProjectId, task_id: TaskId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let column_uuid: Option<String> = tx
            .query_row(
                "SELECT column_uuid
                 FROM tasks
                 WHERE task_uuid = ?1
                   AND project_uuid = ?2;",
                params![task_id.to_string(), project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(column_uuid) = column_uuid else {
            return Err(RepoError::TaskNotFound(task_id));
        };

        tx.execute(
            "DELETE FROM tasks WHERE task_uuid = ?1;",
            [task_id.to_string()],
        )?;

        let remaining = {
            let mut stmt = tx.prepare(
                "SELECT task_uuid
                 FROM tasks
                 WHERE column_uuid = ?1
                 ORDER BY sort_order ASC, task_uuid ASC;",
            )?;
            let rows = stmt.query_map([column_uuid.as_str()], |row| row.get::<_, String>(0))?;
            let ids = rows.collect::<Result<Vec<_>, _>>()?;
            ids
        };
        for (index, id) in remaining.into_iter().enumerate() {
            tx.execute(
                "UPDATE tasks
                 SET sort_order = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE task_uuid = ?1;",
                params![id, index as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_board(&self, project_id: ProjectId) -> RepoResult<Board> {
        load_board(self.conn, project_id)
    }

    fn task_activity(&self, task_id: TaskId) -> RepoResult<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_uuid, user_uuid, action, field, old_value, new_value, created_at
             FROM activity_logs
             WHERE task_uuid = ?1
             ORDER BY created_at ASC, log_id ASC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(ActivityEntry {
                task_uuid: parse_uuid(row.get::<_, String>(0)?, "activity_logs.task_uuid")?,
                user_uuid: parse_uuid(row.get::<_, String>(1)?, "activity_logs.user_uuid")?,
                action: row.get(2)?,
                field: row.get(3)?,
                old_value: row.get(4)?,
                new_value: row.get(5)?,
                created_at: row.get(6)?,
            });
        }
        Ok(entries)
    }
}

/// Loads one project's board, ordered by `(sort_order, uuid)`.
///
/// Orders are returned as stored; drift shows up in
/// [`Board::check_invariants`].
pub(crate) fn load_board(conn: &Connection, project_id: ProjectId) -> RepoResult<Board> {
    ensure_project_exists(conn, project_id)?;

    let mut columns = Vec::new();
    let mut index_by_id = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT column_uuid, name, sort_order
             FROM board_columns
             WHERE project_uuid = ?1
             ORDER BY sort_order ASC, column_uuid ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        while let Some(row) = rows.next()? {
            let id = parse_uuid(row.get::<_, String>(0)?, "board_columns.column_uuid")?;
            index_by_id.insert(id, columns.len());
            columns.push(Column::new(id, row.get::<_, String>(1)?, row.get(2)?));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT task_uuid, column_uuid, sort_order, title
         FROM tasks
         WHERE project_uuid = ?1
         ORDER BY sort_order ASC, task_uuid ASC;",
    )?;
    let mut rows = stmt.query([project_id.to_string()])?;
    while let Some(row) = rows.next()? {
        let task = TaskRef {
            id: parse_uuid(row.get::<_, String>(0)?, "tasks.task_uuid")?,
            column_id: parse_uuid(row.get::<_, String>(1)?, "tasks.column_uuid")?,
            order: row.get(2)?,
            title: row.get(3)?,
        };
        let Some(index) = index_by_id.get(&task.column_id) else {
            return Err(RepoError::InvalidData(format!(
                "task {} references column {} outside project {}",
                task.id, task.column_id, project_id
            )));
        };
        columns[*index].tasks.push(task);
    }

    Ok(Board::from_columns(columns))
}

pub(crate) fn member_role(
    conn: &Connection,
    project_id: ProjectId,
    user_id: UserId,
) -> RepoResult<Option<MemberRole>> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role
             FROM project_members
             WHERE project_uuid = ?1
               AND user_uuid = ?2;",
            params![project_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    role.map(|value| {
        MemberRole::parse(&value)
            .ok_or_else(|| RepoError::InvalidData(format!("unknown member role `{value}`")))
    })
    .transpose()
}

pub(crate) fn ensure_project_exists(conn: &Connection, project_id: ProjectId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE project_uuid = ?1);",
        [project_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::ProjectNotFound(project_id))
    }
}

fn ensure_column_in_project(
    conn: &Connection,
    project_id: ProjectId,
    column_id: ColumnId,
) -> RepoResult<()> {
    ensure_project_exists(conn, project_id)?;
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM board_columns
            WHERE column_uuid = ?1 AND project_uuid = ?2
        );",
        params![column_id.to_string(), project_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::ColumnNotFound(column_id))
    }
}

fn list_column_ids(conn: &Connection, project_id: ProjectId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT column_uuid
         FROM board_columns
         WHERE project_uuid = ?1
         ORDER BY sort_order ASC, column_uuid ASC;",
    )?;
    let rows = stmt.query_map([project_id.to_string()], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    Ok(Project {
        project_uuid: parse_uuid(row.get::<_, String>(0)?, "projects.project_uuid")?,
        name: row.get(1)?,
        owner_uuid: parse_uuid(row.get::<_, String>(2)?, "projects.owner_uuid")?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<TaskRecord> {
    Ok(TaskRecord {
        task_uuid: parse_uuid(row.get::<_, String>(0)?, "tasks.task_uuid")?,
        project_uuid: parse_uuid(row.get::<_, String>(1)?, "tasks.project_uuid")?,
        column_uuid: parse_uuid(row.get::<_, String>(2)?, "tasks.column_uuid")?,
        title: row.get(3)?,
        sort_order: row.get(4)?,
        creator_uuid: parse_uuid(row.get::<_, String>(5)?, "tasks.creator_uuid")?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) fn parse_uuid(value: String, field: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|err| RepoError::InvalidData(format!("{field} `{value}` is not a uuid: {err}")))
}

fn ensure_board_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    const REQUIRED: &[(&str, &[&str])] = &[
        ("projects", &["project_uuid", "name", "owner_uuid"]),
        ("project_members", &["project_uuid", "user_uuid", "role"]),
        (
            "board_columns",
            &["column_uuid", "project_uuid", "name", "sort_order"],
        ),
        (
            "tasks",
            &[
                "task_uuid",
                "project_uuid",
                "column_uuid",
                "title",
                "sort_order",
                "creator_uuid",
            ],
        ),
        (
            "activity_logs",
            &["task_uuid", "user_uuid", "action", "old_value", "new_value"],
        ),
    ];

    for &(table, columns) in REQUIRED {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
