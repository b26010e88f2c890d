//! Board use-case service.
//!
//! # Responsibility
//! - Validate names and permissions above the repository layer.
//! - Provide project, column and task create/rename/delete entry points.
//!
//! # Invariants
//! - Names and titles are trimmed and never blank.
//! - Every call is made on behalf of a project member.
//! - `member` role users may delete only tasks they created.

use crate::model::board::{Board, Column, ColumnId, ProjectId, TaskId, UserId};
use crate::repo::board_repo::{BoardRepository, MemberRole, Project, RepoError, TaskRecord};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from board service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Named field is blank after trim.
    BlankName(&'static str),
    /// Acting user is not a member of the project.
    NotMember {
        project_id: ProjectId,
        user_id: UserId,
    },
    /// Acting user's role does not allow the operation.
    Forbidden {
        user_id: UserId,
        action: &'static str,
    },
    ProjectNotFound(ProjectId),
    ColumnNotFound(ColumnId),
    TaskNotFound(TaskId),
    ColumnNotEmpty { column_id: ColumnId, tasks: usize },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName(field) => write!(f, "{field} must not be blank"),
            Self::NotMember {
                project_id,
                user_id,
            } => write!(f, "user {user_id} is not a member of project {project_id}"),
            Self::Forbidden { user_id, action } => {
                write!(f, "user {user_id} is not allowed to {action}")
            }
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::ColumnNotFound(id) => write!(f, "column not found: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::ColumnNotEmpty { column_id, tasks } => {
                write!(f, "column {column_id} still holds {tasks} task(s)")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            RepoError::ColumnNotFound(id) => Self::ColumnNotFound(id),
            RepoError::TaskNotFound(id) => Self::TaskNotFound(id),
            RepoError::ColumnNotEmpty { column_id, tasks } => {
                Self::ColumnNotEmpty { column_id, tasks }
            }
            other => Self::Repo(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Board service facade.
pub struct BoardService<R: BoardRepository> {
    repo: R,
}

impl<R: BoardRepository> BoardService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a project owned by `owner` with the default columns.
    pub fn create_project(
        &self,
        name: impl Into<String>,
        owner: UserId,
    ) -> ServiceResult<Project> {
        let name = normalize_name(name.into(), "project name")?;
        let project = self.repo.create_project(name.as_str(), owner)?;
        info!(
            "event=project_create module=service status=ok project_id={} owner_id={}",
            project.project_uuid, owner
        );
        Ok(project)
    }

    /// Adds `user_id` to the project. Only owners and admins may invite.
    pub fn add_member(
        &self,
        actor: UserId,
        project_id: ProjectId,
        user_id: UserId,
        role: MemberRole,
    ) -> ServiceResult<()> {
        let actor_role = self.require_member(actor, project_id)?;
        if !actor_role.can_manage_board() {
            return Err(ServiceError::Forbidden {
                user_id: actor,
                action: "add members",
            });
        }
        self.repo
            .add_member(project_id, user_id, role)
            .map_err(Into::into)
    }

    pub fn create_column(
        &self,
        actor: UserId,
        project_id: ProjectId,
        name: impl Into<String>,
    ) -> ServiceResult<Column> {
        let name = normalize_name(name.into(), "column name")?;
        self.require_member(actor, project_id)?;
        self.repo
            .create_column(project_id, name.as_str())
            .map_err(Into::into)
    }

    pub fn rename_column(
        &self,
        actor: UserId,
        project_id: ProjectId,
        column_id: ColumnId,
        name: impl Into<String>,
    ) -> ServiceResult<()> {
        let name = normalize_name(name.into(), "column name")?;
        self.require_member(actor, project_id)?;
        self.repo
            .rename_column(project_id, column_id, name.as_str())
            .map_err(Into::into)
    }

    /// Deletes an empty column.
    pub fn delete_column(
        &self,
        actor: UserId,
        project_id: ProjectId,
        column_id: ColumnId,
    ) -> ServiceResult<()> {
        self.require_member(actor, project_id)?;
        self.repo
            .delete_column(project_id, column_id)
            .map_err(Into::into)
    }

    /// Appends a task to the end of `column_id`.
    pub fn create_task(
        &self,
        actor: UserId,
        project_id: ProjectId,
        column_id: ColumnId,
        title: impl Into<String>,
    ) -> ServiceResult<TaskRecord> {
        let title = normalize_name(title.into(), "task title")?;
        self.require_member(actor, project_id)?;
        self.repo
            .create_task(project_id, column_id, title.as_str(), actor)
            .map_err(Into::into)
    }

    pub fn delete_task(
        &self,
        actor: UserId,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> ServiceResult<()> {
        let role = self.require_member(actor, project_id)?;
        let task = self
            .repo
            .get_task(task_id)?
            .filter(|task| task.project_uuid == project_id)
            .ok_or(ServiceError::TaskNotFound(task_id))?;
        if !role.can_manage_board() && task.creator_uuid != actor {
            return Err(ServiceError::Forbidden {
                user_id: actor,
                action: "delete tasks created by others",
            });
        }
        self.repo
            .delete_task(project_id, task_id)
            .map_err(Into::into)
    }

    pub fn board(&self, actor: UserId, project_id: ProjectId) -> ServiceResult<Board> {
        self.require_member(actor, project_id)?;
        self.repo.load_board(project_id).map_err(Into::into)
    }

    fn require_member(&self, actor: UserId, project_id: ProjectId) -> ServiceResult<MemberRole> {
        if self.repo.get_project(project_id)?.is_none() {
            return Err(ServiceError::ProjectNotFound(project_id));
        }
        self.repo
            .member_role(project_id, actor)?
            .ok_or(ServiceError::NotMember {
                project_id,
                user_id: actor,
            })
    }
}

fn normalize_name(value: String, field: &'static str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BlankName(field));
    }
    Ok(trimmed.to_string())
}
