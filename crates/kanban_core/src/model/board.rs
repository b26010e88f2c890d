//! Board aggregate and its ordering projection.
//!
//! # Responsibility
//! - Define the column/task ordering shape rendered by the board view.
//! - Provide lookup helpers and invariant checks over one project board.
//!
//! # Invariants
//! - Every task belongs to exactly one column and its `column_id` names it.
//! - Task `order` values inside one column are a dense `0..n-1` permutation.
//! - Column `order` values across the board are a dense `0..m-1` permutation.
//!
//! Boards loaded from a drifted store may violate density; every move
//! re-densifies the columns it touches.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable project identifier.
pub type ProjectId = Uuid;
/// Stable column identifier.
pub type ColumnId = Uuid;
/// Stable task identifier.
pub type TaskId = Uuid;
/// Stable user identifier, owned by the external auth collaborator.
pub type UserId = Uuid;

/// Kind of a draggable board element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Column,
    Task,
}

impl ElementKind {
    /// Stable lowercase label used in logs and FFI envelopes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Column => "column",
            Self::Task => "task",
        }
    }
}

/// Ordering projection of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub id: TaskId,
    pub column_id: ColumnId,
    /// Dense zero-based rank inside the owning column.
    pub order: i64,
    /// Display label only; never used for ordering.
    pub title: String,
}

/// One board column with its tasks in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    /// Dense zero-based rank across the board.
    pub order: i64,
    pub tasks: Vec<TaskRef>,
}

impl Column {
    /// Creates an empty column.
    pub fn new(id: ColumnId, name: impl Into<String>, order: i64) -> Self {
        Self {
            id,
            name: name.into(),
            order,
            tasks: Vec::new(),
        }
    }

    /// Returns the index of `task_id` inside this column.
    pub fn task_index(&self, task_id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == task_id)
    }

    /// Task ids in display order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|task| task.id).collect()
    }
}

/// Where a task currently sits on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLocation {
    pub column_index: usize,
    pub column_id: ColumnId,
    pub task_index: usize,
}

/// Aggregate root for one project's kanban ordering state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
}

impl Board {
    /// Builds a board, sorting columns and tasks by `(order, id)`.
    ///
    /// Orders are kept as given, so drift in the source stays visible to
    /// [`Board::check_invariants`].
    pub fn from_columns(mut columns: Vec<Column>) -> Self {
        columns.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
        for column in &mut columns {
            column
                .tasks
                .sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
        }
        Self { columns }
    }

    pub fn column(&self, column_id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == column_id)
    }

    pub fn column_index(&self, column_id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|column| column.id == column_id)
    }

    /// Finds the column and index holding `task_id`.
    pub fn locate_task(&self, task_id: TaskId) -> Option<TaskLocation> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(column_index, column)| {
                column.task_index(task_id).map(|task_index| TaskLocation {
                    column_index,
                    column_id: column.id,
                    task_index,
                })
            })
    }

    pub fn task(&self, task_id: TaskId) -> Option<&TaskRef> {
        self.locate_task(task_id)
            .map(|loc| &self.columns[loc.column_index].tasks[loc.task_index])
    }

    /// Resolves whether `id` names a column or a task on this board.
    pub fn element_kind(&self, id: Uuid) -> Option<ElementKind> {
        if self.column_index(id).is_some() {
            return Some(ElementKind::Column);
        }
        self.locate_task(id).map(|_| ElementKind::Task)
    }

    /// Column ids in display order.
    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|column| column.id).collect()
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|column| column.tasks.len()).sum()
    }

    /// Returns every ordering invariant this board currently violates.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        let column_orders = self.columns.iter().map(|column| column.order);
        if !is_dense(column_orders) {
            violations.push(InvariantViolation::ColumnOrderNotDense);
        }

        let mut seen_tasks = HashSet::new();
        for column in &self.columns {
            for task in &column.tasks {
                if task.column_id != column.id {
                    violations.push(InvariantViolation::ForeignColumnId {
                        task_id: task.id,
                        column_id: column.id,
                    });
                }
                if !seen_tasks.insert(task.id) {
                    violations.push(InvariantViolation::DuplicateTask(task.id));
                }
            }
            if !is_dense(column.tasks.iter().map(|task| task.order)) {
                violations.push(InvariantViolation::TaskOrderNotDense(column.id));
            }
        }

        violations
    }

    /// Shorthand for an empty [`Board::check_invariants`] result.
    pub fn is_consistent(&self) -> bool {
        self.check_invariants().is_empty()
    }
}

/// One broken board invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    ColumnOrderNotDense,
    TaskOrderNotDense(ColumnId),
    ForeignColumnId { task_id: TaskId, column_id: ColumnId },
    DuplicateTask(TaskId),
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ColumnOrderNotDense => write!(f, "column orders are not a dense permutation"),
            Self::TaskOrderNotDense(id) => {
                write!(f, "task orders in column {id} are not a dense permutation")
            }
            Self::ForeignColumnId { task_id, column_id } => write!(
                f,
                "task {task_id} sits in column {column_id} but names another column"
            ),
            Self::DuplicateTask(id) => write!(f, "task {id} appears more than once"),
        }
    }
}

/// Orders must equal their position after sorting, i.e. exactly `0..n`.
fn is_dense(orders: impl Iterator<Item = i64>) -> bool {
    let mut values: Vec<i64> = orders.collect();
    values.sort_unstable();
    values
        .iter()
        .enumerate()
        .all(|(index, value)| *value == index as i64)
}
