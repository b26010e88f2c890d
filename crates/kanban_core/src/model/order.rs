//! Invariant-preserving board moves.
//!
//! # Responsibility
//! - Reorder tasks within a column, across columns, and reorder columns.
//! - Renumber every touched sequence densely after each move.
//!
//! # Invariants
//! - A rejected move leaves the board untouched.
//! - Task moves never change column order; column moves never change
//!   task assignment.

use super::board::{Board, ColumnId, TaskId, TaskRef};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reasons a move is rejected locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderError {
    ColumnNotFound(ColumnId),
    /// Task is not present in the named source column.
    TaskNotFound {
        task_id: TaskId,
        column_id: ColumnId,
    },
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },
}

impl Display for OrderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ColumnNotFound(id) => write!(f, "column not found on board: {id}"),
            Self::TaskNotFound { task_id, column_id } => {
                write!(f, "task {task_id} not found in column {column_id}")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
        }
    }
}

impl Error for OrderError {}

pub type OrderResult<T> = Result<T, OrderError>;

impl Board {
    /// Moves the task at `from_index` to `to_index` inside one column.
    pub fn move_task_within_column(
        &mut self,
        column_id: ColumnId,
        from_index: usize,
        to_index: usize,
    ) -> OrderResult<()> {
        let column_index = self
            .column_index(column_id)
            .ok_or(OrderError::ColumnNotFound(column_id))?;
        let tasks = &mut self.columns[column_index].tasks;
        let len = tasks.len();
        for index in [from_index, to_index] {
            if index >= len {
                return Err(OrderError::IndexOutOfBounds { index, len });
            }
        }

        let task = tasks.remove(from_index);
        tasks.insert(to_index, task);
        renumber_tasks(tasks, column_id);
        Ok(())
    }

    /// Moves one task into another column at `to_index`.
    ///
    /// `to_index == destination.len()` appends. When both columns are the
    /// same this is a within-column move with `to_index` clamped to the
    /// last slot.
    pub fn move_task_across_columns(
        &mut self,
        task_id: TaskId,
        from_column_id: ColumnId,
        to_column_id: ColumnId,
        to_index: usize,
    ) -> OrderResult<()> {
        let from = self
            .column_index(from_column_id)
            .ok_or(OrderError::ColumnNotFound(from_column_id))?;
        let to = self
            .column_index(to_column_id)
            .ok_or(OrderError::ColumnNotFound(to_column_id))?;
        let task_index =
            self.columns[from]
                .task_index(task_id)
                .ok_or(OrderError::TaskNotFound {
                    task_id,
                    column_id: from_column_id,
                })?;

        if from == to {
            let last = self.columns[from].tasks.len() - 1;
            return self.move_task_within_column(from_column_id, task_index, to_index.min(last));
        }

        let len = self.columns[to].tasks.len();
        if to_index > len {
            return Err(OrderError::IndexOutOfBounds {
                index: to_index,
                len,
            });
        }

        let mut task = self.columns[from].tasks.remove(task_index);
        task.column_id = to_column_id;
        self.columns[to].tasks.insert(to_index, task);

        renumber_tasks(&mut self.columns[from].tasks, from_column_id);
        renumber_tasks(&mut self.columns[to].tasks, to_column_id);
        Ok(())
    }

    /// Moves the column at `from_index` to `to_index`.
    pub fn move_column(&mut self, from_index: usize, to_index: usize) -> OrderResult<()> {
        let len = self.columns.len();
        for index in [from_index, to_index] {
            if index >= len {
                return Err(OrderError::IndexOutOfBounds { index, len });
            }
        }

        let column = self.columns.remove(from_index);
        self.columns.insert(to_index, column);
        for (index, column) in self.columns.iter_mut().enumerate() {
            column.order = index as i64;
        }
        Ok(())
    }
}

fn renumber_tasks(tasks: &mut [TaskRef], column_id: ColumnId) {
    for (index, task) in tasks.iter_mut().enumerate() {
        task.order = index as i64;
        task.column_id = column_id;
    }
}
