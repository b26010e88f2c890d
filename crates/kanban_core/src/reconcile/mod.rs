//! Drop reconciliation: diff, persist, settle.
//!
//! # Responsibility
//! - Diff a frozen working board against the board the drag started from.
//! - Build the minimal dense reorder payload and submit it in one call.
//! - Hold last-confirmed and working boards and apply commit outcomes.
//!
//! # Invariants
//! - Column payloads always list every column.
//! - Task payloads list every task of the destination column, plus every
//!   task left in the source column when the task changed columns.
//! - A failed commit restores the last-confirmed board; nothing partial
//!   is kept.

use crate::gateway::{ColumnOrder, GatewayResult, PersistenceGateway, TaskPlacement};
use crate::model::board::{Board, Column, ColumnId, ElementKind, ProjectId, TaskId, TaskRef};
use log::{debug, error, info};
use std::time::Instant;
use uuid::Uuid;

/// Monotonic id of one submitted drop within a session.
pub type CommitId = u64;

/// What a commit changed, used for user-facing feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    ColumnsReordered,
    /// Task changed rank inside its column.
    TaskReordered,
    /// Task changed column.
    TaskMoved { from: ColumnId, to: ColumnId },
}

/// Persisted update computed for one drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderPlan {
    Columns(Vec<ColumnOrder>),
    Tasks {
        task_id: TaskId,
        kind: CommitKind,
        placements: Vec<TaskPlacement>,
    },
}

impl ReorderPlan {
    pub fn kind(&self) -> CommitKind {
        match self {
            Self::Columns(_) => CommitKind::ColumnsReordered,
            Self::Tasks { kind, .. } => *kind,
        }
    }

    /// Number of rows the gateway will rewrite.
    pub fn write_count(&self) -> usize {
        match self {
            Self::Columns(columns) => columns.len(),
            Self::Tasks { placements, .. } => placements.len(),
        }
    }

    /// Returns `board` with the payload applied the way the gateway applies
    /// it to stored rows.
    ///
    /// Rows the payload does not name keep their stored order, so a board
    /// that drifted from the payload's baseline keeps that drift visible.
    pub fn apply_to(&self, board: &Board) -> Board {
        let mut columns = board.columns.clone();
        match self {
            Self::Columns(orders) => {
                for column in &mut columns {
                    if let Some(entry) = orders.iter().find(|entry| entry.id == column.id) {
                        column.order = entry.order;
                    }
                }
            }
            Self::Tasks { placements, .. } => {
                let mut placed = Vec::with_capacity(placements.len());
                for column in &mut columns {
                    column.tasks.retain(|task| {
                        match placements.iter().find(|placement| placement.id == task.id) {
                            Some(placement) => {
                                placed.push(TaskRef {
                                    column_id: placement.column_id,
                                    order: placement.order,
                                    ..task.clone()
                                });
                                false
                            }
                            None => true,
                        }
                    });
                }
                for task in placed {
                    if let Some(column) = columns.iter_mut().find(|c| c.id == task.column_id) {
                        column.tasks.push(task);
                    }
                }
            }
        }
        Board::from_columns(columns)
    }

    /// Sends the payload to the gateway as one transactional call.
    pub fn submit<G: PersistenceGateway + ?Sized>(
        &self,
        gateway: &G,
        project_id: ProjectId,
    ) -> GatewayResult<()> {
        match self {
            Self::Columns(columns) => gateway.reorder_columns(project_id, columns),
            Self::Tasks { placements, .. } => gateway.reorder_tasks(project_id, placements),
        }
    }
}

/// Computes the reorder payload for a dropped element.
///
/// Returns `None` when the drop changed nothing worth persisting.
pub fn plan_reorder(
    kind: ElementKind,
    element_id: Uuid,
    baseline: &Board,
    frozen: &Board,
) -> Option<ReorderPlan> {
    match kind {
        ElementKind::Column => plan_columns(baseline, frozen),
        ElementKind::Task => plan_task(element_id, baseline, frozen),
    }
}

fn plan_columns(baseline: &Board, frozen: &Board) -> Option<ReorderPlan> {
    if baseline.column_ids() == frozen.column_ids() {
        return None;
    }
    let columns = frozen
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| ColumnOrder {
            id: column.id,
            order: index as i64,
        })
        .collect();
    Some(ReorderPlan::Columns(columns))
}

fn plan_task(task_id: TaskId, baseline: &Board, frozen: &Board) -> Option<ReorderPlan> {
    let origin = baseline.locate_task(task_id)?;
    let destination = frozen.locate_task(task_id)?;

    let column_changed = origin.column_id != destination.column_id;
    if !column_changed && origin.task_index == destination.task_index {
        return None;
    }

    let mut placements = placements_for(&frozen.columns[destination.column_index]);
    let kind = if column_changed {
        // Source column must be rewritten too, or its vacated rank stays a gap.
        if let Some(source) = frozen.column(origin.column_id) {
            placements.extend(placements_for(source));
        }
        CommitKind::TaskMoved {
            from: origin.column_id,
            to: destination.column_id,
        }
    } else {
        CommitKind::TaskReordered
    };

    Some(ReorderPlan::Tasks {
        task_id,
        kind,
        placements,
    })
}

fn placements_for(column: &Column) -> Vec<TaskPlacement> {
    column
        .tasks
        .iter()
        .enumerate()
        .map(|(index, task)| TaskPlacement {
            id: task.id,
            order: index as i64,
            column_id: column.id,
        })
        .collect()
}

/// A drop waiting for its gateway call.
///
/// Owns its payload so a host can run [`PendingCommit::execute`] away from
/// the UI loop and hand the result back through `DragSession::settle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub id: CommitId,
    pub project_id: ProjectId,
    pub plan: ReorderPlan,
}

impl PendingCommit {
    /// Runs the single gateway attempt for this drop.
    ///
    /// # Side effects
    /// - Emits `reorder_commit` logging events with duration and status.
    pub fn execute<G: PersistenceGateway + ?Sized>(&self, gateway: &G) -> GatewayResult<()> {
        let started_at = Instant::now();
        debug!(
            "event=reorder_commit module=reconcile status=start commit_id={} project_id={} writes={}",
            self.id,
            self.project_id,
            self.plan.write_count()
        );

        match self.plan.submit(gateway, self.project_id) {
            Ok(()) => {
                info!(
                    "event=reorder_commit module=reconcile status=ok commit_id={} project_id={} writes={} duration_ms={}",
                    self.id,
                    self.project_id,
                    self.plan.write_count(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=reorder_commit module=reconcile status=error commit_id={} project_id={} duration_ms={} error={}",
                    self.id,
                    self.project_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

/// Last-confirmed and working boards of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshots {
    confirmed: Board,
    working: Board,
}

impl BoardSnapshots {
    pub fn new(confirmed: Board) -> Self {
        Self {
            working: confirmed.clone(),
            confirmed,
        }
    }

    pub fn confirmed(&self) -> &Board {
        &self.confirmed
    }

    pub fn working(&self) -> &Board {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut Board {
        &mut self.working
    }

    /// Promotes a committed board to last-confirmed.
    ///
    /// The working copy follows only when `sync_working` is set, so an
    /// in-progress gesture keeps its provisional state.
    pub fn accept(&mut self, committed: Board, sync_working: bool) {
        if sync_working {
            self.working = committed.clone();
        }
        self.confirmed = committed;
    }

    /// Discards the working copy in favour of last-confirmed.
    pub fn roll_back(&mut self) {
        self.working = self.confirmed.clone();
    }

    /// Replaces both boards with a freshly fetched snapshot.
    pub fn replace(&mut self, fetched: Board) {
        self.working = fetched.clone();
        self.confirmed = fetched;
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_reorder, CommitKind, ReorderPlan};
    use crate::gateway::{ColumnOrder, TaskPlacement};
    use crate::model::board::{Board, Column, ElementKind, TaskRef};
    use uuid::Uuid;

    fn column(name: &str, order: i64, tasks: usize) -> Column {
        let id = Uuid::new_v4();
        let mut column = Column::new(id, name, order);
        column.tasks = (0..tasks)
            .map(|i| TaskRef {
                id: Uuid::new_v4(),
                column_id: id,
                order: i as i64,
                title: format!("{name}-{i}"),
            })
            .collect();
        column
    }

    #[test]
    fn unchanged_columns_plan_nothing() {
        let board = Board::from_columns(vec![column("A", 0, 0), column("B", 1, 0)]);
        let id = board.columns[0].id;
        assert_eq!(plan_reorder(ElementKind::Column, id, &board, &board), None);
    }

    #[test]
    fn column_move_lists_every_column() {
        let baseline = Board::from_columns(vec![
            column("A", 0, 0),
            column("B", 1, 0),
            column("C", 2, 0),
        ]);
        let ids = baseline.column_ids();
        let mut frozen = baseline.clone();
        frozen.move_column(2, 0).unwrap();

        let plan = plan_reorder(ElementKind::Column, ids[2], &baseline, &frozen).unwrap();

        assert_eq!(
            plan,
            ReorderPlan::Columns(vec![
                ColumnOrder { id: ids[2], order: 0 },
                ColumnOrder { id: ids[0], order: 1 },
                ColumnOrder { id: ids[1], order: 2 },
            ])
        );
        assert_eq!(plan.kind(), CommitKind::ColumnsReordered);
    }

    #[test]
    fn same_slot_task_drop_plans_nothing() {
        let board = Board::from_columns(vec![column("A", 0, 3)]);
        let task_id = board.columns[0].tasks[1].id;
        assert_eq!(plan_reorder(ElementKind::Task, task_id, &board, &board), None);
    }

    #[test]
    fn within_column_task_move_lists_that_column_only() {
        let baseline = Board::from_columns(vec![column("A", 0, 3), column("B", 1, 2)]);
        let a = baseline.columns[0].id;
        let ids = baseline.columns[0].task_ids();
        let mut frozen = baseline.clone();
        frozen.move_task_within_column(a, 0, 1).unwrap();

        let plan = plan_reorder(ElementKind::Task, ids[0], &baseline, &frozen).unwrap();

        let ReorderPlan::Tasks { kind, placements, .. } = plan else {
            panic!("expected task plan");
        };
        assert_eq!(kind, CommitKind::TaskReordered);
        assert_eq!(
            placements,
            vec![
                TaskPlacement { id: ids[1], order: 0, column_id: a },
                TaskPlacement { id: ids[0], order: 1, column_id: a },
                TaskPlacement { id: ids[2], order: 2, column_id: a },
            ]
        );
    }

    #[test]
    fn cross_column_move_lists_destination_then_source() {
        let baseline = Board::from_columns(vec![column("Todo", 0, 2), column("Doing", 1, 0)]);
        let todo = baseline.columns[0].id;
        let doing = baseline.columns[1].id;
        let t1 = baseline.columns[0].tasks[0].id;
        let t2 = baseline.columns[0].tasks[1].id;
        let mut frozen = baseline.clone();
        frozen.move_task_across_columns(t1, todo, doing, 0).unwrap();

        let plan = plan_reorder(ElementKind::Task, t1, &baseline, &frozen).unwrap();

        assert_eq!(plan.kind(), CommitKind::TaskMoved { from: todo, to: doing });
        let ReorderPlan::Tasks { placements, .. } = plan else {
            panic!("expected task plan");
        };
        assert_eq!(
            placements,
            vec![
                TaskPlacement { id: t1, order: 0, column_id: doing },
                TaskPlacement { id: t2, order: 0, column_id: todo },
            ]
        );
    }

    #[test]
    fn applying_a_plan_to_its_baseline_yields_the_frozen_board() {
        let baseline = Board::from_columns(vec![column("Todo", 0, 3), column("Doing", 1, 1)]);
        let todo = baseline.columns[0].id;
        let doing = baseline.columns[1].id;
        let moved = baseline.columns[0].tasks[1].id;
        let mut frozen = baseline.clone();
        frozen.move_task_across_columns(moved, todo, doing, 0).unwrap();
        frozen.move_column(1, 0).unwrap();

        let task_plan = plan_reorder(ElementKind::Task, moved, &baseline, &frozen).unwrap();
        let column_plan = plan_reorder(ElementKind::Column, doing, &baseline, &frozen).unwrap();

        let applied = column_plan.apply_to(&task_plan.apply_to(&baseline));
        assert_eq!(applied, frozen);
    }

    #[test]
    fn applying_a_plan_leaves_unnamed_rows_alone() {
        let stored = Board::from_columns(vec![
            column("A", 0, 2),
            column("B", 1, 1),
            column("C", 2, 2),
        ]);
        let c = stored.columns[2].id;
        let c_tasks = stored.columns[2].task_ids();
        let plan = ReorderPlan::Tasks {
            task_id: c_tasks[1],
            kind: CommitKind::TaskReordered,
            placements: vec![
                TaskPlacement { id: c_tasks[1], order: 0, column_id: c },
                TaskPlacement { id: c_tasks[0], order: 1, column_id: c },
            ],
        };

        let applied = plan.apply_to(&stored);

        assert_eq!(applied.columns[0], stored.columns[0]);
        assert_eq!(applied.columns[1], stored.columns[1]);
        assert_eq!(applied.columns[2].task_ids(), vec![c_tasks[1], c_tasks[0]]);
        assert!(applied.is_consistent());
    }
}
