//! Drag session state machine.
//!
//! # Responsibility
//! - Track one drag gesture at a time (`Idle -> Dragging -> Committing`).
//! - Apply provisional moves to the working board for live feedback.
//! - Hand dropped boards to reconciliation and settle commit outcomes.
//!
//! # Invariants
//! - Only one gesture is active; a new one may start while commits are
//!   still in flight.
//! - Column drags never change task assignment; task drags never change
//!   column order.
//! - Gesture callbacks never panic; misuse is reported as `DragError` and
//!   rejected moves are no-ops.
//! - A failed commit restores last-confirmed, even under a newer gesture,
//!   and the gesture is rebased onto last-confirmed.
//! - Last-confirmed advances by replaying each successful payload, so it
//!   tracks the stored rows when commits settle out of order.

use crate::gateway::{GatewayResult, PersistenceGateway};
use crate::model::board::{Board, ColumnId, ElementKind, ProjectId};
use crate::reconcile::{
    plan_reorder, BoardSnapshots, CommitId, CommitKind, PendingCommit, ReorderPlan,
};
use log::{debug, info, warn};
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Gesture misuse reported by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragError {
    /// Id names neither a column nor a task on the working board.
    UnknownElement(Uuid),
    /// A gesture for this element is already active.
    AlreadyDragging(Uuid),
    NotDragging,
    ActiveMismatch { active: Uuid, got: Uuid },
    UnknownCommit(CommitId),
}

impl Display for DragError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownElement(id) => write!(f, "board element not found: {id}"),
            Self::AlreadyDragging(id) => write!(f, "drag already active for element {id}"),
            Self::NotDragging => write!(f, "no drag is active"),
            Self::ActiveMismatch { active, got } => {
                write!(f, "drag is active for {active}, got event for {got}")
            }
            Self::UnknownCommit(id) => write!(f, "commit {id} is not in flight"),
        }
    }
}

impl Error for DragError {}

/// The gesture currently in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDrag {
    pub element_id: Uuid,
    pub kind: ElementKind,
    baseline: Board,
}

impl ActiveDrag {
    /// Working board as it stood when the gesture started.
    pub fn baseline(&self) -> &Board {
        &self.baseline
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging(ActiveDrag),
    /// No gesture active; newest drop still waiting for its gateway call.
    Committing(CommitId),
}

/// Result of a drop, before any gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// No valid target; working board restored.
    Cancelled,
    /// Valid drop that left the order as it was; nothing to persist.
    Unchanged,
    Commit(PendingCommit),
}

/// Result of a drop after its gateway call settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropResolution {
    Cancelled,
    Unchanged,
    Committed(CommitKind),
    RolledBack { kind: CommitKind, reason: String },
}

/// Notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    CommitSucceeded {
        commit_id: CommitId,
        kind: CommitKind,
    },
    CommitFailed {
        commit_id: CommitId,
        kind: CommitKind,
        reason: String,
    },
    /// Derived server-side data may have changed; refetch the board.
    RefreshRequested { project_id: ProjectId },
}

#[derive(Debug, Clone)]
struct InFlight {
    plan: ReorderPlan,
}

/// Owns one project's board state and drives drag gestures over it.
#[derive(Debug)]
pub struct DragSession {
    project_id: ProjectId,
    boards: BoardSnapshots,
    phase: DragPhase,
    in_flight: BTreeMap<CommitId, InFlight>,
    next_commit_id: CommitId,
    events: VecDeque<BoardEvent>,
}

impl DragSession {
    /// Creates a session over a last-confirmed board.
    pub fn new(project_id: ProjectId, confirmed: Board) -> Self {
        Self {
            project_id,
            boards: BoardSnapshots::new(confirmed),
            phase: DragPhase::Idle,
            in_flight: BTreeMap::new(),
            next_commit_id: 1,
            events: VecDeque::new(),
        }
    }

    /// Creates a session from the gateway's current snapshot.
    pub fn load<G: PersistenceGateway + ?Sized>(
        gateway: &G,
        project_id: ProjectId,
    ) -> GatewayResult<Self> {
        let board = gateway.fetch_board(project_id)?;
        info!(
            "event=board_load module=drag status=ok project_id={} columns={} tasks={}",
            project_id,
            board.columns.len(),
            board.task_count()
        );
        Ok(Self::new(project_id, board))
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Board to render: the working copy.
    pub fn board(&self) -> &Board {
        self.boards.working()
    }

    pub fn confirmed_board(&self) -> &Board {
        self.boards.confirmed()
    }

    pub fn phase(&self) -> &DragPhase {
        &self.phase
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Starts a gesture for a column or task.
    pub fn on_drag_start(&mut self, element_id: Uuid) -> Result<ElementKind, DragError> {
        if let DragPhase::Dragging(active) = &self.phase {
            return Err(DragError::AlreadyDragging(active.element_id));
        }
        let kind = self
            .board()
            .element_kind(element_id)
            .ok_or(DragError::UnknownElement(element_id))?;

        debug!(
            "event=drag_start module=drag status=ok element_id={} kind={} in_flight={}",
            element_id,
            kind.as_str(),
            self.in_flight.len()
        );
        self.phase = DragPhase::Dragging(ActiveDrag {
            element_id,
            kind,
            baseline: self.board().clone(),
        });
        Ok(kind)
    }

    /// Applies the provisional move for the hovered target.
    ///
    /// Returns whether the working board changed.
    pub fn on_drag_over(&mut self, active_id: Uuid, over_id: Uuid) -> Result<bool, DragError> {
        let kind = self.active(active_id)?.kind;
        if active_id == over_id {
            return Ok(false);
        }
        let Some(over_kind) = self.board().element_kind(over_id) else {
            return Ok(false);
        };

        match kind {
            // Column moves land once, at drop.
            ElementKind::Column => Ok(false),
            ElementKind::Task => Ok(self.apply_task_over(active_id, over_id, over_kind)),
        }
    }

    /// Ends the gesture over `over_id`, or cancels when there is no target.
    pub fn on_drag_end(
        &mut self,
        active_id: Uuid,
        over_id: Option<Uuid>,
    ) -> Result<DropOutcome, DragError> {
        self.active(active_id)?;
        let DragPhase::Dragging(active) = std::mem::replace(&mut self.phase, DragPhase::Idle)
        else {
            return Err(DragError::NotDragging);
        };

        let target = over_id.filter(|id| self.board().element_kind(*id).is_some());
        let Some(target) = target else {
            self.restore(active);
            return Ok(DropOutcome::Cancelled);
        };

        if active.kind == ElementKind::Column {
            self.apply_column_drop(active_id, target);
        }

        let plan = plan_reorder(active.kind, active_id, &active.baseline, self.board());
        let Some(plan) = plan else {
            debug!(
                "event=drag_end module=drag status=noop element_id={} kind={}",
                active_id,
                active.kind.as_str()
            );
            self.phase = self.resting_phase();
            return Ok(DropOutcome::Unchanged);
        };

        Ok(DropOutcome::Commit(self.begin_commit(plan)))
    }

    /// Abandons the gesture and restores the board it started from.
    pub fn on_drag_cancel(&mut self) -> Result<(), DragError> {
        if !matches!(self.phase, DragPhase::Dragging(_)) {
            return Err(DragError::NotDragging);
        }
        if let DragPhase::Dragging(active) = std::mem::replace(&mut self.phase, DragPhase::Idle) {
            self.restore(active);
        }
        Ok(())
    }

    /// Applies the gateway result of an in-flight commit.
    ///
    /// Success replays the commit's payload onto last-confirmed. Failure
    /// restores last-confirmed into the working copy and, when a newer
    /// gesture is active, into that gesture's baseline.
    pub fn settle(
        &mut self,
        commit_id: CommitId,
        result: GatewayResult<()>,
    ) -> Result<(), DragError> {
        let InFlight { plan } = self
            .in_flight
            .remove(&commit_id)
            .ok_or(DragError::UnknownCommit(commit_id))?;
        let kind = plan.kind();
        let dragging = matches!(self.phase, DragPhase::Dragging(_));

        match result {
            Ok(()) => {
                let sync_working = !dragging && self.in_flight.is_empty();
                let committed = plan.apply_to(self.boards.confirmed());
                self.boards.accept(committed, sync_working);
                self.events.push_back(BoardEvent::CommitSucceeded { commit_id, kind });
                self.events.push_back(BoardEvent::RefreshRequested {
                    project_id: self.project_id,
                });
            }
            Err(err) => {
                if dragging {
                    warn!(
                        "event=commit_rollback module=drag status=error commit_id={} project_id={} error_code=rollback_during_drag",
                        commit_id, self.project_id
                    );
                }
                self.boards.roll_back();
                if let DragPhase::Dragging(active) = &mut self.phase {
                    active.baseline = self.boards.confirmed().clone();
                }
                self.events.push_back(BoardEvent::CommitFailed {
                    commit_id,
                    kind,
                    reason: err.to_string(),
                });
            }
        }

        if !dragging {
            self.phase = self.resting_phase();
        }
        Ok(())
    }

    /// Ends the gesture, runs the gateway call inline, and settles it.
    pub fn drop_and_commit<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &G,
        active_id: Uuid,
        over_id: Option<Uuid>,
    ) -> Result<DropResolution, DragError> {
        let pending = match self.on_drag_end(active_id, over_id)? {
            DropOutcome::Cancelled => return Ok(DropResolution::Cancelled),
            DropOutcome::Unchanged => return Ok(DropResolution::Unchanged),
            DropOutcome::Commit(pending) => pending,
        };

        let kind = pending.plan.kind();
        let result = pending.execute(gateway);
        let resolution = match &result {
            Ok(()) => DropResolution::Committed(kind),
            Err(err) => DropResolution::RolledBack {
                kind,
                reason: err.to_string(),
            },
        };
        self.settle(pending.id, result)?;
        Ok(resolution)
    }

    /// Replaces both boards with a fetched snapshot when nothing is pending.
    ///
    /// Returns `false` and keeps local state while a gesture or commit is
    /// still open.
    pub fn refresh(&mut self, fetched: Board) -> bool {
        if !matches!(self.phase, DragPhase::Idle) || !self.in_flight.is_empty() {
            debug!(
                "event=board_refresh module=drag status=noop project_id={} in_flight={}",
                self.project_id,
                self.in_flight.len()
            );
            return false;
        }
        self.boards.replace(fetched);
        true
    }

    /// Fetches the stored board and applies it through [`DragSession::refresh`].
    pub fn refresh_from<G: PersistenceGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> GatewayResult<bool> {
        let fetched = gateway.fetch_board(self.project_id)?;
        Ok(self.refresh(fetched))
    }

    /// Takes every pending notification in emission order.
    pub fn drain_events(&mut self) -> Vec<BoardEvent> {
        self.events.drain(..).collect()
    }

    fn active(&self, active_id: Uuid) -> Result<&ActiveDrag, DragError> {
        match &self.phase {
            DragPhase::Dragging(active) if active.element_id == active_id => Ok(active),
            DragPhase::Dragging(active) => Err(DragError::ActiveMismatch {
                active: active.element_id,
                got: active_id,
            }),
            _ => Err(DragError::NotDragging),
        }
    }

    fn apply_task_over(&mut self, task_id: Uuid, over_id: Uuid, over_kind: ElementKind) -> bool {
        let board = self.boards.working_mut();
        let Some(source) = board.locate_task(task_id) else {
            return false;
        };

        let result = match over_kind {
            ElementKind::Task => {
                let Some(target) = board.locate_task(over_id) else {
                    return false;
                };
                if target.column_id == source.column_id {
                    board.move_task_within_column(
                        source.column_id,
                        source.task_index,
                        target.task_index,
                    )
                } else {
                    board.move_task_across_columns(
                        task_id,
                        source.column_id,
                        target.column_id,
                        target.task_index,
                    )
                }
            }
            ElementKind::Column => {
                if over_id == source.column_id {
                    return false;
                }
                let end = board.column(over_id).map_or(0, |column| column.tasks.len());
                board.move_task_across_columns(task_id, source.column_id, over_id, end)
            }
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                debug!(
                    "event=drag_over module=drag status=noop task_id={} over_id={} error={}",
                    task_id, over_id, err
                );
                false
            }
        }
    }

    fn apply_column_drop(&mut self, column_id: ColumnId, target: Uuid) {
        let board = self.boards.working_mut();
        let target_column = match board.element_kind(target) {
            Some(ElementKind::Task) => board.locate_task(target).map(|loc| loc.column_id),
            Some(ElementKind::Column) => Some(target),
            None => None,
        };
        let from = board.column_index(column_id);
        let to = target_column.and_then(|id| board.column_index(id));
        if let (Some(from), Some(to)) = (from, to) {
            if from != to {
                if let Err(err) = board.move_column(from, to) {
                    debug!(
                        "event=drag_end module=drag status=noop column_id={} error={}",
                        column_id, err
                    );
                }
            }
        }
    }

    fn begin_commit(&mut self, plan: ReorderPlan) -> PendingCommit {
        let id = self.next_commit_id;
        self.next_commit_id += 1;
        self.in_flight.insert(id, InFlight { plan: plan.clone() });
        self.phase = DragPhase::Committing(id);
        info!(
            "event=drag_end module=drag status=ok commit_id={} project_id={} writes={}",
            id,
            self.project_id,
            plan.write_count()
        );
        PendingCommit {
            id,
            project_id: self.project_id,
            plan,
        }
    }

    fn restore(&mut self, active: ActiveDrag) {
        debug!(
            "event=drag_cancel module=drag status=ok element_id={} kind={}",
            active.element_id,
            active.kind.as_str()
        );
        *self.boards.working_mut() = active.baseline;
        self.phase = self.resting_phase();
    }

    fn resting_phase(&self) -> DragPhase {
        match self.in_flight.keys().next_back() {
            Some(id) => DragPhase::Committing(*id),
            None => DragPhase::Idle,
        }
    }
}
