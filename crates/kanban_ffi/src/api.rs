//! FFI board API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose board seeding, drag gestures and notifications to Dart via FRB.
//! - Own the single process-wide drag session slot.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - The session lock is never held across a gateway write.
//! - A commit settles only into the session generation that issued it.
//! - Ids cross the boundary as hyphenated UUID strings.

use kanban_core::db::open_db;
use kanban_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, Board, BoardEvent,
    BoardService, CommitKind, DragSession, DropOutcome, PersistenceGateway, ProjectId,
    GatewayResult, PendingCommit, SqliteBoardGateway, SqliteBoardRepository, UserId,
};
use log::{info, warn};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use uuid::Uuid;

const BOARD_DB_FILE_NAME: &str = "kanban_board.sqlite3";
static BOARD_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static SESSION: Mutex<Option<OpenBoard>> = Mutex::new(None);
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

struct OpenBoard {
    /// Distinguishes sessions whose commit ids would otherwise collide.
    generation: u64,
    actor: UserId,
    session: DragSession,
}

impl OpenBoard {
    fn new(actor: UserId, session: DragSession) -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            actor,
            session,
        }
    }
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory for rolling logs.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One task as rendered by the board view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub id: String,
    pub column_id: String,
    pub order: i64,
    pub title: String,
}

/// One column with its tasks in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnView {
    pub id: String,
    pub name: String,
    pub order: i64,
    pub tasks: Vec<TaskView>,
}

/// Response envelope for board and gesture calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardResponse {
    pub ok: bool,
    /// Whether the visible board changed during this call.
    pub changed: bool,
    /// Working board after the call; empty when no session is open.
    pub columns: Vec<ColumnView>,
    pub message: String,
}

impl BoardResponse {
    fn success(message: impl Into<String>, changed: bool, board: &Board) -> Self {
        Self {
            ok: true,
            changed,
            columns: to_column_views(board),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            changed: false,
            columns: Vec::new(),
            message: message.into(),
        }
    }
}

/// Response envelope for create calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Created row id.
    pub id: Option<String>,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, id: Uuid) -> Self {
        Self {
            ok: true,
            id: Some(id.to_string()),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            message: message.into(),
        }
    }
}

/// Notification drained by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardEventView {
    /// `commit_succeeded|commit_failed|refresh_requested`.
    pub kind: String,
    pub commit_id: Option<u64>,
    pub message: String,
}

/// Loads a project board and makes it the active session.
///
/// Replaces any previously open session; its pending commits are dropped.
#[flutter_rust_bridge::frb(sync)]
pub fn board_open(project_id: String, actor_id: String) -> BoardResponse {
    let result = parse_id(&project_id, "project_id").and_then(|project_id| {
        let actor = parse_id(&actor_id, "actor_id")?;
        let conn = open_connection()?;
        let gateway = board_gateway(&conn, actor)?;
        let session = DragSession::load(&gateway, project_id).map_err(|err| err.to_string())?;
        Ok(OpenBoard::new(actor, session))
    });

    match result {
        Ok(open) => {
            let mut slot = lock_session();
            let response = BoardResponse::success("Board opened.", true, open.session.board());
            *slot = Some(open);
            response
        }
        Err(err) => BoardResponse::failure(format!("board_open failed: {err}")),
    }
}

/// Returns the working board of the open session.
#[flutter_rust_bridge::frb(sync)]
pub fn board_snapshot() -> BoardResponse {
    with_session("board_snapshot", |open| {
        Ok(BoardResponse::success("", false, open.session.board()))
    })
}

/// Refetches the stored board; applied only when no gesture or commit is open.
#[flutter_rust_bridge::frb(sync)]
pub fn board_refresh() -> BoardResponse {
    let target = with_session_value(|open| (open.session.project_id(), open.actor));
    let Some((project_id, actor)) = target else {
        return BoardResponse::failure("board_refresh failed: no board is open");
    };

    let fetched = open_connection().and_then(|conn| {
        let gateway = board_gateway(&conn, actor)?;
        gateway
            .fetch_board(project_id)
            .map_err(|err| err.to_string())
    });
    let fetched = match fetched {
        Ok(board) => board,
        Err(err) => return BoardResponse::failure(format!("board_refresh failed: {err}")),
    };

    with_session("board_refresh", |open| {
        if open.session.project_id() != project_id {
            return Err("another board was opened during refresh".to_string());
        }
        let applied = open.session.refresh(fetched);
        let message = if applied {
            "Board refreshed."
        } else {
            "Refresh deferred until pending changes settle."
        };
        Ok(BoardResponse::success(message, applied, open.session.board()))
    })
}

/// Starts dragging a column or task.
#[flutter_rust_bridge::frb(sync)]
pub fn on_drag_start(element_id: String) -> BoardResponse {
    with_session("on_drag_start", |open| {
        let element_id = parse_id(&element_id, "element_id")?;
        let kind = open
            .session
            .on_drag_start(element_id)
            .map_err(|err| err.to_string())?;
        Ok(BoardResponse::success(
            format!("Dragging {}.", kind.as_str()),
            false,
            open.session.board(),
        ))
    })
}

/// Applies the provisional move for the hovered element.
#[flutter_rust_bridge::frb(sync)]
pub fn on_drag_over(active_id: String, over_id: String) -> BoardResponse {
    with_session("on_drag_over", |open| {
        let active_id = parse_id(&active_id, "active_id")?;
        let over_id = parse_id(&over_id, "over_id")?;
        let changed = open
            .session
            .on_drag_over(active_id, over_id)
            .map_err(|err| err.to_string())?;
        Ok(BoardResponse::success("", changed, open.session.board()))
    })
}

/// Drops the active element and persists the new order.
///
/// `over_id = None` cancels the drag. The gateway write runs after the
/// session lock is released; the outcome is settled under a fresh lock.
#[flutter_rust_bridge::frb(sync)]
pub fn on_drag_end(active_id: String, over_id: Option<String>) -> BoardResponse {
    let drop = with_session_value(|open| {
        let active_id = parse_id(&active_id, "active_id")?;
        let over_id = over_id
            .as_deref()
            .map(|value| parse_id(value, "over_id"))
            .transpose()?;
        let outcome = open
            .session
            .on_drag_end(active_id, over_id)
            .map_err(|err| err.to_string())?;
        Ok::<_, String>((
            outcome,
            open.generation,
            open.actor,
            open.session.board().clone(),
        ))
    });

    let (outcome, generation, actor, board) = match drop {
        Some(Ok(dropped)) => dropped,
        Some(Err(err)) => return BoardResponse::failure(format!("on_drag_end failed: {err}")),
        None => return BoardResponse::failure("on_drag_end failed: no board is open"),
    };

    let pending = match outcome {
        DropOutcome::Cancelled => return BoardResponse::success("Drag cancelled.", true, &board),
        DropOutcome::Unchanged => return BoardResponse::success("Nothing moved.", false, &board),
        DropOutcome::Commit(pending) => pending,
    };

    let result = open_connection()
        .map_err(kanban_core::GatewayError::Unavailable)
        .and_then(|conn| {
            let gateway = SqliteBoardGateway::try_new(&conn, actor)?;
            pending.execute(&gateway)
        });

    with_session("on_drag_end", |open| {
        settle_commit(open, generation, &pending, result)
    })
}

fn settle_commit(
    open: &mut OpenBoard,
    generation: u64,
    pending: &PendingCommit,
    result: GatewayResult<()>,
) -> Result<BoardResponse, String> {
    if open.generation != generation {
        warn!(
            "event=commit_settle module=ffi status=error commit_id={} error_code=session_replaced",
            pending.id
        );
        return Err(format!(
            "board was reopened before commit {} settled",
            pending.id
        ));
    }

    let committed = result.is_ok();
    open.session
        .settle(pending.id, result)
        .map_err(|err| err.to_string())?;
    let message = match (committed, pending.plan.kind()) {
        (false, _) => "Move failed; board restored.",
        (true, CommitKind::ColumnsReordered) => "Columns reordered.",
        (true, CommitKind::TaskReordered) => "Task reordered.",
        (true, CommitKind::TaskMoved { .. }) => "Task moved.",
    };
    Ok(BoardResponse {
        ok: committed,
        ..BoardResponse::success(message, true, open.session.board())
    })
}

/// Abandons the active drag.
#[flutter_rust_bridge::frb(sync)]
pub fn on_drag_cancel() -> BoardResponse {
    with_session("on_drag_cancel", |open| {
        open.session
            .on_drag_cancel()
            .map_err(|err| err.to_string())?;
        Ok(BoardResponse::success(
            "Drag cancelled.",
            true,
            open.session.board(),
        ))
    })
}

/// Drains pending notifications of the open session.
#[flutter_rust_bridge::frb(sync)]
pub fn board_events() -> Vec<BoardEventView> {
    with_session_value(|open| open.session.drain_events())
        .unwrap_or_default()
        .into_iter()
        .map(to_event_view)
        .collect()
}

/// Creates a project with default columns, owned by `owner_id`.
#[flutter_rust_bridge::frb(sync)]
pub fn project_create(name: String, owner_id: String) -> ActionResponse {
    let result = parse_id(&owner_id, "owner_id").and_then(|owner| {
        with_board_service(|service| {
            service
                .create_project(name, owner)
                .map(|project| project.project_uuid)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(id) => ActionResponse::success("Project created.", id),
        Err(err) => ActionResponse::failure(format!("project_create failed: {err}")),
    }
}

/// Appends a column to a project.
#[flutter_rust_bridge::frb(sync)]
pub fn column_create(project_id: String, actor_id: String, name: String) -> ActionResponse {
    let result = parse_ids(&project_id, &actor_id).and_then(|(project_id, actor)| {
        with_board_service(|service| {
            service
                .create_column(actor, project_id, name)
                .map(|column| column.id)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(id) => ActionResponse::success("Column created.", id),
        Err(err) => ActionResponse::failure(format!("column_create failed: {err}")),
    }
}

/// Appends a task to a column.
#[flutter_rust_bridge::frb(sync)]
pub fn task_create(
    project_id: String,
    actor_id: String,
    column_id: String,
    title: String,
) -> ActionResponse {
    let result = parse_ids(&project_id, &actor_id).and_then(|(project_id, actor)| {
        let column_id = parse_id(&column_id, "column_id")?;
        with_board_service(|service| {
            service
                .create_task(actor, project_id, column_id, title)
                .map(|task| task.task_uuid)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(id) => ActionResponse::success("Task created.", id),
        Err(err) => ActionResponse::failure(format!("task_create failed: {err}")),
    }
}

fn resolve_db_path() -> PathBuf {
    BOARD_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("KANBAN_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(BOARD_DB_FILE_NAME)
        })
        .clone()
}

fn open_connection() -> Result<Connection, String> {
    open_db(resolve_db_path()).map_err(|err| format!("board DB open failed: {err}"))
}

fn board_gateway(conn: &Connection, actor: UserId) -> Result<SqliteBoardGateway<'_>, String> {
    SqliteBoardGateway::try_new(conn, actor).map_err(|err| format!("gateway init failed: {err}"))
}

fn with_board_service<T>(
    f: impl FnOnce(&BoardService<SqliteBoardRepository<'_>>) -> Result<T, String>,
) -> Result<T, String> {
    let conn = open_connection()?;
    let repo = SqliteBoardRepository::try_new(&conn)
        .map_err(|err| format!("board repo init failed: {err}"))?;
    f(&BoardService::new(repo))
}

fn lock_session() -> MutexGuard<'static, Option<OpenBoard>> {
    SESSION.lock().unwrap_or_else(|poisoned| {
        warn!("event=session_lock module=ffi status=error error_code=poisoned");
        PoisonError::into_inner(poisoned)
    })
}

fn with_session_value<T>(f: impl FnOnce(&mut OpenBoard) -> T) -> Option<T> {
    lock_session().as_mut().map(f)
}

fn with_session(
    operation: &'static str,
    f: impl FnOnce(&mut OpenBoard) -> Result<BoardResponse, String>,
) -> BoardResponse {
    match with_session_value(f) {
        Some(Ok(response)) => response,
        Some(Err(err)) => {
            info!("event={operation} module=ffi status=error error={err}");
            BoardResponse::failure(format!("{operation} failed: {err}"))
        }
        None => BoardResponse::failure(format!("{operation} failed: no board is open")),
    }
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, String> {
    Uuid::parse_str(value.trim()).map_err(|err| format!("invalid {field} `{value}`: {err}"))
}

fn parse_ids(project_id: &str, actor_id: &str) -> Result<(ProjectId, UserId), String> {
    Ok((
        parse_id(project_id, "project_id")?,
        parse_id(actor_id, "actor_id")?,
    ))
}

fn to_column_views(board: &Board) -> Vec<ColumnView> {
    board
        .columns
        .iter()
        .map(|column| ColumnView {
            id: column.id.to_string(),
            name: column.name.clone(),
            order: column.order,
            tasks: column
                .tasks
                .iter()
                .map(|task| TaskView {
                    id: task.id.to_string(),
                    column_id: task.column_id.to_string(),
                    order: task.order,
                    title: task.title.clone(),
                })
                .collect(),
        })
        .collect()
}

fn to_event_view(event: BoardEvent) -> BoardEventView {
    match event {
        BoardEvent::CommitSucceeded { commit_id, kind } => BoardEventView {
            kind: "commit_succeeded".to_string(),
            commit_id: Some(commit_id),
            message: commit_label(kind).to_string(),
        },
        BoardEvent::CommitFailed {
            commit_id, reason, ..
        } => BoardEventView {
            kind: "commit_failed".to_string(),
            commit_id: Some(commit_id),
            message: reason,
        },
        BoardEvent::RefreshRequested { project_id } => BoardEventView {
            kind: "refresh_requested".to_string(),
            commit_id: None,
            message: project_id.to_string(),
        },
    }
}

fn commit_label(kind: CommitKind) -> &'static str {
    match kind {
        CommitKind::ColumnsReordered => "columns_reordered",
        CommitKind::TaskReordered => "task_reordered",
        CommitKind::TaskMoved { .. } => "task_moved",
    }
}
