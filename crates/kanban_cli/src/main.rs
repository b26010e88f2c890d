//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `kanban_core` linkage without the Flutter runtime.
//! - Run one scripted drag on an in-memory board and print the result.

use kanban_core::db::open_db_in_memory;
use kanban_core::{
    Board, BoardService, DragSession, SqliteBoardGateway, SqliteBoardRepository,
};
use std::error::Error;
use uuid::Uuid;

fn main() {
    println!("kanban_core version={}", kanban_core::core_version());
    if let Err(err) = run_demo() {
        eprintln!("demo failed: {err}");
        std::process::exit(1);
    }
}

fn run_demo() -> Result<(), Box<dyn Error>> {
    let conn = open_db_in_memory()?;
    let owner = Uuid::new_v4();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn)?);
    let project = service.create_project("Demo", owner)?;
    let board = service.board(owner, project.project_uuid)?;
    let todo = board.columns[0].id;
    let doing = board.columns[1].id;
    let first = service.create_task(owner, project.project_uuid, todo, "Write parser")?;
    service.create_task(owner, project.project_uuid, todo, "Ship release")?;

    let gateway = SqliteBoardGateway::try_new(&conn, owner)?;
    let mut session = DragSession::load(&gateway, project.project_uuid)?;
    print_board("before", session.board());

    session.on_drag_start(first.task_uuid)?;
    session.on_drag_over(first.task_uuid, doing)?;
    let resolution = session.drop_and_commit(&gateway, first.task_uuid, Some(doing))?;
    println!("drop={resolution:?}");
    print_board("after", session.board());
    Ok(())
}

fn print_board(label: &str, board: &Board) {
    println!("{label}:");
    for column in &board.columns {
        let titles: Vec<&str> = column.tasks.iter().map(|task| task.title.as_str()).collect();
        println!("  [{}] {}: {:?}", column.order, column.name, titles);
    }
}
