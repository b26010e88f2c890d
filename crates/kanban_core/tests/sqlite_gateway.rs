use kanban_core::db::open_db_in_memory;
use kanban_core::{
    BoardRepository, ColumnOrder, GatewayError, PersistenceGateway, ProjectId,
    SqliteBoardGateway, SqliteBoardRepository, TaskPlacement, UserId,
};
use rusqlite::Connection;
use uuid::Uuid;

struct Fixture {
    conn: Connection,
    owner: UserId,
    project_id: ProjectId,
}

fn fixture() -> Fixture {
    let conn = open_db_in_memory().unwrap();
    let owner = Uuid::new_v4();
    let project_id = {
        let repo = SqliteBoardRepository::try_new(&conn).unwrap();
        let project_id = repo.create_project("P", owner).unwrap().project_uuid;
        let todo = repo.load_board(project_id).unwrap().columns[0].id;
        repo.create_task(project_id, todo, "T1", owner).unwrap();
        repo.create_task(project_id, todo, "T2", owner).unwrap();
        project_id
    };
    Fixture {
        conn,
        owner,
        project_id,
    }
}

#[test]
fn non_member_is_unauthorized_and_nothing_changes() {
    let fx = fixture();
    let stranger = Uuid::new_v4();
    let gateway = SqliteBoardGateway::try_new(&fx.conn, stranger).unwrap();
    let owner_gateway = SqliteBoardGateway::try_new(&fx.conn, fx.owner).unwrap();
    let before = owner_gateway.fetch_board(fx.project_id).unwrap();

    let reversed: Vec<ColumnOrder> = before
        .columns
        .iter()
        .rev()
        .enumerate()
        .map(|(order, column)| ColumnOrder {
            id: column.id,
            order: order as i64,
        })
        .collect();
    let err = gateway
        .reorder_columns(fx.project_id, &reversed)
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Unauthorized { user_id, .. } if user_id == stranger
    ));
    assert!(matches!(
        gateway.fetch_board(fx.project_id),
        Err(GatewayError::Unauthorized { .. })
    ));
    assert_eq!(owner_gateway.fetch_board(fx.project_id).unwrap(), before);
}

#[test]
fn unknown_project_is_reported() {
    let fx = fixture();
    let gateway = SqliteBoardGateway::try_new(&fx.conn, fx.owner).unwrap();
    let missing = Uuid::new_v4();

    assert!(matches!(
        gateway.fetch_board(missing),
        Err(GatewayError::ProjectNotFound(id)) if id == missing
    ));
}

#[test]
fn reorder_columns_rewrites_every_rank() {
    let fx = fixture();
    let gateway = SqliteBoardGateway::try_new(&fx.conn, fx.owner).unwrap();
    let ids = gateway.fetch_board(fx.project_id).unwrap().column_ids();

    gateway
        .reorder_columns(
            fx.project_id,
            &[
                ColumnOrder { id: ids[2], order: 0 },
                ColumnOrder { id: ids[0], order: 1 },
                ColumnOrder { id: ids[1], order: 2 },
            ],
        )
        .unwrap();

    let board = gateway.fetch_board(fx.project_id).unwrap();
    assert_eq!(board.column_ids(), vec![ids[2], ids[0], ids[1]]);
    assert!(board.is_consistent());
}

#[test]
fn foreign_ids_fail_validation_without_partial_writes() {
    let fx = fixture();
    let other_project = {
        let repo = SqliteBoardRepository::try_new(&fx.conn).unwrap();
        repo.create_project("Other", fx.owner).unwrap().project_uuid
    };
    let gateway = SqliteBoardGateway::try_new(&fx.conn, fx.owner).unwrap();
    let before = gateway.fetch_board(fx.project_id).unwrap();
    let foreign_column = gateway.fetch_board(other_project).unwrap().columns[0].id;
    let todo = &before.columns[0];

    // First placement is valid; the second targets a column of another project.
    let err = gateway
        .reorder_tasks(
            fx.project_id,
            &[
                TaskPlacement {
                    id: todo.tasks[1].id,
                    order: 0,
                    column_id: todo.id,
                },
                TaskPlacement {
                    id: todo.tasks[0].id,
                    order: 0,
                    column_id: foreign_column,
                },
            ],
        )
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    let err = gateway
        .reorder_columns(
            fx.project_id,
            &[ColumnOrder {
                id: foreign_column,
                order: 0,
            }],
        )
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    assert_eq!(gateway.fetch_board(fx.project_id).unwrap(), before);
}

#[test]
fn task_changing_column_records_moved_activity() {
    let fx = fixture();
    let gateway = SqliteBoardGateway::try_new(&fx.conn, fx.owner).unwrap();
    let board = gateway.fetch_board(fx.project_id).unwrap();
    let todo = board.columns[0].id;
    let doing = board.columns[1].id;
    let t1 = board.columns[0].tasks[0].id;
    let t2 = board.columns[0].tasks[1].id;

    gateway
        .reorder_tasks(
            fx.project_id,
            &[
                TaskPlacement {
                    id: t1,
                    order: 0,
                    column_id: doing,
                },
                TaskPlacement {
                    id: t2,
                    order: 0,
                    column_id: todo,
                },
            ],
        )
        .unwrap();

    let repo = SqliteBoardRepository::try_new(&fx.conn).unwrap();
    let moved = repo.task_activity(t1).unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].action, "moved");
    assert_eq!(moved[0].user_uuid, fx.owner);
    assert_eq!(moved[0].old_value, Some(todo.to_string()));
    assert_eq!(moved[0].new_value, Some(doing.to_string()));
    assert!(repo.task_activity(t2).unwrap().is_empty());

    let after = gateway.fetch_board(fx.project_id).unwrap();
    assert_eq!(after.column(doing).unwrap().task_ids(), vec![t1]);
    assert_eq!(after.column(todo).unwrap().task_ids(), vec![t2]);
    assert!(after.is_consistent());
}
