use kanban_core::db::open_db_in_memory;
use kanban_core::repo::board_repo::DEFAULT_COLUMNS;
use kanban_core::{
    BoardRepository, BoardService, MemberRole, ServiceError, SqliteBoardRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn create_project_seeds_owner_and_default_columns() {
    let conn = setup();
    let repo = SqliteBoardRepository::try_new(&conn).unwrap();
    let service = BoardService::new(repo);
    let owner = Uuid::new_v4();

    let project = service.create_project("  Launch  ", owner).unwrap();
    assert_eq!(project.name, "Launch");
    assert_eq!(project.owner_uuid, owner);

    let board = service.board(owner, project.project_uuid).unwrap();
    let names: Vec<&str> = board.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, DEFAULT_COLUMNS.to_vec());
    assert!(board.is_consistent());

    let repo = SqliteBoardRepository::try_new(&conn).unwrap();
    assert_eq!(
        repo.member_role(project.project_uuid, owner).unwrap(),
        Some(MemberRole::Owner)
    );
}

#[test]
fn blank_names_are_rejected() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();

    assert!(matches!(
        service.create_project("   ", owner),
        Err(ServiceError::BlankName("project name"))
    ));

    let project = service.create_project("P", owner).unwrap();
    let board = service.board(owner, project.project_uuid).unwrap();
    let todo = board.columns[0].id;
    assert!(matches!(
        service.create_task(owner, project.project_uuid, todo, "\n\t"),
        Err(ServiceError::BlankName("task title"))
    ));
    assert!(matches!(
        service.rename_column(owner, project.project_uuid, todo, ""),
        Err(ServiceError::BlankName("column name"))
    ));
}

#[test]
fn columns_and_tasks_append_at_the_end() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let project = service.create_project("P", owner).unwrap();
    let project_id = project.project_uuid;

    let review = service.create_column(owner, project_id, "Review").unwrap();
    assert_eq!(review.order, DEFAULT_COLUMNS.len() as i64);

    let first = service.create_task(owner, project_id, review.id, "one").unwrap();
    let second = service.create_task(owner, project_id, review.id, "two").unwrap();
    assert_eq!(first.sort_order, 0);
    assert_eq!(second.sort_order, 1);
    assert_eq!(second.creator_uuid, owner);

    let board = service.board(owner, project_id).unwrap();
    let column = board.column(review.id).unwrap();
    assert_eq!(column.task_ids(), vec![first.task_uuid, second.task_uuid]);
    assert_eq!(column.tasks[0].title, "one");
}

#[test]
fn rename_column_requires_column_in_project() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let project = service.create_project("P", owner).unwrap();
    let other = service.create_project("Q", owner).unwrap();
    let foreign = service.board(owner, other.project_uuid).unwrap().columns[0].id;

    assert!(matches!(
        service.rename_column(owner, project.project_uuid, foreign, "Backlog"),
        Err(ServiceError::ColumnNotFound(id)) if id == foreign
    ));

    let todo = service.board(owner, project.project_uuid).unwrap().columns[0].id;
    service
        .rename_column(owner, project.project_uuid, todo, " Backlog ")
        .unwrap();
    let board = service.board(owner, project.project_uuid).unwrap();
    assert_eq!(board.columns[0].name, "Backlog");
}

#[test]
fn delete_column_rejects_non_empty_and_renumbers_rest() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let project_id = service.create_project("P", owner).unwrap().project_uuid;
    let ids = service.board(owner, project_id).unwrap().column_ids();

    service.create_task(owner, project_id, ids[1], "busy").unwrap();
    assert!(matches!(
        service.delete_column(owner, project_id, ids[1]),
        Err(ServiceError::ColumnNotEmpty { tasks: 1, .. })
    ));

    service.delete_column(owner, project_id, ids[0]).unwrap();
    let board = service.board(owner, project_id).unwrap();
    assert_eq!(board.column_ids(), vec![ids[1], ids[2]]);
    assert!(board.is_consistent());
}

#[test]
fn delete_task_renumbers_column_densely() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let project_id = service.create_project("P", owner).unwrap().project_uuid;
    let todo = service.board(owner, project_id).unwrap().columns[0].id;
    let tasks: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|title| {
            service
                .create_task(owner, project_id, todo, *title)
                .unwrap()
                .task_uuid
        })
        .collect();

    service.delete_task(owner, project_id, tasks[0]).unwrap();

    let board = service.board(owner, project_id).unwrap();
    let column = board.column(todo).unwrap();
    assert_eq!(column.task_ids(), vec![tasks[1], tasks[2]]);
    let orders: Vec<i64> = column.tasks.iter().map(|t| t.order).collect();
    assert_eq!(orders, vec![0, 1]);
}

#[test]
fn members_may_delete_only_their_own_tasks() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let project_id = service.create_project("P", owner).unwrap().project_uuid;
    service
        .add_member(owner, project_id, member, MemberRole::Member)
        .unwrap();
    let todo = service.board(owner, project_id).unwrap().columns[0].id;

    let owners_task = service
        .create_task(owner, project_id, todo, "owner's")
        .unwrap()
        .task_uuid;
    let own_task = service
        .create_task(member, project_id, todo, "mine")
        .unwrap()
        .task_uuid;

    assert!(matches!(
        service.delete_task(member, project_id, owners_task),
        Err(ServiceError::Forbidden { user_id, .. }) if user_id == member
    ));
    service.delete_task(member, project_id, own_task).unwrap();
    service.delete_task(owner, project_id, owners_task).unwrap();
    assert_eq!(service.board(owner, project_id).unwrap().task_count(), 0);
}

#[test]
fn non_members_are_rejected_and_members_cannot_invite() {
    let conn = setup();
    let service = BoardService::new(SqliteBoardRepository::try_new(&conn).unwrap());
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let project_id = service.create_project("P", owner).unwrap().project_uuid;

    assert!(matches!(
        service.board(stranger, project_id),
        Err(ServiceError::NotMember { user_id, .. }) if user_id == stranger
    ));

    service
        .add_member(owner, project_id, member, MemberRole::Member)
        .unwrap();
    assert!(matches!(
        service.add_member(member, project_id, stranger, MemberRole::Admin),
        Err(ServiceError::Forbidden { .. })
    ));

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.board(owner, missing),
        Err(ServiceError::ProjectNotFound(id)) if id == missing
    ));
}
