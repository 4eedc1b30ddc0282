mod support;

use quire_commands::{CommandError, CommandService, GroupKey, HistoryOperation, UndoGroupId};

use support::{Journal, Record};

async fn run_all(service: &CommandService, commands: Vec<Record>) {
    for command in commands {
        service.execute_and_wait(command).await.unwrap();
    }
}

#[tokio::test]
async fn two_commands_undo_undo_redo() {
    let journal = Journal::new();
    let service = CommandService::default();

    service.enqueue(Record::new("A", &journal)).unwrap();
    service
        .execute_and_wait(Record::new("B", &journal))
        .await
        .unwrap();
    assert_eq!(journal.entries(), vec!["exec A", "exec B"]);
    assert_eq!(service.undo_count(), 2);

    service.undo().await.unwrap();
    assert_eq!(journal.entries().last().unwrap(), "undo B");
    assert_eq!((service.undo_count(), service.redo_count()), (1, 1));

    service.undo().await.unwrap();
    assert_eq!(journal.entries().last().unwrap(), "undo A");
    assert_eq!((service.undo_count(), service.redo_count()), (0, 2));

    service.redo().await.unwrap();
    assert_eq!(journal.entries().last().unwrap(), "redo A");
    assert_eq!((service.undo_count(), service.redo_count()), (1, 1));
}

#[tokio::test]
async fn undoing_everything_restores_initial_state() {
    let journal = Journal::new();
    let service = CommandService::default();
    let n = 5;

    run_all(
        &service,
        (0..n).map(|i| Record::new(i.to_string(), &journal)).collect(),
    )
    .await;
    assert_eq!(journal.total(), n as i64);

    for _ in 0..n {
        service.undo().await.unwrap();
    }

    assert_eq!(journal.total(), 0);
    assert_eq!(service.undo_count(), 0);
    assert_eq!(service.redo_count(), n);
}

#[tokio::test]
async fn new_command_invalidates_redo_history() {
    let journal = Journal::new();
    let service = CommandService::default();
    run_all(
        &service,
        vec![Record::new("a", &journal), Record::new("b", &journal)],
    )
    .await;

    service.undo().await.unwrap();
    assert_eq!(service.redo_count(), 1);

    service
        .execute_and_wait(Record::new("c", &journal))
        .await
        .unwrap();
    assert_eq!(service.redo_count(), 0);
    assert_eq!(service.undo_count(), 2);
}

#[tokio::test]
async fn non_undoable_command_keeps_redo_history() {
    let journal = Journal::new();
    let service = CommandService::default();
    run_all(&service, vec![Record::new("a", &journal)]).await;
    service.undo().await.unwrap();

    service
        .execute_and_wait(Record::new("plain", &journal).not_undoable())
        .await
        .unwrap();

    assert_eq!(service.undo_count(), 0);
    assert_eq!(service.redo_count(), 1);
}

#[tokio::test]
async fn grouped_commands_undo_together_in_reverse_order() {
    let journal = Journal::new();
    let service = CommandService::default();
    let group = UndoGroupId::new();

    run_all(
        &service,
        vec![
            Record::new("a", &journal).in_group(group),
            Record::new("b", &journal).in_group(group),
        ],
    )
    .await;
    assert_eq!(service.undo_count(), 1);

    service.undo().await.unwrap();
    assert_eq!(
        journal.entries(),
        vec!["exec a", "exec b", "undo b", "undo a"]
    );
    assert_eq!(service.redo_count(), 1);

    service.redo().await.unwrap();
    assert_eq!(journal.entries()[4..], ["redo a", "redo b"]);
    assert_eq!(service.undo_count(), 1);
}

#[tokio::test]
async fn group_split_by_other_work_still_undoes_as_one() {
    let journal = Journal::new();
    let service = CommandService::default();
    let group = UndoGroupId::new();

    run_all(
        &service,
        vec![
            Record::new("a", &journal).in_group(group),
            Record::new("x", &journal),
            Record::new("b", &journal).in_group(group),
        ],
    )
    .await;
    assert_eq!(service.undo_count(), 2);

    service.undo().await.unwrap();
    assert_eq!(journal.entries()[3..], ["undo b", "undo a"]);
    assert_eq!(journal.total(), 1);
    assert_eq!(service.undo_count(), 1);

    service.undo().await.unwrap();
    assert_eq!(journal.entries()[5..], ["undo x"]);
    assert_eq!(journal.total(), 0);

    service.redo().await.unwrap();
    service.redo().await.unwrap();
    assert_eq!(journal.entries()[6..], ["redo x", "redo a", "redo b"]);
    assert_eq!(service.undo_count(), 2);
    assert_eq!(service.redo_count(), 0);
}

#[tokio::test]
async fn partial_group_failure_still_moves_the_group() {
    let journal = Journal::new();
    let service = CommandService::default();
    let group = UndoGroupId::new();
    let broken = Record::new("broken", &journal)
        .in_group(group)
        .failing_undo();
    let broken_id = broken.id();

    run_all(
        &service,
        vec![broken, Record::new("fine", &journal).in_group(group)],
    )
    .await;

    let err = service.undo().await.unwrap_err();
    match err {
        CommandError::PartialFailure {
            operation,
            group: key,
            failures,
        } => {
            assert_eq!(operation, HistoryOperation::Undo);
            assert_eq!(key, GroupKey::Group(group));
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, broken_id);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(journal.entries().last().unwrap(), "undo fine");
    assert_eq!(service.undo_count(), 0);
    assert_eq!(service.redo_count(), 1);
}

#[tokio::test]
async fn empty_stacks() {
    let service = CommandService::default();

    assert!(matches!(
        service.undo().await,
        Err(CommandError::UndoStackEmpty)
    ));
    assert!(matches!(
        service.redo().await,
        Err(CommandError::RedoStackEmpty)
    ));
    assert!(!service.try_undo().await.unwrap());
    assert!(!service.try_redo().await.unwrap());
}

#[tokio::test]
async fn undo_waits_for_commands_queued_before_it() {
    let journal = Journal::new();
    let service = CommandService::default();

    service.enqueue(Record::new("a", &journal)).unwrap();
    assert!(service.try_undo().await.unwrap());

    assert_eq!(journal.entries(), vec!["exec a", "undo a"]);
    assert_eq!(service.redo_count(), 1);
}

#[tokio::test]
async fn clear_history_drops_both_stacks() {
    let journal = Journal::new();
    let service = CommandService::default();
    run_all(
        &service,
        vec![Record::new("a", &journal), Record::new("b", &journal)],
    )
    .await;
    service.undo().await.unwrap();

    service.clear_history();

    assert_eq!((service.undo_count(), service.redo_count()), (0, 0));
}
