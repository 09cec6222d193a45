use uuid::Uuid;

use super::*;

fn document(count: usize) -> SceneDocument {
    let mut left = 0.0;
    SceneDocument::new((0..count).map(|_| {
        left += 10.0;
        (Uuid::new_v4(), Shape::rect(left, 0.0, 5.0, 5.0))
    }))
}

#[test]
fn missing_board_loads_as_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    assert!(backend.load_initial_state("calm-otter-7").expect("load").is_none());
    assert!(backend.recent_boards().expect("index").is_empty());
}

#[test]
fn saved_document_loads_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path().join("nested"));
    let doc = document(3);

    backend.save_snapshot("calm-otter-7", &doc).expect("save");
    assert!(dir.path().join("nested/openboard_board_calm-otter-7.json").exists());
    assert_eq!(backend.load_initial_state("calm-otter-7").expect("load"), Some(doc));
}

#[test]
fn saving_updates_recent_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    backend.save_snapshot("calm-otter-7", &document(1)).expect("save");
    backend.save_snapshot("happy-penguin-42", &document(1)).expect("save");
    backend.save_snapshot("calm-otter-7", &document(2)).expect("save");

    let boards = backend.recent_boards().expect("index");
    assert_eq!(boards.len(), 2);
    assert!(boards[0].last_modified >= boards[1].last_modified);
    let otter = boards.iter().find(|b| b.id == "calm-otter-7").expect("indexed");
    assert_eq!(otter.name, "Board calm-otter-7");
    assert!(otter.last_modified >= otter.created_at);
}

#[test]
fn recent_index_is_capped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    for n in 0..25 {
        backend.save_snapshot(&format!("tiny-owl-{n}"), &document(0)).expect("save");
    }
    assert_eq!(backend.recent_boards().expect("index").len(), MAX_RECENT_BOARDS);
}

#[test]
fn delete_removes_file_and_index_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    backend.save_snapshot("calm-otter-7", &document(1)).expect("save");

    backend.delete_board("calm-otter-7").expect("delete");
    assert!(backend.load_initial_state("calm-otter-7").expect("load").is_none());
    assert!(backend.recent_boards().expect("index").is_empty());
    backend.delete_board("calm-otter-7").expect("second delete is a no-op");
}

#[test]
fn path_like_board_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    let err = backend.save_snapshot("../etc-passwd-1", &document(0)).expect_err("rejected");
    assert!(matches!(err, PersistenceError::InvalidBoardId(_)));
}

#[test]
fn corrupt_file_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    std::fs::write(dir.path().join("openboard_board_calm-otter-7.json"), b"{not json").expect("write");

    let err = backend.load_initial_state("calm-otter-7").expect_err("corrupt");
    assert!(matches!(err, PersistenceError::Json { .. }));
    assert!(err.to_string().contains("openboard_board_calm-otter-7.json"));
}

#[test]
fn future_document_version_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = JsonFileBackend::new(dir.path());
    let doc = SceneDocument { version: 9, objects: Vec::new() };
    backend.save_snapshot("calm-otter-7", &doc).expect("save");
    assert!(matches!(
        backend.load_initial_state("calm-otter-7"),
        Err(PersistenceError::UnsupportedVersion(9))
    ));
}

#[test]
fn autosave_debounces_until_quiet() {
    let mut autosave = AutoSave::new(Duration::from_secs(2));
    let start = Instant::now();
    assert!(!autosave.take_due(start));

    autosave.touch(start);
    autosave.touch(start + Duration::from_secs(1));
    assert!(!autosave.take_due(start + Duration::from_secs(2)));
    assert!(autosave.take_due(start + Duration::from_secs(3)));
    assert!(!autosave.take_due(start + Duration::from_secs(4)));
}

#[test]
fn autosave_flush_reports_pending_save() {
    let mut autosave = AutoSave::new(Duration::from_secs(2));
    assert!(!autosave.flush());
    autosave.touch(Instant::now());
    assert!(autosave.flush());
    assert!(autosave.deadline().is_none());
}
