use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use mini_tests::models::{ProgressKind, SubmissionPayload};
use mini_tests::progress::storage::{PROGRESS_KEY, STUDENT_KEY};
use mini_tests::progress::{
    FileStorage, HttpSubmissionSink, KeyValueStorage, MemoryStorage, Mirror, MirrorError,
    ProgressStore, SubmissionSink,
};
use mini_tests::{config::Config, create_router, services::AppState};

#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<SubmissionPayload>>,
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), MirrorError> {
        self.received.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl SubmissionSink for FailingSink {
    async fn submit(&self, _payload: &SubmissionPayload) -> Result<(), MirrorError> {
        Err(MirrorError::Rejected(503))
    }
}

#[tokio::test]
async fn test_mirror_sends_latest_record() {
    let sink = Arc::new(RecordingSink::default());
    let mut store =
        ProgressStore::new(MemoryStorage::new()).with_mirror(Mirror::new(sink.clone()));
    store.set_student_id("12345").unwrap();

    store.record_outcome(1, false, ProgressKind::Code, "v1").unwrap();
    let recorded = store.record_outcome(1, true, ProgressKind::Code, "v2").unwrap();
    recorded.mirror_task.expect("mirror spawned").await.unwrap();

    // Record is visible before delivery completes
    assert_eq!(store.load()[&1].attempts, 2);

    let received = sink.received.lock().unwrap();
    let last = received.last().unwrap();
    assert_eq!(
        *last,
        SubmissionPayload {
            student_id: "12345".to_string(),
            exercise_id: 1,
            code: "v2".to_string(),
            passed: true,
            attempts: 2,
        }
    );
}

#[tokio::test]
async fn test_no_student_means_no_mirror() {
    let sink = Arc::new(RecordingSink::default());
    let mut store =
        ProgressStore::new(MemoryStorage::new()).with_mirror(Mirror::new(sink.clone()));
    let recorded = store.record_outcome(2, true, ProgressKind::Code, "x").unwrap();
    assert!(recorded.mirror_task.is_none());
    assert!(sink.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_mirror_failure_is_swallowed() {
    let mut store =
        ProgressStore::new(MemoryStorage::new()).with_mirror(Mirror::new(Arc::new(FailingSink)));
    store.set_student_id("12345").unwrap();
    let recorded = store.record_outcome(3, false, ProgressKind::Code, "x").unwrap();
    recorded.mirror_task.unwrap().await.unwrap();
    assert_eq!(store.load()[&3].attempts, 1);
}

#[test]
fn test_record_outside_runtime_still_persists() {
    let sink = Arc::new(RecordingSink::default());
    let mut store =
        ProgressStore::new(MemoryStorage::new()).with_mirror(Mirror::new(sink.clone()));
    store.set_student_id("12345").unwrap();
    let recorded = store.record_outcome(4, true, ProgressKind::Code, "x").unwrap();
    assert!(recorded.mirror_task.is_none());
    assert!(store.load()[&4].passed);
}

#[test]
fn test_file_storage_round_trip() {
    let dir = std::env::temp_dir().join(format!("mini-tests-{}", uuid::Uuid::new_v4()));
    let path = dir.join("nested").join("storage.json");

    let mut store = ProgressStore::new(FileStorage::open(&path));
    store.set_student_id("54321").unwrap();
    store.save_draft(1, "draft").unwrap();
    store.record_outcome(5, true, ProgressKind::Quiz, "QUIZ_VF respostas={} score=1").unwrap();
    let before = store.load();

    let reopened = ProgressStore::new(FileStorage::open(&path));
    assert_eq!(reopened.student_id().as_deref(), Some("54321"));
    assert_eq!(reopened.load(), before);
    assert_eq!(before[&5].kind, Some(ProgressKind::Quiz));

    let mut reopened = reopened;
    reopened.clear().unwrap();
    assert!(reopened.load().is_empty());
    assert!(reopened.storage().get(STUDENT_KEY).is_some());
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_corrupt_progress_recovers_to_empty() {
    for garbage in ["", "null", "[1,2]", "{\"1\": 5}", "{oops"] {
        let mut storage = MemoryStorage::new();
        storage.set(PROGRESS_KEY, garbage.to_string()).unwrap();
        let mut store = ProgressStore::new(storage);
        assert!(store.load().is_empty(), "{:?} should read as empty", garbage);
        let recorded = store.record_outcome(1, true, ProgressKind::Code, "c").unwrap();
        assert_eq!(recorded.record.attempts, 1);
    }
}

#[tokio::test]
async fn test_http_mirror_reaches_collector() {
    let state = Arc::new(AppState::new(Config {
        bind_addr: "127.0.0.1:0".to_string(),
        admin_username: "admin".to_string(),
        admin_password: "pw".to_string(),
    }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let sink = HttpSubmissionSink::new(format!("http://{}/api/submissions", addr)).unwrap();
    let mut store =
        ProgressStore::new(MemoryStorage::new()).with_mirror(Mirror::new(Arc::new(sink)));
    store.set_student_id("12345").unwrap();
    let recorded = store.record_outcome(2, true, ProgressKind::Code, "code").unwrap();
    recorded.mirror_task.unwrap().await.unwrap();

    let stored = state.submissions.for_student("12345").await;
    assert_eq!(stored["2"].code, "code");
    assert!(stored["2"].passed);
    assert_eq!(stored["2"].attempts, 1);
    server.abort();
}
