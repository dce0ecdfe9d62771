use tokio::task::JoinHandle;

use crate::models::{ProgressKind, ProgressMap, ProgressRecord, SubmissionPayload};

use super::mirror::Mirror;
use super::storage::{KeyValueStorage, StorageError, PROGRESS_KEY, STUDENT_KEY};

/// Result of a graded attempt being written.
#[derive(Debug)]
pub struct RecordedProgress {
    pub record: ProgressRecord,
    /// Set when a student is signed in and a mirror is configured.
    pub mirror_task: Option<JoinHandle<()>>,
}

/// Student identity and per-exercise progress on top of key/value storage.
#[derive(Debug)]
pub struct ProgressStore<S> {
    storage: S,
    mirror: Option<Mirror>,
}

impl<S: KeyValueStorage> ProgressStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Mirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn student_id(&self) -> Option<String> {
        self.storage.get(STUDENT_KEY).filter(|id| !id.is_empty())
    }

    pub fn set_student_id(&mut self, student_id: &str) -> Result<(), StorageError> {
        self.storage.set(STUDENT_KEY, student_id.to_string())
    }

    pub fn clear_student_id(&mut self) -> Result<(), StorageError> {
        self.storage.remove(STUDENT_KEY)
    }

    /// Current progress; missing or unparsable data reads as empty.
    pub fn load(&self) -> ProgressMap {
        let Some(raw) = self.storage.get(PROGRESS_KEY) else {
            return ProgressMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored progress is corrupt, treating as empty");
            ProgressMap::new()
        })
    }

    pub fn save(&mut self, progress: &ProgressMap) -> Result<(), StorageError> {
        let raw = serde_json::to_string(progress)?;
        self.storage.set(PROGRESS_KEY, raw)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.storage.remove(PROGRESS_KEY)
    }

    pub fn record(&self, exercise_id: u32) -> Option<ProgressRecord> {
        self.load().remove(&exercise_id)
    }

    /// Stores `code` without touching the attempt count or mirroring.
    pub fn save_draft(&mut self, exercise_id: u32, code: &str) -> Result<(), StorageError> {
        let mut progress = self.load();
        progress.entry(exercise_id).or_default().code = Some(code.to_string());
        self.save(&progress)
    }

    /// Counts one graded attempt, then mirrors it when a student is signed in.
    pub fn record_outcome(
        &mut self,
        exercise_id: u32,
        passed: bool,
        kind: ProgressKind,
        payload: &str,
    ) -> Result<RecordedProgress, StorageError> {
        let mut progress = self.load();
        let entry = progress.entry(exercise_id).or_default();
        entry.attempts = entry.attempts.saturating_add(1);
        entry.passed = passed;
        entry.kind = Some(kind);
        entry.code = Some(payload.to_string());
        let record = entry.clone();
        self.save(&progress)?;

        tracing::info!(
            exercise_id,
            passed,
            attempts = record.attempts,
            "progress recorded"
        );

        let mirror_task = match (self.student_id(), &self.mirror) {
            (Some(student_id), Some(mirror)) => mirror.dispatch(SubmissionPayload {
                student_id,
                exercise_id,
                code: payload.to_string(),
                passed,
                attempts: record.attempts,
            }),
            _ => None,
        };

        Ok(RecordedProgress {
            record,
            mirror_task,
        })
    }
}
