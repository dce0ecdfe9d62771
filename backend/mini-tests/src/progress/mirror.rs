use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::models::SubmissionPayload;

pub const MIRROR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("collector rejected submission with status {0}")]
    Rejected(u16),
}

/// Remote end of the progress mirror.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), MirrorError>;
}

/// POSTs payloads as JSON to the collector's submissions endpoint.
#[derive(Debug, Clone)]
pub struct HttpSubmissionSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSubmissionSink {
    pub fn new(url: impl Into<String>) -> Result<Self, MirrorError> {
        let client = reqwest::Client::builder().timeout(MIRROR_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SubmissionSink for HttpSubmissionSink {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), MirrorError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(MirrorError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Fire-and-forget delivery: failures are logged, never retried.
#[derive(Clone)]
pub struct Mirror {
    sink: Arc<dyn SubmissionSink>,
}

impl Mirror {
    pub fn new(sink: Arc<dyn SubmissionSink>) -> Self {
        Self { sink }
    }

    /// Spawns delivery on the current tokio runtime. Outside a runtime the
    /// payload is dropped with a warning.
    pub fn dispatch(&self, payload: SubmissionPayload) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(
                exercise_id = payload.exercise_id,
                "no async runtime, submission not mirrored"
            );
            return None;
        };
        let sink = Arc::clone(&self.sink);
        Some(handle.spawn(async move {
            match sink.submit(&payload).await {
                Ok(()) => tracing::debug!(
                    student_id = %payload.student_id,
                    exercise_id = payload.exercise_id,
                    "submission mirrored"
                ),
                Err(e) => tracing::warn!(
                    student_id = %payload.student_id,
                    exercise_id = payload.exercise_id,
                    error = %e,
                    "failed to mirror submission"
                ),
            }
        }))
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror").finish_non_exhaustive()
    }
}
