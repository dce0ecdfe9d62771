use std::time::Instant;

use crate::config::Config;

pub mod submission_store;

pub use submission_store::SubmissionStore;

pub struct AppState {
    pub config: Config,
    pub submissions: SubmissionStore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        tracing::info!(bind_addr = %config.bind_addr, "collector state initialised");
        Self {
            config,
            submissions: SubmissionStore::new(),
            started_at: Instant::now(),
        }
    }
}
