use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source download events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    Started {
        url: String,
        stage: String,
        total_size: Option<u64>,
    },

    Completed {
        url: String,
        stage: String,
        path: PathBuf,
        final_size: u64,
        total_time: Duration,
    },

    Failed {
        url: String,
        stage: String,
        error: String,
    },
}
