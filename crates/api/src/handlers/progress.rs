//! `POST /internal/progress`: where a task stands and how far along it is.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::tasks::TaskStatus;

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub id_task: String,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ProgressResponse {
    pub active: bool,
    pub queued: bool,
    pub completed: bool,
    /// Completed fraction in `[0, 1]`.
    pub progress: Option<f64>,
    /// Estimated seconds remaining.
    pub eta: Option<f64>,
    pub textinfo: Option<String>,
    pub queue_position: Option<usize>,
}

/// POST /internal/progress
pub async fn progress(
    State(state): State<AppState>,
    Json(input): Json<ProgressRequest>,
) -> Json<ProgressResponse> {
    let status = state.queue.tasks().status(&input.id_task);

    let response = match status {
        TaskStatus::Active { elapsed_secs } => {
            let snapshot = state.txt2img.progress().snapshot();
            let progress = snapshot.fraction();
            let eta = progress
                .filter(|p| *p > 0.0)
                .map(|p| elapsed_secs / p - elapsed_secs);
            ProgressResponse {
                active: true,
                progress,
                eta,
                textinfo: Some(
                    snapshot
                        .textinfo
                        .unwrap_or_else(|| "Waiting...".to_string()),
                ),
                ..ProgressResponse::default()
            }
        }
        TaskStatus::Queued { position } => ProgressResponse {
            queued: true,
            textinfo: Some("In queue...".to_string()),
            queue_position: Some(position),
            ..ProgressResponse::default()
        },
        TaskStatus::Finished => ProgressResponse {
            completed: true,
            progress: Some(1.0),
            ..ProgressResponse::default()
        },
        TaskStatus::Unknown => ProgressResponse {
            textinfo: Some("Waiting...".to_string()),
            ..ProgressResponse::default()
        },
    };

    Json(response)
}
