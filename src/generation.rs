use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, TaskState, Voice};

/// Fixed cadence of task status polls. There is deliberately no poll cap or
/// timeout; polling runs until the backend reports a terminal status.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One credit per character of trimmed input, mirroring the backend's
/// charging rule.
pub fn cost_of(text: &str) -> i64 {
    text.trim().chars().count() as i64
}

/// What a finished generation hands back to the event loop. `balance` is the
/// freshly fetched backend balance, or None when that refresh failed.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub audio_url: String,
    pub voice_name: String,
    pub balance: Option<i64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Not enough credits: need {required}, have {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Please sign in to generate audio")]
    Unauthorized,

    #[error("{0}")]
    Submit(String),

    #[error("{0}")]
    Failed(String),
}

/// Drive one text-to-speech request from submission to a playable result:
/// re-check credits against a fresh balance, submit, then poll until the
/// task reaches a terminal status.
pub async fn run(
    api: &ApiClient,
    text: &str,
    voice: &Voice,
    poll_interval: Duration,
) -> Result<GenerationOutcome, GenerationError> {
    let trimmed = text.trim();
    let required = cost_of(text);

    // The cached balance was already checked before the user message was
    // appended; it may be stale by the time Enter lands, so check again
    // against a fresh one before spending anything.
    let fresh = api.credits_balance().await.map_err(|err| match err {
        ApiError::Unauthorized { .. } => GenerationError::Unauthorized,
        other => GenerationError::Submit(other.to_string()),
    })?;
    if fresh.balance < required {
        return Err(GenerationError::InsufficientCredits {
            required,
            available: fresh.balance,
        });
    }

    let submitted = api
        .generate(trimmed, &voice.id)
        .await
        .map_err(|err| match err {
            ApiError::Unauthorized { .. } => GenerationError::Unauthorized,
            ApiError::InsufficientCredits { .. } => GenerationError::InsufficientCredits {
                required,
                available: fresh.balance,
            },
            other => GenerationError::Submit(other.to_string()),
        })?;
    debug!(task_id = %submitted.task_id, cost = submitted.cost, "generation task submitted");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let status = match api.task_status(&submitted.task_id).await {
            Ok(status) => status,
            Err(err) => {
                // A single failed poll never cancels the loop.
                warn!(task_id = %submitted.task_id, error = %err, "status poll failed, retrying");
                continue;
            }
        };

        match status.status {
            TaskState::Completed => {
                let audio_url = status.output_url.ok_or_else(|| {
                    GenerationError::Failed("Generation finished without an audio file".to_string())
                })?;
                let balance = match api.credits_balance().await {
                    Ok(balance) => Some(balance.balance),
                    Err(err) => {
                        warn!(error = %err, "balance refresh failed after generation");
                        None
                    }
                };
                return Ok(GenerationOutcome {
                    audio_url,
                    voice_name: voice.name.clone(),
                    balance,
                });
            }
            TaskState::Failed => {
                return Err(GenerationError::Failed(
                    status
                        .error
                        .unwrap_or_else(|| "Generation failed".to_string()),
                ));
            }
            // queued / processing / anything new: keep polling.
            _ => {}
        }
    }
}

/// Spawn the workflow as a background task. The handle doubles as the
/// cancellation point: aborting it stops the poll timer.
pub fn spawn(
    api: ApiClient,
    text: String,
    voice: Voice,
) -> JoinHandle<Result<GenerationOutcome, GenerationError>> {
    tokio::spawn(async move { run(&api, &text, &voice, POLL_INTERVAL).await })
}
