use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use super::llm::{LanguageModel, LlmError, PromptRequest};
use super::schema::SchemaError;

/// Which model-backed stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Extraction,
    Scoring,
}

impl StageKind {
    pub const fn label(self) -> &'static str {
        match self {
            StageKind::Extraction => "extraction",
            StageKind::Scoring => "scoring",
        }
    }
}

/// Failure of a model-backed stage. Timeouts are reported like any other failed call.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{} call failed: {source}", .stage.label())]
    Model {
        stage: StageKind,
        #[source]
        source: LlmError,
    },
    #[error("{} call timed out after {}s", .stage.label(), .after.as_secs())]
    Timeout { stage: StageKind, after: Duration },
    #[error("{} output rejected: {source}", .stage.label())]
    Schema {
        stage: StageKind,
        #[source]
        source: SchemaError,
    },
}

impl StageError {
    pub fn stage(&self) -> StageKind {
        match self {
            StageError::Model { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::Schema { stage, .. } => *stage,
        }
    }
}

/// Shared call path: one bounded model call, then the stage's validator.
pub(crate) async fn call_model<T>(
    model: &Arc<dyn LanguageModel>,
    timeout: Duration,
    stage: StageKind,
    request: PromptRequest,
    validate: fn(Value) -> Result<T, SchemaError>,
) -> Result<T, StageError> {
    let reply = match tokio::time::timeout(timeout, model.generate(request)).await {
        Ok(Ok(value)) => value,
        Ok(Err(source)) => {
            warn!(stage = stage.label(), error = %source, "language model call failed");
            return Err(StageError::Model { stage, source });
        }
        Err(_) => {
            warn!(stage = stage.label(), timeout_secs = timeout.as_secs(), "language model call timed out");
            return Err(StageError::Timeout {
                stage,
                after: timeout,
            });
        }
    };

    validate(reply).map_err(|source| {
        warn!(stage = stage.label(), error = %source, "language model output failed validation");
        StageError::Schema { stage, source }
    })
}
