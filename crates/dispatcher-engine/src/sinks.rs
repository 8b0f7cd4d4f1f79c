//! The result-sink / grade-sink collaborator seams (§6). Both are
//! external systems from the engine's point of view; fixture
//! implementations back the tests and the CLI demo harness.

use async_trait::async_trait;
use dispatcher_core::{AutoTestResult, CustomBag, DelivId, RecordId};
use tokio::sync::Mutex;

/// What a sink returns when it rejects a record: a human-readable reason,
/// never a panic or a propagated error (§7 — sink failures are logged and
/// swallowed so queue health is preserved).
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFailure {
    pub message: String,
}

/// Accepts a completed `AutoTestResult` (§6). Errors returned here are
/// logged by the dispatcher and otherwise ignored.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn accept(&self, result: &AutoTestResult) -> Result<(), SinkFailure>;
}

/// A partial grade transport (§6), emitted by the job runner after `run()`
/// independent of the full result handed to the dispatcher's completion
/// hook.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeTransport {
    pub deliv_id: DelivId,
    pub repo_id: RecordId,
    pub repo_url: Option<String>,
    pub score: Option<f64>,
    pub url_name: String,
    pub url: String,
    pub comment: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub custom: CustomBag,
}

#[async_trait]
pub trait GradeSink: Send + Sync {
    async fn accept(&self, grade: &GradeTransport) -> Result<(), SinkFailure>;
}

/// Accepts everything; records what it saw for test assertions.
#[derive(Debug, Default)]
pub struct RecordingResultSink {
    pub received: Mutex<Vec<AutoTestResult>>,
}

#[async_trait]
impl ResultSink for RecordingResultSink {
    async fn accept(&self, result: &AutoTestResult) -> Result<(), SinkFailure> {
        self.received.lock().await.push(result.clone());
        Ok(())
    }
}

/// Accepts everything; records what it saw for test assertions.
#[derive(Debug, Default)]
pub struct RecordingGradeSink {
    pub received: Mutex<Vec<GradeTransport>>,
}

#[async_trait]
impl GradeSink for RecordingGradeSink {
    async fn accept(&self, grade: &GradeTransport) -> Result<(), SinkFailure> {
        self.received.lock().await.push(grade.clone());
        Ok(())
    }
}

/// Rejects every record it sees with a fixed reason. Used by §8 scenario
/// S6 to confirm a throwing sink does not block slot release.
#[derive(Debug)]
pub struct FailingResultSink {
    pub reason: String,
}

#[async_trait]
impl ResultSink for FailingResultSink {
    async fn accept(&self, _result: &AutoTestResult) -> Result<(), SinkFailure> {
        Err(SinkFailure { message: self.reason.clone() })
    }
}

#[derive(Debug)]
pub struct FailingGradeSink {
    pub reason: String,
}

#[async_trait]
impl GradeSink for FailingGradeSink {
    async fn accept(&self, _grade: &GradeTransport) -> Result<(), SinkFailure> {
        Err(SinkFailure { message: self.reason.clone() })
    }
}
