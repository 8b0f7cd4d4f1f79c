#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Job queueing, dispatch, and grading job execution (§4.A-C): the
//! scheduling half of the dispatcher, built on top of the shared data
//! model and collaborator traits in `dispatcher-core`.

mod dispatcher;
mod job;
mod queue;
mod sinks;

pub use dispatcher::{
    Dispatcher, ExecutionHook, FailingExecutionHook, RecordingExecutionHook, Tier,
};
pub use job::{run_job, ContainerRuntime, GradingJob, MockGradingJob, NullContainerRuntime, TcpContainerRuntime};
pub use queue::{JobQueue, QueueError, QueueKey};
pub use sinks::{
    FailingGradeSink, FailingResultSink, GradeSink, GradeTransport, RecordingGradeSink,
    RecordingResultSink, ResultSink, SinkFailure,
};
