//! Property tests for the queue/dispatcher invariants named in §8.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dispatcher_core::{CommitTarget, ContainerInput, DelivId, DispatcherConfig, CourseName, DockerHost};
use dispatcher_engine::{
    Dispatcher, NullContainerRuntime, QueueKey, RecordingGradeSink, RecordingResultSink, ResultSink,
    Tier,
};
use proptest::prelude::*;

fn config(express: usize, standard: usize, regression: usize) -> DispatcherConfig {
    DispatcherConfig {
        course_name: CourseName::Sdmm,
        backend_url: "http://localhost".to_string(),
        backend_port: 11316,
        github_host: "github.com".to_string(),
        org: "SECapstone".to_string(),
        docker_host: DockerHost::LocalSocket,
        num_slots_express: express,
        num_slots_standard: standard,
        num_slots_regression: regression,
        pass_threshold: DispatcherConfig::DEFAULT_PASS_THRESHOLD,
    }
}

fn input(commit_url: &str) -> ContainerInput {
    ContainerInput {
        target: CommitTarget {
            commit_sha: format!("sha-{commit_url}"),
            commit_url: commit_url.to_string(),
            repo_id: "repo".to_string(),
            deliv_id: DelivId::new(DelivId::D0),
            postback_url: "EMPTY".to_string(),
            timestamp: chrono::Utc::now(),
        },
        image: "grader:latest".to_string(),
        timeout: Duration::from_millis(200),
        params: Default::default(),
    }
}

fn new_dispatcher(express: usize, standard: usize, regression: usize) -> Dispatcher {
    Dispatcher::new(
        &config(express, standard, regression),
        Arc::new(NullContainerRuntime),
        Arc::new(RecordingResultSink::default()),
        Arc::new(RecordingGradeSink::default()),
    )
}

fn assert_no_duplicate_keys(keys: &[QueueKey]) {
    let set: HashSet<_> = keys.iter().collect();
    assert_eq!(set.len(), keys.len(), "a (commitURL, delivId) pair appeared in more than one tier");
}

proptest! {
    /// Invariant 1: running count never exceeds a queue's configured capacity.
    #[test]
    fn running_never_exceeds_capacity(ops in prop::collection::vec(0u8..3, 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut dispatcher = new_dispatcher(1, 2, 1);
            for (i, op) in ops.iter().enumerate() {
                match op {
                    0 => dispatcher.add_to_standard_queue(input(&format!("c{i}"))),
                    1 => dispatcher.tick(),
                    _ => dispatcher.drain_completions().await,
                }
                for tier in [Tier::Express, Tier::Standard, Tier::Regression] {
                    prop_assert!(dispatcher.running(tier) <= dispatcher.capacity(tier));
                }
            }
            Ok(())
        })?;
    }

    /// Invariant 2: a (commitURL, delivId) pair is present in at most one
    /// of {waiting, running} across all three queues.
    #[test]
    fn at_most_once_membership_across_tiers(ops in prop::collection::vec(0u8..3, 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut dispatcher = new_dispatcher(1, 2, 1);
            for (i, op) in ops.iter().enumerate() {
                match op {
                    0 => dispatcher.add_to_standard_queue(input(&format!("c{i}"))),
                    1 => dispatcher.tick(),
                    _ => dispatcher.drain_completions().await,
                }
                assert_no_duplicate_keys(&dispatcher.all_keys());
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn tick_makes_progress_or_is_demonstrably_blocked() {
    // Invariant 3: after a tick with a non-empty queue and a free slot,
    // running strictly increases or the dispatcher is blocked.
    let mut dispatcher = new_dispatcher(1, 1, 1);
    dispatcher.add_to_standard_queue(input("c0"));
    dispatcher.add_to_standard_queue(input("c1"));

    let before = dispatcher.total_running();
    dispatcher.tick();
    let after = dispatcher.total_running();

    assert!(after > before || dispatcher.is_blocked());
}

#[tokio::test]
async fn promotion_preserves_arrival_order() {
    // Invariant 5: if A arrived before B in the source tier and both are
    // promoted, A is scheduled before B. With standard closed (capacity 0)
    // and regression open, each tick's `promote(standard -> regression)`
    // step moves exactly one job — the head of standard — so two ticks
    // promote "a" then "b" in arrival order.
    let result_sink = Arc::new(RecordingResultSink::default());
    let mut dispatcher = Dispatcher::new(
        &config(0, 0, 2),
        Arc::new(NullContainerRuntime),
        Arc::clone(&result_sink) as Arc<dyn ResultSink>,
        Arc::new(RecordingGradeSink::default()),
    );

    dispatcher.add_to_standard_queue(input("a"));
    dispatcher.add_to_standard_queue(input("b"));

    dispatcher.tick();
    assert_eq!(dispatcher.running(Tier::Regression), 1);
    assert_eq!(dispatcher.standard_len(), 1);
    dispatcher.wait_for_completion().await;

    dispatcher.tick();
    assert_eq!(dispatcher.standard_len(), 0);
    dispatcher.wait_for_completion().await;

    let received = result_sink.received.lock().await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].commit_url, "a");
    assert_eq!(received[1].commit_url, "b");
}
