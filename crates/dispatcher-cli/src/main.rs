mod cli;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;

use dispatcher_core::{
    provision, CommitTarget, ContainerInput, DelivId, DispatcherConfig, FixtureHostingAdapter,
    InMemoryPersistenceStore, PersistenceStore, Person, ProvisionOutcome,
};
use dispatcher_engine::{Dispatcher, NullContainerRuntime, RecordingGradeSink, RecordingResultSink};

use crate::cli::Cli;
use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Registers a couple of demo students, provisions their `d0` repos, and
/// enqueues a seed grading job for each — enough to exercise the
/// dispatcher/progression wiring without a real source-hosting backend.
async fn seed_demo_workload(
    store: &InMemoryPersistenceStore,
    hosting: &FixtureHostingAdapter,
    config: &DispatcherConfig,
    dispatcher: &Mutex<Dispatcher>,
) -> anyhow::Result<()> {
    for id in ["alice", "bob"] {
        store.put_person(Person::new_unknown(id, id)).await?;

        let payload = match provision(store, hosting, config, "d0", &[id.to_string()]).await {
            ProvisionOutcome::Success(payload) => payload,
            ProvisionOutcome::Failure(failure) => {
                tracing::warn!(person = id, message = %failure.message, "d0 provisioning rejected");
                continue;
            }
        };
        tracing::info!(person = id, status = %payload.status, "provisioned d0");

        let input = ContainerInput {
            target: CommitTarget {
                commit_sha: format!("{id}-seed-commit"),
                commit_url: format!("https://example.test/{id}/commits/seed"),
                repo_id: format!("{}{}", config.course_name.project_prefix(), id),
                deliv_id: DelivId::new(DelivId::D0),
                postback_url: dispatcher_core::POSTBACK_URL_EMPTY.to_string(),
                timestamp: chrono::Utc::now(),
            },
            image: "grader:d0".to_string(),
            timeout: Duration::from_secs(120),
            params: Default::default(),
        };
        dispatcher.lock().await.add_to_standard_queue(input);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.into_config();

    let store = InMemoryPersistenceStore::new();
    let hosting =
        FixtureHostingAdapter { github_host: config.github_host.clone(), org: config.org.clone() };

    let dispatcher = Arc::new(Mutex::new(Dispatcher::new(
        &config,
        Arc::new(NullContainerRuntime),
        Arc::new(RecordingResultSink::default()),
        Arc::new(RecordingGradeSink::default()),
    )));

    seed_demo_workload(&store, &hosting, &config, &dispatcher)
        .await
        .context("seeding demo workload")?;

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(Arc::clone(&shutdown), shutdown_tx);

    tracing::info!("dispatcher demo harness running; press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut stopping = false;

    loop {
        tokio::select! {
            ev = shutdown_rx.recv() => {
                match ev {
                    Some(ShutdownEvent::Graceful) => {
                        tracing::info!("stop requested; finishing in-flight jobs before exiting (press Ctrl+C again to exit immediately)");
                        stopping = true;
                    }
                    Some(ShutdownEvent::Immediate) => {
                        tracing::warn!("stop requested again; exiting immediately");
                        std::process::exit(130);
                    }
                    None => {}
                }
            }
            _ = ticker.tick() => {
                let mut dispatcher = dispatcher.lock().await;
                dispatcher.tick();
                dispatcher.drain_completions().await;

                let idle = dispatcher.total_running() == 0
                    && dispatcher.express_len() == 0
                    && dispatcher.standard_len() == 0
                    && dispatcher.regression_len() == 0;
                if stopping && idle {
                    tracing::info!("all queues drained; exiting");
                    break;
                }
            }
        }
    }

    Ok(())
}
