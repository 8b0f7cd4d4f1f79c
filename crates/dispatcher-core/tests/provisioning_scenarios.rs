//! End-to-end provisioning scenarios (§8 S1-S4).

use dispatcher_core::{
    provision, CourseName, DelivId, DispatcherConfig, DockerHost, FixtureHostingAdapter, Grade,
    InMemoryPersistenceStore, PersistenceStore, Person, ProvisionOutcome, Status,
};

fn config() -> DispatcherConfig {
    DispatcherConfig {
        course_name: CourseName::Sdmm,
        backend_url: "http://localhost".to_string(),
        backend_port: 11316,
        github_host: "github.com".to_string(),
        org: "SECapstone".to_string(),
        docker_host: DockerHost::LocalSocket,
        num_slots_express: 1,
        num_slots_standard: 2,
        num_slots_regression: 1,
        pass_threshold: DispatcherConfig::DEFAULT_PASS_THRESHOLD,
    }
}

fn hosting() -> FixtureHostingAdapter {
    FixtureHostingAdapter { github_host: "github.com".to_string(), org: "SECapstone".to_string() }
}

async fn register(store: &InMemoryPersistenceStore, id: &str) {
    store.put_person(Person::new_unknown(id, id)).await.unwrap();
}

#[tokio::test]
async fn s1_d0_happy_path() {
    let store = InMemoryPersistenceStore::new();
    let hosting = hosting();
    let config = config();
    register(&store, "alice").await;

    let outcome = provision(&store, &hosting, &config, "d0", &["alice".to_string()]).await;
    let payload = match outcome {
        ProvisionOutcome::Success(p) => p,
        ProvisionOutcome::Failure(f) => panic!("expected success, got {f:?}"),
    };
    assert_eq!(payload.status, Status::D0);

    let repo = store.get_repository("secap_alice").await.unwrap().expect("repo created");
    assert!(repo.d0_enabled);

    let grade = store
        .get_grade("secap_alice", &DelivId::new(DelivId::D0))
        .await
        .unwrap()
        .expect("placeholder grade created");
    assert_eq!(grade.score, None);
}

#[tokio::test]
async fn s2_d0_to_d1_individual() {
    let store = InMemoryPersistenceStore::new();
    let hosting = hosting();
    let config = config();
    register(&store, "alice").await;

    provision(&store, &hosting, &config, "d0", &["alice".to_string()]).await;

    store
        .put_grade(Grade {
            person_or_repo_id: "secap_alice".to_string(),
            deliv_id: DelivId::new(DelivId::D0),
            score: Some(72.0),
            url: None,
            timestamp: chrono::Utc::now(),
            custom: Default::default(),
        })
        .await
        .unwrap();

    let outcome = provision(&store, &hosting, &config, "d1", &["alice".to_string()]).await;
    let payload = match outcome {
        ProvisionOutcome::Success(p) => p,
        ProvisionOutcome::Failure(f) => panic!("expected success, got {f:?}"),
    };
    assert_eq!(payload.status, Status::D1);

    let repo = store.get_repository("secap_alice").await.unwrap().unwrap();
    assert!(repo.d1_enabled);

    let team = store.get_team("alice").await.unwrap().unwrap();
    assert!(team.sdmmd1 && team.sdmmd2 && team.sdmmd3);

    for deliv in [DelivId::D1, DelivId::D2, DelivId::D3] {
        assert!(store
            .get_grade("secap_alice", &DelivId::new(deliv))
            .await
            .unwrap()
            .is_some());
    }
}

async fn graded_d0(store: &InMemoryPersistenceStore, hosting: &FixtureHostingAdapter, config: &DispatcherConfig, id: &str, score: f64) {
    register(store, id).await;
    provision(store, hosting, config, "d0", &[id.to_string()]).await;
    let repo_id = format!("secap_{id}");
    store
        .put_grade(Grade {
            person_or_repo_id: repo_id,
            deliv_id: DelivId::new(DelivId::D0),
            score: Some(score),
            url: None,
            timestamp: chrono::Utc::now(),
            custom: Default::default(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn s3_paired_d1_rejection_on_low_grade() {
    let store = InMemoryPersistenceStore::new();
    let hosting = hosting();
    let config = config();

    graded_d0(&store, &hosting, &config, "bob", 45.0).await;
    graded_d0(&store, &hosting, &config, "carol", 80.0).await;

    let outcome = provision(&store, &hosting, &config, "d1", &["bob".to_string(), "carol".to_string()]).await;
    match outcome {
        ProvisionOutcome::Failure(f) => assert!(f.message.contains("60")),
        ProvisionOutcome::Success(p) => panic!("expected failure, got {p:?}"),
    }
}

#[tokio::test]
async fn s4_paired_d1_happy_path() {
    let store = InMemoryPersistenceStore::new();
    let hosting = hosting();
    let config = config();

    graded_d0(&store, &hosting, &config, "bob", 80.0).await;
    graded_d0(&store, &hosting, &config, "carol", 80.0).await;

    let outcome = provision(&store, &hosting, &config, "d1", &["bob".to_string(), "carol".to_string()]).await;
    let payload = match outcome {
        ProvisionOutcome::Success(p) => p,
        ProvisionOutcome::Failure(f) => panic!("expected success, got {f:?}"),
    };
    assert_eq!(payload.person_id, "bob");

    // The new team has both members and a fresh 6-hex-char name.
    let teams_with_both = {
        let mut found = None;
        for id in ["bob", "carol"] {
            let teams = store.teams_for_person(id).await.unwrap();
            for t in teams {
                if t.members.contains("bob") && t.members.contains("carol") && t.sdmmd1 {
                    found = Some(t);
                }
            }
        }
        found
    };
    let team = teams_with_both.expect("a shared d1 team exists");
    assert_eq!(team.id.len(), 6);
    assert!(team.id.chars().all(|c| c.is_ascii_hexdigit()));

    let repos = store.repos_for_person("bob").await.unwrap();
    let repo = repos.iter().find(|r| r.teams.contains(&team.id)).expect("shared repo exists");
    assert!(repo.d1_enabled && repo.d2_enabled && repo.d3_enabled);
}
