//! The provisioning orchestrator (§4.E): transactional creation of team +
//! repo + grade placeholders, gated by the progression state machine.

use rand::Rng;

use crate::config::DispatcherConfig;
use crate::errors::{ConsistencyError, FailurePayload, ProvisioningError, ValidationError};
use crate::hosting::SourceHostingAdapter;
use crate::model::{DelivId, Grade, RecordId, Repository, Status, Team};
use crate::persistence::PersistenceStore;
use crate::progression::compute_status_string;

/// Returned on a successful `provision()` call (§4.E).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPayload {
    pub person_id: RecordId,
    pub status: Status,
}

/// The two shapes `provision()` can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    Success(StatusPayload),
    Failure(FailurePayload),
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

fn bootstrap_import_url(config: &DispatcherConfig, deliv_id: &str) -> String {
    format!("https://{}/{}/bootstrap_{}", config.github_host, config.org, deliv_id)
}

/// Generate a unique 6-hex-character team name using a cryptographically
/// strong RNG, retrying until the name is unused (§4.E paired D1 path).
async fn unique_hex_team_name(store: &dyn PersistenceStore) -> anyhow::Result<String> {
    loop {
        let bytes: [u8; 3] = rand::thread_rng().gen();
        let name = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();
        if store.get_team(&name).await?.is_none() {
            return Ok(name);
        }
    }
}

/// Entry point: `peopleIds[0]` is the requester (§4.E).
pub async fn provision(
    store: &dyn PersistenceStore,
    hosting: &dyn SourceHostingAdapter,
    config: &DispatcherConfig,
    deliv_id: &str,
    people_ids: &[RecordId],
) -> ProvisionOutcome {
    let result = provision_inner(store, hosting, config, deliv_id, people_ids).await;
    match result {
        Ok(payload) => ProvisionOutcome::Success(payload),
        Err(err) => {
            tracing::warn!(deliv_id, ?people_ids, error = %err, "provisioning rejected");
            ProvisionOutcome::Failure(FailurePayload::from(&err))
        }
    }
}

async fn provision_inner(
    store: &dyn PersistenceStore,
    hosting: &dyn SourceHostingAdapter,
    config: &DispatcherConfig,
    deliv_id: &str,
    people_ids: &[RecordId],
) -> Result<StatusPayload, ProvisioningError> {
    match (deliv_id, people_ids.len()) {
        ("d0", 1) => provision_d0(store, hosting, config, &people_ids[0]).await,
        ("d1", 1) => provision_d1_individual(store, hosting, config, &people_ids[0]).await,
        ("d1", 2) => provision_d1_paired(store, hosting, config, &people_ids[0], &people_ids[1]).await,
        ("d1", n) => Err(ValidationError::WrongTeamSize(n).into()),
        (other, _) => Err(ValidationError::UnknownDeliverable(DelivId::new(other)).into()),
    }
}

async fn provision_d0(
    store: &dyn PersistenceStore,
    hosting: &dyn SourceHostingAdapter,
    config: &DispatcherConfig,
    person_id: &str,
) -> Result<StatusPayload, ProvisioningError> {
    let person = store
        .get_person(person_id)
        .await?
        .ok_or_else(|| ValidationError::PersonNotRegistered(person_id.to_string()))?;

    if person.sddm_status != Status::D0Pre {
        return Err(ValidationError::BadStatus {
            person: person_id.to_string(),
            expected: Status::D0Pre.to_string(),
            found: person.sddm_status.to_string(),
        }
        .into());
    }

    let team_id = person_id.to_string();
    if store.get_team(&team_id).await?.is_some() {
        return Err(ConsistencyError(format!("team {team_id} already exists")).into());
    }

    let repo_id = format!("{}{}", config.course_name.project_prefix(), person_id);
    if store.get_repository(&repo_id).await?.is_some() {
        return Err(ConsistencyError(format!("repository {repo_id} already exists")).into());
    }

    let mut team = Team::new(team_id.clone(), [person_id.to_string()]);
    team.sdmmd0 = true;
    store.put_team(team).await?;

    let mut repo = Repository::new(repo_id.clone());
    repo.d0_enabled = true;
    repo.teams.insert(team_id.clone());
    store.put_repository(repo).await?;

    let import_url = bootstrap_import_url(config, "d0");
    let webhook_url = config.webhook_url();
    let provisioned = hosting
        .provision_repository(&repo_id, &[team_id.clone()], &import_url, &webhook_url)
        .await;

    let succeeded = match provisioned {
        Ok(true) => true,
        Ok(false) => false,
        Err(err) => {
            tracing::warn!(person_id, error = %err, "source-hosting provisioning call failed");
            false
        }
    };

    if !succeeded {
        // Roll back the local team/repo we just created (§4.E, §7).
        store.delete_repository(&repo_id).await?;
        store.delete_team(&team_id).await?;
        return Err(anyhow::anyhow!("source-hosting provisioning failed for {repo_id}").into());
    }

    let repo_url = hosting.get_repository_url(&repo_id).await?;
    let team_url = hosting.get_team_url(&team_id).await?;

    if let Some(mut repo) = store.get_repository(&repo_id).await? {
        repo.url = Some(repo_url);
        store.put_repository(repo).await?;
    }
    if let Some(mut team) = store.get_team(&team_id).await? {
        team.url = Some(team_url);
        store.put_team(team).await?;
    }

    store
        .put_grade(Grade::placeholder(repo_id.clone(), DelivId::new(DelivId::D0), now()))
        .await?;

    let status = compute_status_string(store, config, person_id).await?;
    Ok(StatusPayload { person_id: person_id.to_string(), status })
}

/// Pick the repository the D0 path created for this person (the one with
/// `d0_enabled = true`); there is at most one per the §3 invariant.
fn find_d0_repo(repos: &[Repository]) -> Option<&Repository> {
    repos.iter().find(|r| r.d0_enabled)
}

async fn provision_d1_individual(
    store: &dyn PersistenceStore,
    hosting: &dyn SourceHostingAdapter,
    config: &DispatcherConfig,
    person_id: &str,
) -> Result<StatusPayload, ProvisioningError> {
    let _person = store
        .get_person(person_id)
        .await?
        .ok_or_else(|| ValidationError::PersonNotRegistered(person_id.to_string()))?;

    let repos = store.repos_for_person(person_id).await?;
    let repo = find_d0_repo(&repos)
        .ok_or_else(|| ValidationError::BadStatus {
            person: person_id.to_string(),
            expected: "has a d0-enabled repository".to_string(),
            found: "none".to_string(),
        })?
        .clone();

    if repos.iter().any(|r| r.d1_enabled) {
        return Err(ValidationError::AlreadyProvisioned(person_id.to_string()).into());
    }

    let d0 = DelivId::new(DelivId::D0);
    let grade = store.get_grade(&repo.id, &d0).await?;
    if !grade.is_some_and(|g| g.meets_threshold(config.pass_threshold)) {
        return Err(ValidationError::InsufficientGrade { deliv: d0, threshold: config.pass_threshold }.into());
    }

    let mut repo = repo;
    repo.d1_enabled = true;
    store.put_repository(repo.clone()).await?;

    for team_id in repo.teams.iter() {
        if let Some(mut team) = store.get_team(team_id).await? {
            team.sdmmd1 = true;
            team.sdmmd2 = true;
            team.sdmmd3 = true;
            store.put_team(team).await?;
        }
    }

    for deliv in [DelivId::D1, DelivId::D2, DelivId::D3] {
        store.put_grade(Grade::placeholder(repo.id.clone(), DelivId::new(deliv), now())).await?;
    }

    let _ = hosting; // source-hosting is not re-invoked for an upgrade on an existing repo.

    let status = compute_status_string(store, config, person_id).await?;
    Ok(StatusPayload { person_id: person_id.to_string(), status })
}

async fn provision_d1_paired(
    store: &dyn PersistenceStore,
    hosting: &dyn SourceHostingAdapter,
    config: &DispatcherConfig,
    requester_id: &str,
    partner_id: &str,
) -> Result<StatusPayload, ProvisioningError> {
    if requester_id == partner_id {
        return Err(ValidationError::DuplicatePerson(requester_id.to_string()).into());
    }

    for id in [requester_id, partner_id] {
        store
            .get_person(id)
            .await?
            .ok_or_else(|| ValidationError::PersonNotRegistered(id.to_string()))?;
    }

    let d0 = DelivId::new(DelivId::D0);
    for id in [requester_id, partner_id] {
        let repos = store.repos_for_person(id).await?;
        let repo = find_d0_repo(&repos).ok_or_else(|| ValidationError::BadStatus {
            person: id.to_string(),
            expected: "has a d0-enabled repository".to_string(),
            found: "none".to_string(),
        })?;
        let grade = store.get_grade(&repo.id, &d0).await?;
        if !grade.is_some_and(|g| g.meets_threshold(config.pass_threshold)) {
            return Err(ValidationError::InsufficientGrade { deliv: d0, threshold: config.pass_threshold }.into());
        }
    }

    for id in [requester_id, partner_id] {
        let status = compute_status_string(store, config, id).await?;
        if status != Status::D1Unlocked {
            return Err(ValidationError::BadStatus {
                person: id.to_string(),
                expected: Status::D1Unlocked.to_string(),
                found: status.to_string(),
            }
            .into());
        }
    }

    let team_name = unique_hex_team_name(store).await?;
    let mut team = Team::new(team_name.clone(), [requester_id.to_string(), partner_id.to_string()]);
    team.sdmmd1 = true;
    team.sdmmd2 = true;
    team.sdmmd3 = true;
    store.put_team(team).await?;

    let repo_id = format!("{}{}", config.course_name.project_prefix(), team_name);
    let mut repo = Repository::new(repo_id.clone());
    repo.d1_enabled = true;
    repo.d2_enabled = true;
    repo.d3_enabled = true;
    repo.teams.insert(team_name.clone());
    store.put_repository(repo).await?;

    let import_url = bootstrap_import_url(config, "d1");
    let webhook_url = config.webhook_url();
    let provisioned = hosting
        .provision_repository(&repo_id, &[team_name.clone()], &import_url, &webhook_url)
        .await;

    let succeeded = match provisioned {
        Ok(true) => true,
        Ok(false) => false,
        Err(err) => {
            tracing::warn!(team_name, error = %err, "source-hosting provisioning call failed");
            false
        }
    };

    if !succeeded {
        store.delete_repository(&repo_id).await?;
        store.delete_team(&team_name).await?;
        return Err(anyhow::anyhow!("source-hosting provisioning failed for {repo_id}").into());
    }

    let repo_url = hosting.get_repository_url(&repo_id).await?;
    let team_url = hosting.get_team_url(&team_name).await?;

    if let Some(mut repo) = store.get_repository(&repo_id).await? {
        repo.url = Some(repo_url);
        store.put_repository(repo).await?;
    }
    if let Some(mut team) = store.get_team(&team_name).await? {
        team.url = Some(team_url);
        store.put_team(team).await?;
    }

    for deliv in [DelivId::D1, DelivId::D2, DelivId::D3] {
        store.put_grade(Grade::placeholder(repo_id.clone(), DelivId::new(deliv), now())).await?;
    }

    let status = compute_status_string(store, config, requester_id).await?;
    Ok(StatusPayload { person_id: requester_id.to_string(), status })
}
