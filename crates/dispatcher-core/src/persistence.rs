//! The persistence adapter seam (§1, §6). The real adapter — reading and
//! writing people, teams, repositories, and grades — is explicitly out of
//! scope; this module defines the trait the progression machine and the
//! provisioning orchestrator consume, plus an in-memory fixture used by
//! tests and the CLI demo harness.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::model::{DelivId, Grade, Person, RecordId, Repository, Team};

/// Read/write surface the core needs from the persistence layer.
///
/// Composite keys: grades are keyed by `(personOrRepoId, delivId)`;
/// everything else is keyed by record id (§6).
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get_person(&self, id: &str) -> anyhow::Result<Option<Person>>;
    async fn put_person(&self, person: Person) -> anyhow::Result<()>;

    async fn get_team(&self, id: &str) -> anyhow::Result<Option<Team>>;
    async fn put_team(&self, team: Team) -> anyhow::Result<()>;
    async fn delete_team(&self, id: &str) -> anyhow::Result<()>;

    async fn get_repository(&self, id: &str) -> anyhow::Result<Option<Repository>>;
    async fn put_repository(&self, repo: Repository) -> anyhow::Result<()>;
    async fn delete_repository(&self, id: &str) -> anyhow::Result<()>;

    async fn get_grade(&self, person_or_repo_id: &str, deliv_id: &DelivId) -> anyhow::Result<Option<Grade>>;
    async fn put_grade(&self, grade: Grade) -> anyhow::Result<()>;

    /// Every team a person belongs to.
    async fn teams_for_person(&self, person_id: &str) -> anyhow::Result<Vec<Team>>;
    /// Every repository whose teams include a team the person belongs to.
    async fn repos_for_person(&self, person_id: &str) -> anyhow::Result<Vec<Repository>>;
}

/// An in-memory fixture implementing [`PersistenceStore`]. Used by tests
/// and the CLI demo harness — not a production adapter.
#[derive(Default)]
pub struct InMemoryPersistenceStore {
    people: RwLock<HashMap<RecordId, Person>>,
    teams: RwLock<HashMap<RecordId, Team>>,
    repos: RwLock<HashMap<RecordId, Repository>>,
    grades: RwLock<HashMap<(RecordId, DelivId), Grade>>,
}

impl InMemoryPersistenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryPersistenceStore {
    async fn get_person(&self, id: &str) -> anyhow::Result<Option<Person>> {
        Ok(self.people.read().unwrap().get(id).cloned())
    }

    async fn put_person(&self, person: Person) -> anyhow::Result<()> {
        self.people.write().unwrap().insert(person.id.clone(), person);
        Ok(())
    }

    async fn get_team(&self, id: &str) -> anyhow::Result<Option<Team>> {
        Ok(self.teams.read().unwrap().get(id).cloned())
    }

    async fn put_team(&self, team: Team) -> anyhow::Result<()> {
        self.teams.write().unwrap().insert(team.id.clone(), team);
        Ok(())
    }

    async fn delete_team(&self, id: &str) -> anyhow::Result<()> {
        self.teams.write().unwrap().remove(id);
        Ok(())
    }

    async fn get_repository(&self, id: &str) -> anyhow::Result<Option<Repository>> {
        Ok(self.repos.read().unwrap().get(id).cloned())
    }

    async fn put_repository(&self, repo: Repository) -> anyhow::Result<()> {
        self.repos.write().unwrap().insert(repo.id.clone(), repo);
        Ok(())
    }

    async fn delete_repository(&self, id: &str) -> anyhow::Result<()> {
        self.repos.write().unwrap().remove(id);
        Ok(())
    }

    async fn get_grade(&self, person_or_repo_id: &str, deliv_id: &DelivId) -> anyhow::Result<Option<Grade>> {
        Ok(self
            .grades
            .read()
            .unwrap()
            .get(&(person_or_repo_id.to_string(), deliv_id.clone()))
            .cloned())
    }

    async fn put_grade(&self, grade: Grade) -> anyhow::Result<()> {
        self.grades
            .write()
            .unwrap()
            .insert((grade.person_or_repo_id.clone(), grade.deliv_id.clone()), grade);
        Ok(())
    }

    async fn teams_for_person(&self, person_id: &str) -> anyhow::Result<Vec<Team>> {
        Ok(self
            .teams
            .read()
            .unwrap()
            .values()
            .filter(|t| t.members.contains(person_id))
            .cloned()
            .collect())
    }

    async fn repos_for_person(&self, person_id: &str) -> anyhow::Result<Vec<Repository>> {
        let team_ids: Vec<RecordId> = self
            .teams
            .read()
            .unwrap()
            .values()
            .filter(|t| t.members.contains(person_id))
            .map(|t| t.id.clone())
            .collect();
        Ok(self
            .repos
            .read()
            .unwrap()
            .values()
            .filter(|r| r.teams.iter().any(|t| team_ids.contains(t)))
            .cloned()
            .collect())
    }
}
