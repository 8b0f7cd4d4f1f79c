//! The source-hosting adapter seam (§1, §6). Repository creation, webhook
//! install, and import are explicitly out of scope; this trait is the only
//! interface the provisioning orchestrator uses to reach that collaborator.

use async_trait::async_trait;

use crate::model::RecordId;

/// Source-hosting operations the provisioning orchestrator needs (§6).
#[async_trait]
pub trait SourceHostingAdapter: Send + Sync {
    /// Clone `import_url` into a new repo named `name`, grant the given
    /// teams access, and install a webhook pointed at `webhook_url`.
    /// Returns `true` on full success, `false` on any failure; partial
    /// failure rollback is the orchestrator's responsibility (§6, §7).
    async fn provision_repository(
        &self,
        name: &str,
        teams: &[RecordId],
        import_url: &str,
        webhook_url: &str,
    ) -> anyhow::Result<bool>;

    async fn get_repository_url(&self, repo_id: &str) -> anyhow::Result<String>;
    async fn get_team_url(&self, team_id: &str) -> anyhow::Result<String>;
}

/// A fixture adapter for tests and the CLI demo: always succeeds and
/// synthesizes plausible-looking URLs. Not a production adapter.
pub struct FixtureHostingAdapter {
    pub github_host: String,
    pub org: String,
}

#[async_trait]
impl SourceHostingAdapter for FixtureHostingAdapter {
    async fn provision_repository(
        &self,
        _name: &str,
        _teams: &[RecordId],
        _import_url: &str,
        _webhook_url: &str,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn get_repository_url(&self, repo_id: &str) -> anyhow::Result<String> {
        Ok(format!("https://{}/{}/{}", self.github_host, self.org, repo_id))
    }

    async fn get_team_url(&self, team_id: &str) -> anyhow::Result<String> {
        Ok(format!("https://{}/orgs/{}/teams/{}", self.github_host, self.org, team_id))
    }
}
