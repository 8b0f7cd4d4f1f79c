//! Configuration surface (§6). This models the recognized options the
//! spec names; it is data the core consumes, not a loader — the embedding
//! application decides how to populate it (env, flags, a config file).
//! `dispatcher-cli` provides one concrete loader for its own bootstrap.

use std::path::PathBuf;

/// Which course deployment this dispatcher instance serves. Affects
/// naming conventions the provisioning orchestrator uses (e.g. the repo
/// name prefix) but not the scheduling or progression logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseName {
    Sdmm,
    Classytest,
    Other(String),
}

impl CourseName {
    pub fn project_prefix(&self) -> &str {
        match self {
            CourseName::Sdmm => "secap_",
            CourseName::Classytest => "classytest_",
            CourseName::Other(_) => "proj_",
        }
    }
}

impl From<&str> for CourseName {
    fn from(s: &str) -> Self {
        match s {
            "sdmm" => CourseName::Sdmm,
            "classytest" => CourseName::Classytest,
            other => CourseName::Other(other.to_string()),
        }
    }
}

/// TLS material for connecting to a remote container daemon (§6
/// `dockerHost` with `http/https/tcp` schemes).
#[derive(Debug, Clone)]
pub struct DockerTlsConfig {
    pub ssl_cert_path: PathBuf,
    pub ssl_key_path: PathBuf,
}

/// How the container runtime collaborator should be reached (§6).
#[derive(Debug, Clone)]
pub enum DockerHost {
    /// No host configured: connect to the local Docker socket.
    LocalSocket,
    /// A remote daemon, optionally over TLS (schemes `http`/`https`/`tcp`
    /// trigger TLS using the configured certs and the system CA bundle).
    Remote { url: String, tls: Option<DockerTlsConfig> },
}

/// The full recognized configuration surface (§6).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub course_name: CourseName,
    pub backend_url: String,
    pub backend_port: u16,
    pub github_host: String,
    pub org: String,
    pub docker_host: DockerHost,
    pub num_slots_express: usize,
    pub num_slots_standard: usize,
    pub num_slots_regression: usize,
    pub pass_threshold: f64,
}

impl DispatcherConfig {
    pub const DEFAULT_NUM_SLOTS_EXPRESS: usize = 1;
    pub const DEFAULT_NUM_SLOTS_STANDARD: usize = 2;
    pub const DEFAULT_NUM_SLOTS_REGRESSION: usize = 1;
    pub const DEFAULT_PASS_THRESHOLD: f64 = 60.0;

    /// The webhook URL assembled from `backendUrl`/`backendPort`, per §6
    /// ("assembled into the webhook URL").
    pub fn webhook_url(&self) -> String {
        format!("{}:{}/githubWebhook", self.backend_url.trim_end_matches('/'), self.backend_port)
    }
}
