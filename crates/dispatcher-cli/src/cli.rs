//! Flag/env parsing for the demo binary's own bootstrap (§6's
//! `DispatcherConfig` surface). This is the CLI wrapper's process
//! bootstrap, not the real grading platform's config-loading subsystem —
//! that stays out of scope (§1).

use std::path::PathBuf;

use clap::Parser;
use dispatcher_core::{CourseName, DispatcherConfig, DockerHost, DockerTlsConfig};

#[derive(Debug, Clone, Parser)]
#[command(name = "dispatcher", version, about = "Grading dispatcher demo harness")]
pub struct Cli {
    #[arg(long, env = "DISPATCHER_COURSE_NAME", default_value = "sdmm")]
    pub course_name: String,

    #[arg(long, env = "DISPATCHER_BACKEND_URL", default_value = "http://127.0.0.1:11315")]
    pub backend_url: String,

    #[arg(long, env = "DISPATCHER_BACKEND_PORT", default_value_t = 11316)]
    pub backend_port: u16,

    #[arg(long, env = "DISPATCHER_GITHUB_HOST", default_value = "github.com")]
    pub github_host: String,

    #[arg(long, env = "DISPATCHER_ORG", default_value = "SECapstone")]
    pub org: String,

    /// Remote Docker daemon URL (`http`/`https`/`tcp` schemes use TLS). Omit
    /// to connect to the local socket.
    #[arg(long, env = "DISPATCHER_DOCKER_HOST")]
    pub docker_host: Option<String>,

    #[arg(long, env = "DISPATCHER_DOCKER_SSL_CERT")]
    pub docker_ssl_cert: Option<PathBuf>,

    #[arg(long, env = "DISPATCHER_DOCKER_SSL_KEY")]
    pub docker_ssl_key: Option<PathBuf>,

    #[arg(
        long,
        env = "DISPATCHER_NUM_SLOTS_EXPRESS",
        default_value_t = DispatcherConfig::DEFAULT_NUM_SLOTS_EXPRESS
    )]
    pub num_slots_express: usize,

    #[arg(
        long,
        env = "DISPATCHER_NUM_SLOTS_STANDARD",
        default_value_t = DispatcherConfig::DEFAULT_NUM_SLOTS_STANDARD
    )]
    pub num_slots_standard: usize,

    #[arg(
        long,
        env = "DISPATCHER_NUM_SLOTS_REGRESSION",
        default_value_t = DispatcherConfig::DEFAULT_NUM_SLOTS_REGRESSION
    )]
    pub num_slots_regression: usize,

    #[arg(
        long,
        env = "DISPATCHER_PASS_THRESHOLD",
        default_value_t = DispatcherConfig::DEFAULT_PASS_THRESHOLD
    )]
    pub pass_threshold: f64,
}

impl Cli {
    pub fn into_config(self) -> DispatcherConfig {
        let docker_host = match self.docker_host {
            None => DockerHost::LocalSocket,
            Some(url) => {
                let tls = match (self.docker_ssl_cert, self.docker_ssl_key) {
                    (Some(ssl_cert_path), Some(ssl_key_path)) => {
                        Some(DockerTlsConfig { ssl_cert_path, ssl_key_path })
                    }
                    _ => None,
                };
                DockerHost::Remote { url, tls }
            }
        };

        DispatcherConfig {
            course_name: CourseName::from(self.course_name.as_str()),
            backend_url: self.backend_url,
            backend_port: self.backend_port,
            github_host: self.github_host,
            org: self.org,
            docker_host,
            num_slots_express: self.num_slots_express,
            num_slots_standard: self.num_slots_standard,
            num_slots_regression: self.num_slots_regression,
            pass_threshold: self.pass_threshold,
        }
    }
}
