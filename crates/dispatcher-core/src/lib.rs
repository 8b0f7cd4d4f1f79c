#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Domain model, progression state machine, and provisioning orchestrator
//! for the grading dispatcher core.

pub mod config;
pub mod errors;
pub mod hosting;
pub mod model;
pub mod persistence;
pub mod progression;
pub mod provisioning;

pub use config::{CourseName, DispatcherConfig, DockerHost, DockerTlsConfig};
pub use errors::{ConsistencyError, FailurePayload, ProvisioningError, ValidationError};
pub use hosting::{FixtureHostingAdapter, SourceHostingAdapter};
pub use model::{
    AutoTestOutput, AutoTestReport, AutoTestResult, CommitTarget, ContainerInput, CustomBag,
    DelivId, Grade, ParseStatusError, Person, PersonKind, RecordId, Repository, Status, Team,
    PLACEHOLDER_SCORE, POSTBACK_URL_EMPTY, POSTBACK_URL_TEST,
};
pub use persistence::{InMemoryPersistenceStore, PersistenceStore};
pub use progression::compute_status_string;
pub use provisioning::{provision, ProvisionOutcome, StatusPayload};
