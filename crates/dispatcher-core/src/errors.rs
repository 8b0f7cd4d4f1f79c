//! Error vocabulary (§7). Validation failures are a typed enum so call
//! sites and tests can match on cause; everything else collapses to an
//! opaque `anyhow::Error` at the boundary: `thiserror` for seam errors
//! call sites match on, `anyhow` for opaque propagation past them.

use crate::model::{DelivId, RecordId};

/// §7 "Validation" class: bad input, never retried, always user-visible.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("unknown deliverable id: {0}")]
    UnknownDeliverable(DelivId),

    #[error("a team for this deliverable must have 1 or 2 distinct members, got {0}")]
    WrongTeamSize(usize),

    #[error("duplicate person in team: {0}")]
    DuplicatePerson(RecordId),

    #[error("person not registered: {0}")]
    PersonNotRegistered(RecordId),

    #[error("all teammates must have achieved a score of {threshold}% or more on {deliv}")]
    InsufficientGrade { deliv: DelivId, threshold: f64 },

    #[error("person {person} is not in the required status for this action (expected {expected}, found {found})")]
    BadStatus {
        person: RecordId,
        expected: String,
        found: String,
    },

    #[error("person {0} already has an enabled repo for this deliverable")]
    AlreadyProvisioned(RecordId),
}

/// §7 "Consistency" class: local state already exists where the caller
/// expected it absent. Logged and failed without rollback, per §7.
#[derive(Debug, thiserror::Error)]
#[error("consistency violation: {0}")]
pub struct ConsistencyError(pub String);

/// Top-level error returned by the provisioning orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The failure shape returned to callers (§4.E, §7): never leaks internal
/// details, always points at course staff.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FailurePayload {
    pub should_logout: bool,
    pub message: String,
}

impl FailurePayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self { should_logout: false, message: message.into() }
    }

    /// The generic boundary message for errors that must not leak detail.
    pub fn generic() -> Self {
        Self::new("Something went wrong with your request; please contact course staff.")
    }
}

impl From<&ProvisioningError> for FailurePayload {
    fn from(err: &ProvisioningError) -> Self {
        match err {
            ProvisioningError::Validation(v) => FailurePayload::new(v.to_string()),
            ProvisioningError::Consistency(_) | ProvisioningError::Other(_) => {
                FailurePayload::generic()
            }
        }
    }
}
