//! Shared data model (§3): the records the progression machine and the
//! provisioning orchestrator read and write, plus the job-shaped records
//! the dispatcher queues pass around.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A student's position in the progression chain: `D0PRE < D0 <
/// D1UNLOCKED < D1TEAMSET < D1 < D2 < D3PRE < D3`. Declaration order *is*
/// the ordering `derive(Ord)` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    D0Pre,
    D0,
    D1Unlocked,
    D1TeamSet,
    D1,
    D2,
    D3Pre,
    D3,
}

impl Status {
    /// The starting state for every newly sighted person (`handleUnknownUser`).
    pub const INITIAL: Status = Status::D0Pre;
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::D0Pre => "D0PRE",
            Status::D0 => "D0",
            Status::D1Unlocked => "D1UNLOCKED",
            Status::D1TeamSet => "D1TEAMSET",
            Status::D1 => "D1",
            Status::D2 => "D2",
            Status::D3Pre => "D3PRE",
            Status::D3 => "D3",
        };
        f.write_str(s)
    }
}

/// Error returned when a wire status string does not match any known stage.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized status string: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "D0PRE" => Status::D0Pre,
            "D0" => Status::D0,
            "D1UNLOCKED" => Status::D1Unlocked,
            "D1TEAMSET" => Status::D1TeamSet,
            "D1" => Status::D1,
            "D2" => Status::D2,
            "D3PRE" => Status::D3Pre,
            "D3" => Status::D3,
            other => return Err(ParseStatusError(other.to_string())),
        })
    }
}

/// A deliverable identifier (e.g. `d0`). Kept as an open string because a
/// course can define more deliverables than the four the progression
/// machine and provisioning orchestrator interpret; those flow through the
/// queue and grade plumbing without the core needing to understand them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelivId(pub String);

impl DelivId {
    pub const D0: &'static str = "d0";
    pub const D1: &'static str = "d1";
    pub const D2: &'static str = "d2";
    pub const D3: &'static str = "d3";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DelivId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DelivId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque record/entity identifier (person id, team id, repo id, ...).
pub type RecordId = String;

/// A residual "forward-compatible fields the core does not interpret" bag;
/// everything callers need to address directly is an explicit typed field
/// instead.
pub type CustomBag = HashMap<String, serde_json::Value>;

/// Identifies a unit of grading work (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitTarget {
    /// Opaque commit identifier.
    pub commit_sha: String,
    /// Unique key within the dispatcher for this commit (used for queue
    /// membership and `indexOf`/`remove` lookups).
    pub commit_url: String,
    pub repo_id: RecordId,
    pub deliv_id: DelivId,
    /// Where feedback is delivered. `EMPTY`/`POSTBACK` mean test mode.
    pub postback_url: String,
    /// Submission time, used for wait-time metrics and FIFO tie-breaking.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Sentinel postback URLs that select the mock grading path (§4.C).
pub const POSTBACK_URL_EMPTY: &str = "EMPTY";
pub const POSTBACK_URL_TEST: &str = "POSTBACK";

impl CommitTarget {
    /// True when this target should be graded by `MockGradingJob` rather
    /// than a real container run.
    pub fn is_test_mode(&self) -> bool {
        matches!(self.postback_url.as_str(), POSTBACK_URL_EMPTY | POSTBACK_URL_TEST)
    }
}

/// A `CommitTarget` plus deliverable-specific parameters. This is what the
/// job queues store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInput {
    pub target: CommitTarget,
    /// Container image reference for this deliverable.
    pub image: String,
    /// Per-deliverable execution timeout (§5 "Timeouts").
    pub timeout: Duration,
    /// Opaque deliverable-specific parameters passed to the container.
    #[serde(default)]
    pub params: CustomBag,
}

impl ContainerInput {
    /// The `(commitURL, delivId)` pair queues use for membership tests.
    pub fn queue_key(&self) -> (String, DelivId) {
        (self.target.commit_url.clone(), self.target.deliv_id.clone())
    }
}

/// The structured report a container produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoTestReport {
    /// The numeric grade, if the job produced one.
    pub score_overall: Option<f64>,
    /// True if the container run hit its timeout.
    pub timed_out: bool,
    /// Human-readable failure detail, if the run errored.
    pub error: Option<String>,
}

/// The full result of running a grading job (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTestResult {
    pub commit_sha: String,
    pub commit_url: String,
    pub deliv_id: DelivId,
    pub repo_id: RecordId,
    pub input: ContainerInput,
    pub output: AutoTestOutput,
}

impl AutoTestResult {
    /// Completion-path validation (§4.B step 1): required fields present.
    pub fn is_well_formed(&self) -> bool {
        !self.commit_sha.is_empty() && !self.commit_url.is_empty()
    }
}

/// Wraps the report plus whatever else the container returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoTestOutput {
    pub report: AutoTestReport,
}

/// A person known to the dispatcher (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: RecordId,
    pub github_id: String,
    pub kind: PersonKind,
    /// Cached progression stage (`custom.sddmStatus` in the source model).
    pub sddm_status: Status,
    #[serde(default)]
    pub custom: CustomBag,
}

impl Person {
    /// A freshly sighted person (`handleUnknownUser`), starting at `D0PRE`.
    pub fn new_unknown(id: impl Into<String>, github_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            github_id: github_id.into(),
            kind: PersonKind::Student,
            sddm_status: Status::INITIAL,
            custom: CustomBag::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonKind {
    Student,
    Staff,
    Admin,
}

/// A team of 1-2 people covering some set of deliverables (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: RecordId,
    pub url: Option<String>,
    pub members: HashSet<RecordId>,
    pub sdmmd0: bool,
    pub sdmmd1: bool,
    pub sdmmd2: bool,
    pub sdmmd3: bool,
    #[serde(default)]
    pub custom: CustomBag,
}

impl Team {
    pub fn new(id: impl Into<String>, members: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            id: id.into(),
            url: None,
            members: members.into_iter().collect(),
            sdmmd0: false,
            sdmmd1: false,
            sdmmd2: false,
            sdmmd3: false,
            custom: CustomBag::new(),
        }
    }
}

/// A repository, local to the dispatcher's bookkeeping, plus its remote
/// counterpart's URL once source-hosting provisioning succeeds (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RecordId,
    pub url: Option<String>,
    pub teams: HashSet<RecordId>,
    pub d0_enabled: bool,
    pub d1_enabled: bool,
    pub d2_enabled: bool,
    pub d3_enabled: bool,
    /// Pull-request-for-D3 completed (§4.D D3PRE -> D3 guard).
    pub sddm_d3pr: bool,
    #[serde(default)]
    pub custom: CustomBag,
}

impl Repository {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            teams: HashSet::new(),
            d0_enabled: false,
            d1_enabled: false,
            d2_enabled: false,
            d3_enabled: false,
            sddm_d3pr: false,
            custom: CustomBag::new(),
        }
    }
}

/// Sentinel score meaning "placeholder, not yet graded" on the wire (§3,
/// §4.E). In memory this is `None`; `-1.0` is only synthesized at
/// serialization/creation boundaries that need the literal sentinel.
pub const PLACEHOLDER_SCORE: f64 = -1.0;

/// A grade record, keyed by `(personOrRepoId, delivId)` (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub person_or_repo_id: RecordId,
    pub deliv_id: DelivId,
    /// `None` models the `-1` placeholder sentinel — "not graded yet".
    pub score: Option<f64>,
    pub url: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub custom: CustomBag,
}

impl Grade {
    /// A freshly created placeholder grade (§4.E).
    pub fn placeholder(
        person_or_repo_id: impl Into<String>,
        deliv_id: DelivId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            person_or_repo_id: person_or_repo_id.into(),
            deliv_id,
            score: None,
            url: None,
            timestamp: now,
            custom: CustomBag::new(),
        }
    }

    /// Whether this grade meets a pass threshold.
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.score.is_some_and(|s| s >= threshold)
    }
}
