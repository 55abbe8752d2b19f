//! Wire models shared with the scheduler and solution services
//!
//! Field names are part of the external contract (snake_case JSON), so the
//! structs serialize exactly as named here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Orchestrator-maintained outcome counters for one solver job
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolverStatus {
    /// Number of actively running pods
    pub active: i32,
    /// Number of pods that failed
    pub failed: i32,
    /// Number of pods that succeeded
    pub succeeded: i32,
}

/// One requested solver and, on the way out, its current status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Solver {
    /// Solver container image
    pub image: String,
    /// CPU request in whole cores
    pub cpu_request: u32,
    /// Memory request in Mi
    pub mem_request: u32,
    /// Current counters, absent on submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SolverStatus>,
}

/// A user's request to run a computation across one or more solvers
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComputationRequest {
    /// Submitting user
    pub user_id: String,
    /// Absolute deadline for every solver job, in seconds from job start
    pub timeout_seconds: i64,
    /// URL of the model file to solve
    pub model_url: String,
    /// Optional URL of the data file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Solvers to race against each other
    pub solvers: Vec<Solver>,
    /// Shell-style option string forwarded to every solver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_options: Option<String>,
}

/// Snapshot of a computation's solvers, returned by submit and status calls
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComputationStatus {
    /// The computation's opaque identifier
    pub computation_id: String,
    /// Per-solver state
    pub solvers: Vec<Solver>,
}

/// Message sent to the scheduler service when a computation terminates
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishComputationMessage {
    /// Submitting user
    pub user_id: String,
    /// The finished computation
    pub computation_id: String,
}

/// Terminal outcome of a computation or a single solve
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    /// At least one solver produced a solution
    Success,
    /// Every solver failed, or the solve produced no usable output
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "Success"),
            Outcome::Failure => write!(f, "Failure"),
        }
    }
}

/// Result record uploaded by the sidecar to the solution service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolutionRecord {
    /// Submitting user
    pub user_id: String,
    /// Computation the solve belonged to
    pub computation_id: String,
    /// Whether the solve produced a solution
    pub status: Outcome,
    /// Failure reason, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Image of the solver that ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    /// Solution text or error text, possibly empty
    pub body: String,
}
