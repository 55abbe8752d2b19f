//! Common types for Solvent: wire models, errors, and shared constants
//!
//! Everything the dispatch service and the in-pod sidecar need to agree on
//! lives here: label keys, artifact paths inside the solver pod, the system
//! identity headers, and the serde models exchanged with the scheduler and
//! solution services.

#![deny(missing_docs)]

pub mod error;
pub mod models;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key carrying the system-wide namespace tag (the job prefix)
pub const LABEL_APP: &str = "app";

/// Label key carrying the computation a job belongs to
pub const LABEL_COMPUTATION_ID: &str = "computation_id";

/// Label key carrying the submitting user
pub const LABEL_USER_ID: &str = "user_id";

/// Mount path of the shared ephemeral volume inside solver pods
pub const SRC_MOUNT_PATH: &str = "/src";

/// Model file downloaded by the fetch stage
pub const MODEL_FILE: &str = "/src/model.mzn";

/// Data file downloaded (or substituted empty) by the fetch stage
pub const DATA_FILE: &str = "/src/data.dzn";

/// File name of the solver's captured standard output
pub const SOLUTION_FILE_NAME: &str = "solution.txt";

/// File name of the solver's captured standard error
pub const ERRORS_FILE_NAME: &str = "errors.txt";

/// Absolute path of the solution artifact inside the pod
pub const SOLUTION_FILE: &str = "/src/solution.txt";

/// Absolute path of the errors artifact inside the pod
pub const ERRORS_FILE: &str = "/src/errors.txt";

/// Position of the solve container in the pod's container list
pub const SOLVER_CONTAINER_INDEX: usize = 0;

/// Fixed identity header pair sent to the scheduler and solution services
pub const SYSTEM_IDENTITY_HEADERS: [(&str, &str); 2] = [("UserId", "system"), ("Role", "admin")];

/// Kind of change delivered by a resource watch stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// The resource appeared after the snapshot
    Added,
    /// The resource's state changed
    Modified,
    /// The resource was removed
    Deleted,
}

/// Render a label set as a Kubernetes label selector string
pub fn label_selector(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
