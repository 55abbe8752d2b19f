//! Classifies the artifact files a solve left behind
//!
//! The solve stage redirects stdout to the solution file and stderr to the
//! errors file. A non-empty errors file wins over any solution output; a
//! solve that produced neither file still yields a record, with an empty
//! body, so the solution service always hears about the attempt.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use k8s_openapi::api::core::v1::Pod;

use solvent_common::models::{Outcome, SolutionRecord};
use solvent_common::{Result, ERRORS_FILE_NAME, SOLUTION_FILE_NAME, SOLVER_CONTAINER_INDEX};

use crate::config::SidecarConfig;

/// Failure reason when the errors artifact is non-empty
const REASON_SOLVER_ERROR: &str = "solver error";

/// Failure reason when neither artifact exists
const REASON_NO_OUTPUT: &str = "no output produced";

/// Image of the solve container, taken from the pod spec
pub fn solver_image(pod: &Pod) -> Option<String> {
    pod.spec
        .as_ref()?
        .containers
        .get(SOLVER_CONTAINER_INDEX)?
        .image
        .clone()
}

/// Build the result record from the artifacts in the configured directory
pub fn build_record(config: &SidecarConfig, solver: Option<String>) -> Result<SolutionRecord> {
    let errors = read_artifact(&config.artifact_dir.join(ERRORS_FILE_NAME))?;
    let solution = read_artifact(&config.artifact_dir.join(SOLUTION_FILE_NAME))?;

    let (status, reason, body) = match (errors, solution) {
        (Some(errors), _) if !errors.is_empty() => {
            (Outcome::Failure, Some(REASON_SOLVER_ERROR), errors)
        }
        (_, Some(solution)) => (Outcome::Success, None, solution),
        _ => (Outcome::Failure, Some(REASON_NO_OUTPUT), String::new()),
    };

    Ok(SolutionRecord {
        user_id: config.user_id.clone(),
        computation_id: config.computation_id.clone(),
        status,
        reason: reason.map(str::to_string),
        solver,
        body,
    })
}

/// Read an artifact file; an absent file is not an error
fn read_artifact(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
