//! Environment-based configuration for the sidecar

use std::path::PathBuf;

use solvent_common::{Error, Result, SRC_MOUNT_PATH};

/// Sidecar configuration, injected by the job compiler and the pod itself
#[derive(Clone, Debug)]
pub struct SidecarConfig {
    /// Computation this solve belongs to
    pub computation_id: String,
    /// Submitting user
    pub user_id: String,
    /// Name of the pod the sidecar runs in
    pub pod_name: String,
    /// Namespace of the pod
    pub namespace: String,
    /// Host name of the result-ingestion service
    pub solution_service: String,
    /// Directory holding the solution and errors artifacts
    pub artifact_dir: PathBuf,
}

impl SidecarConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                Error::config(format!("missing required environment variable {key}"))
            })
        };

        Ok(Self {
            computation_id: required("COMPUTATION_ID")?,
            user_id: required("USER_ID")?,
            pod_name: required("HOSTNAME")?,
            namespace: lookup("NAMESPACE").unwrap_or_else(|| "default".to_string()),
            solution_service: lookup("SOLUTION_SERVICE_NAME")
                .unwrap_or_else(|| "solution-service".to_string()),
            artifact_dir: lookup("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SRC_MOUNT_PATH)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + '_ {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = SidecarConfig::from_lookup(env(&[
            ("COMPUTATION_ID", "c-1"),
            ("USER_ID", "u-1"),
            ("HOSTNAME", "solvent-abc"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "default");
        assert_eq!(config.solution_service, "solution-service");
        assert_eq!(config.artifact_dir, PathBuf::from("/src"));
    }

    #[test]
    fn test_missing_identity_rejected() {
        let err = SidecarConfig::from_lookup(env(&[("COMPUTATION_ID", "c-1")])).unwrap_err();
        assert!(err.to_string().contains("USER_ID"));
    }
}
