//! Environment-based configuration for the dispatch service

use std::net::SocketAddr;
use std::time::Duration;

use solvent_common::{Error, Result};

/// Default bind address for the HTTP API
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);

/// Runtime configuration, read once at startup
#[derive(Clone, Debug)]
pub struct Config {
    /// Prefix for job names and value of the system-wide `app` label
    pub job_prefix: String,
    /// Image of the sidecar container injected into every solver pod
    pub sidecar_image: String,
    /// Host name of the scheduler service to notify on termination
    pub scheduler_host: String,
    /// Namespace the solver jobs live in
    pub namespace: String,
    /// Address the HTTP API listens on
    pub bind_addr: SocketAddr,
    /// Notification attempts before giving up
    pub notify_attempts: u32,
    /// Fixed pause between notification attempts
    pub notify_interval: Duration,
}

impl Config {
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

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::config(format!("invalid BIND_ADDR {raw:?}: {e}")))?,
            None => SocketAddr::from(DEFAULT_BIND_ADDR),
        };

        Ok(Self {
            job_prefix: required("JOB_PREFIX")?,
            sidecar_image: required("SIDECAR_IMAGE_NAME")?,
            scheduler_host: required("SCHEDULER_NAME")?,
            namespace: lookup("NAMESPACE").unwrap_or_else(|| "default".to_string()),
            bind_addr,
            notify_attempts: 5,
            notify_interval: Duration::from_secs(5),
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
        let config = Config::from_lookup(env(&[
            ("JOB_PREFIX", "solvent"),
            ("SIDECAR_IMAGE_NAME", "solvent-sidecar:latest"),
            ("SCHEDULER_NAME", "scheduler-service"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "default");
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8000)));
        assert_eq!(config.notify_attempts, 5);
        assert_eq!(config.notify_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required_variable() {
        let err = Config::from_lookup(env(&[("JOB_PREFIX", "solvent")])).unwrap_err();
        assert!(err.to_string().contains("SIDECAR_IMAGE_NAME"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(env(&[
            ("JOB_PREFIX", "solvent"),
            ("SIDECAR_IMAGE_NAME", "solvent-sidecar:latest"),
            ("SCHEDULER_NAME", "scheduler-service"),
            ("NAMESPACE", "solvers"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "solvers");
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_invalid_bind_addr() {
        let err = Config::from_lookup(env(&[
            ("JOB_PREFIX", "solvent"),
            ("SIDECAR_IMAGE_NAME", "solvent-sidecar:latest"),
            ("SCHEDULER_NAME", "scheduler-service"),
            ("BIND_ADDR", "not-an-address"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BIND_ADDR"));
    }
}
