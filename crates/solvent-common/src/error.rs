//! Error types for the Solvent services
//!
//! Variants mirror the failure categories the dispatch pipeline actually
//! meets: transient orchestrator calls, remote collaborator services,
//! rejected input, and startup configuration.

use thiserror::Error;

/// Main error type for Solvent operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API call failed (create, list, watch, delete)
    #[error("orchestrator error: {source}")]
    Orchestrator {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A collaborator service replied with a non-success status or was unreachable
    #[error("remote service error [{service}]: {message}")]
    RemoteService {
        /// Name of the collaborator (e.g. "solution-service")
        service: String,
        /// Description of what failed
        message: String,
    },

    /// Rejected input (bad resource requests, malformed option string)
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field, when one can be named
        field: Option<String>,
    },

    /// Missing or malformed startup configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's missing or malformed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "watcher", "sidecar")
        context: String,
    },

    /// Filesystem error while reading result artifacts
    #[error("io error: {source}")]
    Io {
        /// The underlying io error
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a remote service error for the named collaborator
    pub fn remote_service(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RemoteService {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}
