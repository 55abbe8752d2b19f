//! Solvent dispatch service
//!
//! Turns a computation request into one Kubernetes Job per requested solver,
//! watches the job set with a list-then-watch reconciliation loop until the
//! computation terminates (first success, or total failure), notifies the
//! scheduler service, and deletes the computation's jobs exactly once.

pub mod api;
pub mod compiler;
pub mod config;
pub mod dispatcher;
pub mod job;
pub mod notifier;
pub mod orchestrator;
pub mod watcher;
