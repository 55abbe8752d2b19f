//! Per-computation reconciliation loop
//!
//! One watcher task per in-flight computation. The loop pairs a list
//! snapshot with a watch resumed from the snapshot's token, so no job
//! transition between the two can be missed, and short-circuits on the
//! snapshot alone when the computation already finished before the
//! watcher started.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use solvent_common::models::Outcome;
use solvent_common::{ChangeKind, Result};

use crate::dispatcher::Dispatcher;
use crate::job::{JobHandle, JobState};
use crate::notifier::Notifier;
use crate::orchestrator::Orchestrator;

/// Decides computation termination from per-job success/failure counts.
///
/// `num_jobs` is fixed when the tally is created; jobs added to a
/// computation afterwards are a calling-contract error, not a runtime case.
/// Each job identity contributes to at most one count, so replaying a
/// change event never double-counts.
#[derive(Debug)]
struct OutcomeTally {
    num_jobs: usize,
    succeeded: HashSet<String>,
    failed: HashSet<String>,
}

impl OutcomeTally {
    fn new(num_jobs: usize) -> Self {
        Self {
            num_jobs,
            succeeded: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Fold one job observation into the counts
    fn observe(&mut self, name: &str, state: JobState) {
        match state {
            JobState::Succeeded => {
                // A retry can succeed after earlier pod failures; the job
                // then counts as succeeded, not both.
                self.failed.remove(name);
                self.succeeded.insert(name.to_string());
            }
            JobState::Failed => {
                if !self.succeeded.contains(name) {
                    self.failed.insert(name.to_string());
                }
            }
            JobState::Active => {}
        }
    }

    /// A deleted job can no longer succeed
    fn observe_deleted(&mut self, name: &str) {
        if !self.succeeded.contains(name) {
            self.failed.insert(name.to_string());
        }
    }

    /// Evaluate the termination predicate.
    ///
    /// Success as soon as any job succeeded; failure once every job failed.
    /// With zero jobs the failure threshold holds vacuously, so an entirely
    /// failed submission resolves immediately instead of pending forever.
    fn outcome(&self) -> Option<Outcome> {
        if !self.succeeded.is_empty() {
            Some(Outcome::Success)
        } else if self.failed.len() >= self.num_jobs {
            Some(Outcome::Failure)
        } else {
            None
        }
    }
}

/// Watches one computation's jobs until termination, then notifies and cleans up
pub struct ComputationWatcher {
    orchestrator: Arc<dyn Orchestrator>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<dyn Notifier>,
}

impl ComputationWatcher {
    /// Create a watcher over the given orchestrator, dispatcher, and notifier
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orchestrator,
            dispatcher,
            notifier,
        }
    }

    /// Run the reconciliation loop for one computation.
    ///
    /// Returns the computation's outcome after the scheduler has been
    /// notified (or notification gave up) and the jobs are deleted.
    /// Transient orchestrator errors propagate to the spawning task.
    pub async fn run(&self, computation_id: &str, user_id: &str) -> Result<Outcome> {
        let selector = self.dispatcher.computation_selector(computation_id);

        loop {
            let (jobs, token) = self.orchestrator.list(&selector).await?;
            let mut tally = OutcomeTally::new(jobs.len());
            for job in jobs {
                let handle = JobHandle::new(job);
                tally.observe(handle.name(), handle.state());
            }
            if let Some(outcome) = tally.outcome() {
                debug!(
                    computation_id = %computation_id,
                    outcome = %outcome,
                    "termination decided from list snapshot"
                );
                return self.finish(outcome, computation_id, user_id).await;
            }

            let token = token.unwrap_or_default();
            let mut changes = self.orchestrator.watch_from(&selector, &token).await?;
            while let Some(change) = changes.next().await {
                let (kind, job) = change?;
                let handle = JobHandle::new(job);
                match kind {
                    ChangeKind::Deleted => tally.observe_deleted(handle.name()),
                    ChangeKind::Added | ChangeKind::Modified => {
                        tally.observe(handle.name(), handle.state())
                    }
                }
                if let Some(outcome) = tally.outcome() {
                    return self.finish(outcome, computation_id, user_id).await;
                }
            }

            // The server closed the watch before a decision; a fresh list
            // re-derives the truth and yields a new token.
            debug!(computation_id = %computation_id, "watch stream ended, relisting");
        }
    }

    /// Notify the scheduler and reclaim the computation's jobs.
    ///
    /// Cleanup is not conditioned on notification: a scheduler outage must
    /// not leak cluster resources.
    async fn finish(
        &self,
        outcome: Outcome,
        computation_id: &str,
        user_id: &str,
    ) -> Result<Outcome> {
        info!(
            computation_id = %computation_id,
            user_id = %user_id,
            outcome = %outcome,
            "computation terminated"
        );

        if !self.notifier.notify_finished(computation_id, user_id).await {
            warn!(
                computation_id = %computation_id,
                "scheduler was not notified, cleaning up resources anyway"
            );
        }

        match self.dispatcher.delete_computation(computation_id).await {
            Ok(deleted) => {
                info!(computation_id = %computation_id, deleted = deleted, "cleaned up computation")
            }
            Err(e) => {
                error!(computation_id = %computation_id, error = %e, "cleanup failed")
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;
    use k8s_openapi::api::batch::v1::{Job, JobStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::compiler::JobCompiler;
    use crate::notifier::MockNotifier;
    use crate::orchestrator::{JobChange, MockOrchestrator};

    // =========================================================================
    // OutcomeTally: the pure counting policy
    // =========================================================================

    #[test]
    fn test_tally_success_on_first_succeeded_job() {
        let mut tally = OutcomeTally::new(3);
        tally.observe("a", JobState::Active);
        tally.observe("b", JobState::Succeeded);
        assert_eq!(tally.outcome(), Some(Outcome::Success));
    }

    #[test]
    fn test_tally_failure_requires_every_job() {
        let mut tally = OutcomeTally::new(3);
        tally.observe("a", JobState::Failed);
        tally.observe("b", JobState::Failed);
        assert_eq!(tally.outcome(), None);
        tally.observe("c", JobState::Failed);
        assert_eq!(tally.outcome(), Some(Outcome::Failure));
    }

    #[test]
    fn test_tally_zero_jobs_fails_immediately() {
        let tally = OutcomeTally::new(0);
        assert_eq!(tally.outcome(), Some(Outcome::Failure));
    }

    #[test]
    fn test_tally_replayed_events_are_idempotent() {
        let mut tally = OutcomeTally::new(3);
        tally.observe("a", JobState::Failed);
        tally.observe("a", JobState::Failed);
        tally.observe("a", JobState::Failed);
        tally.observe("b", JobState::Failed);
        // Three events for "a" still count one failed job.
        assert_eq!(tally.outcome(), None);
    }

    #[test]
    fn test_tally_success_after_earlier_failure_moves_the_job() {
        let mut tally = OutcomeTally::new(2);
        tally.observe("a", JobState::Failed);
        tally.observe("b", JobState::Failed);
        // "a" retried and succeeded: the computation is a success.
        tally.observe("a", JobState::Succeeded);
        assert_eq!(tally.outcome(), Some(Outcome::Success));
    }

    #[test]
    fn test_tally_deleted_job_counts_as_failed() {
        let mut tally = OutcomeTally::new(2);
        tally.observe_deleted("a");
        assert_eq!(tally.outcome(), None);
        tally.observe_deleted("b");
        assert_eq!(tally.outcome(), Some(Outcome::Failure));
    }

    // =========================================================================
    // Reconciliation loop over the mocked facade
    // =========================================================================

    fn job(name: &str, active: i32, succeeded: i32, failed: i32) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(JobStatus {
                active: Some(active),
                succeeded: Some(succeeded),
                failed: Some(failed),
                ..Default::default()
            }),
        }
    }

    fn changes(items: Vec<JobChange>) -> futures::stream::BoxStream<'static, Result<JobChange>> {
        stream::iter(items.into_iter().map(Ok)).boxed()
    }

    fn watcher(orchestrator: MockOrchestrator, notifier: MockNotifier) -> ComputationWatcher {
        let orchestrator: Arc<dyn Orchestrator> = Arc::new(orchestrator);
        let dispatcher = Arc::new(Dispatcher::new(
            orchestrator.clone(),
            JobCompiler::new("solvent", "solvent-sidecar:latest"),
            "solvent",
        ));
        ComputationWatcher::new(orchestrator, dispatcher, Arc::new(notifier))
    }

    fn notifier_expecting(times: usize, verdict: bool) -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_finished()
            .times(times)
            .withf(|computation_id, user_id| computation_id == "c-1" && user_id == "u-1")
            .returning(move |_, _| verdict);
        notifier
    }

    #[tokio::test]
    async fn test_snapshot_short_circuit_opens_no_watch() {
        let mut mock = MockOrchestrator::new();
        let lists = AtomicUsize::new(0);
        mock.expect_list().times(2).returning(move |_| {
            if lists.fetch_add(1, Ordering::SeqCst) == 0 {
                // Watcher snapshot: already decided.
                Ok((vec![job("a", 0, 1, 0), job("b", 1, 0, 0)], Some("5".into())))
            } else {
                // Cleanup listing.
                Ok((vec![job("a", 0, 1, 0), job("b", 1, 0, 0)], None))
            }
        });
        // No expect_watch_from: opening a subscription would panic.
        mock.expect_delete().times(2).returning(|_| Ok(()));

        let outcome = watcher(mock, notifier_expecting(1, true))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_zero_jobs_resolves_to_failure() {
        let mut mock = MockOrchestrator::new();
        mock.expect_list().times(2).returning(|_| Ok((Vec::new(), None)));
        // Nothing to delete.

        let outcome = watcher(mock, notifier_expecting(1, true))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn test_first_success_terminates_without_waiting_for_siblings() {
        let mut mock = MockOrchestrator::new();
        let lists = AtomicUsize::new(0);
        mock.expect_list().times(2).returning(move |_| {
            let all_active = vec![job("a", 1, 0, 0), job("b", 1, 0, 0), job("c", 1, 0, 0)];
            if lists.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok((all_active, Some("41".into())))
            } else {
                Ok((all_active, None))
            }
        });
        mock.expect_watch_from()
            .times(1)
            .withf(|selector, token| {
                selector == "app=solvent,computation_id=c-1" && token == "41"
            })
            .return_once(|_, _| {
                Ok(changes(vec![(ChangeKind::Modified, job("a", 0, 1, 0))]))
            });
        mock.expect_delete().times(3).returning(|_| Ok(()));

        let outcome = watcher(mock, notifier_expecting(1, true))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_total_failure_needs_every_jobs_event() {
        let mut mock = MockOrchestrator::new();
        let lists = AtomicUsize::new(0);
        mock.expect_list().times(2).returning(move |_| {
            let jobs = vec![job("a", 1, 0, 0), job("b", 1, 0, 0), job("c", 1, 0, 0)];
            if lists.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok((jobs, Some("7".into())))
            } else {
                Ok((jobs, None))
            }
        });
        mock.expect_watch_from().times(1).return_once(|_, _| {
            Ok(changes(vec![
                (ChangeKind::Modified, job("b", 0, 0, 1)),
                // Replays of b must not count twice.
                (ChangeKind::Modified, job("b", 0, 0, 1)),
                (ChangeKind::Modified, job("c", 0, 0, 1)),
                (ChangeKind::Modified, job("a", 0, 0, 1)),
            ]))
        });
        mock.expect_delete().times(3).returning(|_| Ok(()));

        let outcome = watcher(mock, notifier_expecting(1, true))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn test_cleanup_runs_when_notifier_always_fails() {
        let mut mock = MockOrchestrator::new();
        mock.expect_list()
            .times(2)
            .returning(|_| Ok((vec![job("a", 0, 1, 0)], Some("3".into()))));
        mock.expect_delete().times(1).returning(|_| Ok(()));

        let outcome = watcher(mock, notifier_expecting(1, false))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_out_of_band_deletion_of_all_jobs_fails_the_computation() {
        let mut mock = MockOrchestrator::new();
        let lists = AtomicUsize::new(0);
        mock.expect_list().times(2).returning(move |_| {
            if lists.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok((vec![job("a", 1, 0, 0), job("b", 1, 0, 0)], Some("9".into())))
            } else {
                Ok((Vec::new(), None))
            }
        });
        mock.expect_watch_from().times(1).return_once(|_, _| {
            Ok(changes(vec![
                (ChangeKind::Deleted, job("a", 1, 0, 0)),
                (ChangeKind::Deleted, job("b", 1, 0, 0)),
            ]))
        });

        let outcome = watcher(mock, notifier_expecting(1, true))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn test_exhausted_watch_relists_and_decides() {
        let mut mock = MockOrchestrator::new();
        let lists = AtomicUsize::new(0);
        mock.expect_list().times(3).returning(move |_| {
            match lists.fetch_add(1, Ordering::SeqCst) {
                // First snapshot: undecided.
                0 => Ok((vec![job("a", 1, 0, 0)], Some("2".into()))),
                // Relist after the watch ends: decided.
                1 => Ok((vec![job("a", 0, 1, 0)], Some("8".into()))),
                // Cleanup listing.
                _ => Ok((vec![job("a", 0, 1, 0)], None)),
            }
        });
        // The watch delivers nothing and ends.
        mock.expect_watch_from()
            .times(1)
            .return_once(|_, _| Ok(changes(Vec::new())));
        mock.expect_delete().times(1).returning(|_| Ok(()));

        let outcome = watcher(mock, notifier_expecting(1, true))
            .run("c-1", "u-1")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_transient_list_error_propagates() {
        let mut mock = MockOrchestrator::new();
        mock.expect_list().times(1).returning(|_| {
            Err(solvent_common::Error::from(kube::Error::Api(
                kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "etcdserver: request timed out".to_string(),
                    reason: "ServerTimeout".to_string(),
                    code: 500,
                },
            )))
        });

        let result = watcher(mock, MockNotifier::new()).run("c-1", "u-1").await;
        assert!(result.is_err());
    }
}
