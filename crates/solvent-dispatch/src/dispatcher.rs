//! Submits solver jobs and answers which jobs belong to a computation

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use solvent_common::models::ComputationRequest;
use solvent_common::{label_selector, Result, LABEL_APP, LABEL_COMPUTATION_ID, LABEL_USER_ID};

use crate::compiler::{JobCompiler, SolverJobParams};
use crate::job::JobHandle;
use crate::orchestrator::Orchestrator;

/// Creates, lists, and deletes the jobs of solver computations
pub struct Dispatcher {
    orchestrator: Arc<dyn Orchestrator>,
    compiler: JobCompiler,
    job_prefix: String,
}

impl Dispatcher {
    /// Create a dispatcher over the given orchestrator
    pub fn new(orchestrator: Arc<dyn Orchestrator>, compiler: JobCompiler, job_prefix: &str) -> Self {
        Self {
            orchestrator,
            compiler,
            job_prefix: job_prefix.to_string(),
        }
    }

    /// Label selector matching every job of this deployment
    fn app_selector(&self) -> String {
        label_selector(&[(LABEL_APP, &self.job_prefix)])
    }

    /// Label selector matching one computation's jobs
    pub fn computation_selector(&self, computation_id: &str) -> String {
        label_selector(&[
            (LABEL_APP, &self.job_prefix),
            (LABEL_COMPUTATION_ID, computation_id),
        ])
    }

    /// Create one job per requested solver.
    ///
    /// Jobs created before a failing create stay behind: partial submission
    /// is observable, and the computation watcher resolves it.
    pub async fn submit(
        &self,
        request: &ComputationRequest,
        computation_id: &str,
    ) -> Result<Vec<JobHandle>> {
        let mut handles = Vec::with_capacity(request.solvers.len());
        for solver in &request.solvers {
            let labels = BTreeMap::from([
                (LABEL_APP.to_string(), self.job_prefix.clone()),
                (LABEL_COMPUTATION_ID.to_string(), computation_id.to_string()),
                (LABEL_USER_ID.to_string(), request.user_id.clone()),
            ]);
            let job = self.compiler.compile(&SolverJobParams {
                image: &solver.image,
                option_string: request.solver_options.as_deref().unwrap_or(""),
                model_url: &request.model_url,
                data_url: request.data_url.as_deref(),
                cpu_request: solver.cpu_request,
                mem_request: solver.mem_request,
                timeout_seconds: request.timeout_seconds,
                labels,
            })?;
            let created = self.orchestrator.create(job).await?;
            let handle = JobHandle::new(created);
            info!(
                job = %handle.name(),
                computation_id = %computation_id,
                image = %handle.image(),
                "created solver job"
            );
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Snapshot of jobs, optionally restricted to one computation
    pub async fn list(&self, computation_id: Option<&str>) -> Result<Vec<JobHandle>> {
        Ok(self.list_with_token(computation_id).await?.0)
    }

    /// Snapshot plus the resumption token a watch can resume from
    pub async fn list_with_token(
        &self,
        computation_id: Option<&str>,
    ) -> Result<(Vec<JobHandle>, Option<String>)> {
        let selector = match computation_id {
            Some(id) => self.computation_selector(id),
            None => self.app_selector(),
        };
        let (jobs, token) = self.orchestrator.list(&selector).await?;
        Ok((jobs.into_iter().map(JobHandle::new).collect(), token))
    }

    /// Delete every job of a computation, returning how many were deleted.
    ///
    /// Individual delete failures are logged and skipped so one stuck job
    /// does not block reclaiming the rest.
    pub async fn delete_computation(&self, computation_id: &str) -> Result<usize> {
        let handles = self.list(Some(computation_id)).await?;
        let mut deleted = 0;
        for handle in &handles {
            match self.orchestrator.delete(handle.name()).await {
                Ok(()) => {
                    info!(job = %handle.name(), computation_id = %computation_id, "deleted job");
                    deleted += 1;
                }
                Err(e) => {
                    warn!(job = %handle.name(), error = %e, "failed to delete job");
                }
            }
        }
        Ok(deleted)
    }
}
