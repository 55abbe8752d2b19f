//! Read-view over one orchestrator job resource

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Container;

use solvent_common::models::{Solver, SolverStatus};
use solvent_common::SOLVER_CONTAINER_INDEX;

/// Three-way state derived from a job's outcome counters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// No terminal counter is positive yet
    Active,
    /// At least one pod succeeded
    Succeeded,
    /// At least one pod failed and none succeeded
    Failed,
}

/// Wrapper deriving solver identity, resource requests, and state from a raw Job
#[derive(Clone, Debug)]
pub struct JobHandle {
    job: Job,
}

impl JobHandle {
    /// Wrap a job resource
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// The job's unique name
    pub fn name(&self) -> &str {
        self.job.metadata.name.as_deref().unwrap_or_default()
    }

    fn solve_container(&self) -> Option<&Container> {
        self.job
            .spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .containers
            .get(SOLVER_CONTAINER_INDEX)
    }

    /// Image of the solve container
    pub fn image(&self) -> &str {
        self.solve_container()
            .and_then(|c| c.image.as_deref())
            .unwrap_or_default()
    }

    /// CPU request of the solve container, in whole cores
    pub fn cpu_request(&self) -> u32 {
        self.request_quantity("cpu")
            .and_then(|q| q.parse().ok())
            .unwrap_or(0)
    }

    /// Memory request of the solve container, in Mi
    pub fn mem_request(&self) -> u32 {
        self.request_quantity("memory")
            .map(|q| q.strip_suffix("Mi").unwrap_or(q))
            .and_then(|q| q.parse().ok())
            .unwrap_or(0)
    }

    fn request_quantity(&self, resource: &str) -> Option<&str> {
        self.solve_container()?
            .resources
            .as_ref()?
            .requests
            .as_ref()?
            .get(resource)
            .map(|quantity| quantity.0.as_str())
    }

    /// Number of actively running pods (0 when status is absent)
    pub fn active(&self) -> i32 {
        self.counter(|s| s.active)
    }

    /// Number of succeeded pods (0 when status is absent)
    pub fn succeeded(&self) -> i32 {
        self.counter(|s| s.succeeded)
    }

    /// Number of failed pods (0 when status is absent)
    pub fn failed(&self) -> i32 {
        self.counter(|s| s.failed)
    }

    fn counter(&self, pick: impl Fn(&k8s_openapi::api::batch::v1::JobStatus) -> Option<i32>) -> i32 {
        self.job.status.as_ref().and_then(pick).unwrap_or(0)
    }

    /// Derive the job's three-way state from its counters
    pub fn state(&self) -> JobState {
        if self.succeeded() > 0 {
            JobState::Succeeded
        } else if self.failed() > 0 {
            JobState::Failed
        } else {
            JobState::Active
        }
    }

    /// Render the job as the per-solver wire model
    pub fn solver(&self) -> Solver {
        Solver {
            image: self.image().to_string(),
            cpu_request: self.cpu_request(),
            mem_request: self.mem_request(),
            status: Some(SolverStatus {
                active: self.active(),
                failed: self.failed(),
                succeeded: self.succeeded(),
            }),
        }
    }
}
