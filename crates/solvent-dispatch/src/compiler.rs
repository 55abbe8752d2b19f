//! Compiles a solver request into a batch/v1 Job
//!
//! One job per solver, with a three-stage pod:
//! - init: fetches the model file and the optional data file into a shared
//!   emptyDir volume, substituting an empty data file when the optional
//!   fetch fails
//! - solve: runs the solver against the fetched files, stdout and stderr
//!   redirected to artifact files on the shared volume
//! - sidecar: watches the solve container and uploads the result
//!
//! Compilation is pure: no I/O, deterministic except for the generated
//! job name.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use uuid::Uuid;

use solvent_common::{
    Error, Result, DATA_FILE, ERRORS_FILE, LABEL_APP, LABEL_COMPUTATION_ID, LABEL_USER_ID,
    MODEL_FILE, SOLUTION_FILE, SRC_MOUNT_PATH,
};

/// Name of the shared ephemeral volume
const SRC_VOLUME: &str = "src-dir";

/// Image used by the fetch stage
const FETCH_IMAGE: &str = "busybox";

/// Pod failure retries before the orchestrator marks the job failed
const BACKOFF_LIMIT: i32 = 4;

/// Fetch-stage command: the data fetch may fail (the URL is optional), in
/// which case an empty placeholder file is substituted so the solve command
/// line stays fixed.
const FETCH_COMMAND: &str =
    r#"wget -O /src/model.mzn "$MODEL_URL" && ( wget -O /src/data.dzn "$DATA_URL" || touch /src/data.dzn )"#;

/// Per-solver inputs for job compilation
pub struct SolverJobParams<'a> {
    /// Solver container image
    pub image: &'a str,
    /// Shell-style option string forwarded to the solver
    pub option_string: &'a str,
    /// URL of the model file
    pub model_url: &'a str,
    /// Optional URL of the data file
    pub data_url: Option<&'a str>,
    /// CPU request in whole cores, also the solver's worker thread cap
    pub cpu_request: u32,
    /// Memory request in Mi
    pub mem_request: u32,
    /// Absolute deadline in seconds from job start
    pub timeout_seconds: i64,
    /// Labels for the job; must carry `computation_id` and `user_id`
    pub labels: BTreeMap<String, String>,
}

/// Builds Job resources for solver requests
#[derive(Clone, Debug)]
pub struct JobCompiler {
    job_prefix: String,
    sidecar_image: String,
}

impl JobCompiler {
    /// Create a compiler with the given job name prefix and sidecar image
    pub fn new(job_prefix: &str, sidecar_image: &str) -> Self {
        Self {
            job_prefix: job_prefix.to_string(),
            sidecar_image: sidecar_image.to_string(),
        }
    }

    /// Compile one solver request into a Job resource
    pub fn compile(&self, params: &SolverJobParams<'_>) -> Result<Job> {
        if params.cpu_request == 0 {
            return Err(Error::validation_for_field(
                "cpu_request",
                "must be a positive integer",
            ));
        }
        if params.mem_request == 0 {
            return Err(Error::validation_for_field(
                "mem_request",
                "must be a positive integer",
            ));
        }
        let computation_id = params
            .labels
            .get(LABEL_COMPUTATION_ID)
            .ok_or_else(|| Error::validation("job labels are missing computation_id"))?;
        let user_id = params
            .labels
            .get(LABEL_USER_ID)
            .ok_or_else(|| Error::validation("job labels are missing user_id"))?;

        let name = format!("{}-{}", self.job_prefix, Uuid::new_v4());
        let cpu = params.cpu_request.to_string();
        let mem = format!("{}Mi", params.mem_request);

        let mount = VolumeMount {
            name: SRC_VOLUME.to_string(),
            mount_path: SRC_MOUNT_PATH.to_string(),
            ..Default::default()
        };

        let quantities = BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.clone())),
            ("memory".to_string(), Quantity(mem)),
        ]);
        let solver = Container {
            name: name.clone(),
            image: Some(params.image.to_string()),
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                solve_command(params.option_string, &cpu)?,
            ]),
            resources: Some(ResourceRequirements {
                limits: Some(quantities.clone()),
                requests: Some(quantities),
                ..Default::default()
            }),
            volume_mounts: Some(vec![mount.clone()]),
            ..Default::default()
        };

        let sidecar = Container {
            name: format!("sidecar-{name}"),
            image: Some(self.sidecar_image.clone()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            env: Some(vec![
                env_var("COMPUTATION_ID", computation_id),
                env_var("USER_ID", user_id),
            ]),
            volume_mounts: Some(vec![mount.clone()]),
            ..Default::default()
        };

        let mut fetch_env = vec![env_var("MODEL_URL", params.model_url)];
        if let Some(data_url) = params.data_url {
            fetch_env.push(env_var("DATA_URL", data_url));
        }
        let fetch = Container {
            name: format!("init-{name}"),
            image: Some(FETCH_IMAGE.to_string()),
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                FETCH_COMMAND.to_string(),
            ]),
            env: Some(fetch_env),
            volume_mounts: Some(vec![mount]),
            ..Default::default()
        };

        let template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(BTreeMap::from([(LABEL_APP.to_string(), name.clone())])),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                // The solve container must stay at index 0: the job handle
                // and the sidecar both address it by position.
                containers: vec![solver, sidecar],
                init_containers: Some(vec![fetch]),
                volumes: Some(vec![Volume {
                    name: SRC_VOLUME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        Ok(Job {
            metadata: ObjectMeta {
                name: Some(name),
                labels: Some(params.labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                template,
                active_deadline_seconds: Some(params.timeout_seconds),
                backoff_limit: Some(BACKOFF_LIMIT),
                ..Default::default()
            }),
            status: None,
        })
    }
}

/// Build the solve command line.
///
/// The option string is split with shell-word semantics and every token is
/// individually re-quoted, so option values cannot smuggle in extra shell
/// syntax even though the command itself runs under `sh -c`.
fn solve_command(option_string: &str, cpu: &str) -> Result<String> {
    let tokens = shlex::split(option_string).ok_or_else(|| {
        Error::validation_for_field("solver_options", "unbalanced quoting in option string")
    })?;

    let mut argv = vec!["minizinc".to_string()];
    for token in &tokens {
        let quoted = shlex::try_quote(token).map_err(|_| {
            Error::validation_for_field("solver_options", "option string contains a NUL byte")
        })?;
        argv.push(quoted.into_owned());
    }
    argv.push("-p".to_string());
    argv.push(cpu.to_string());
    argv.push(MODEL_FILE.to_string());
    argv.push(DATA_FILE.to_string());

    Ok(format!(
        "{} > {} 2> {}",
        argv.join(" "),
        SOLUTION_FILE,
        ERRORS_FILE
    ))
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}
