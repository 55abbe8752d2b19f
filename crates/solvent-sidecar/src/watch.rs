//! List-then-watch over the sidecar's own pod
//!
//! The same reconciliation shape the dispatch service uses over a job set,
//! at single-pod granularity: snapshot the pod by exact name, short-circuit
//! if the solve container already terminated, otherwise watch from the
//! snapshot's token until it does.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use solvent_common::{ChangeKind, Error, Result, SOLVER_CONTAINER_INDEX};

/// A single change delivered by the pod watch stream
pub type PodChange = (ChangeKind, Pod);

/// Snapshot and change-stream access to the sidecar's own pod
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Current state of the pod, with the snapshot's resumption token
    async fn get(&self) -> Result<(Option<Pod>, Option<String>)>;

    /// Stream pod changes, resuming exactly where the token's snapshot ended
    async fn watch_from(&self, token: &str) -> Result<BoxStream<'static, Result<PodChange>>>;
}

/// Kubernetes-backed pod source selecting the pod by exact name
pub struct KubePodSource {
    api: Api<Pod>,
    field_selector: String,
}

impl KubePodSource {
    /// Create a source for the named pod
    pub fn new(client: Client, namespace: &str, pod_name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            field_selector: format!("metadata.name={pod_name}"),
        }
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn get(&self) -> Result<(Option<Pod>, Option<String>)> {
        let params = ListParams::default().fields(&self.field_selector);
        let list = self.api.list(&params).await?;
        Ok((
            list.items.into_iter().next(),
            list.metadata.resource_version,
        ))
    }

    async fn watch_from(&self, token: &str) -> Result<BoxStream<'static, Result<PodChange>>> {
        let api = self.api.clone();
        let params = WatchParams::default().fields(&self.field_selector);
        let token = token.to_string();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let stream = match api.watch(&params, &token).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(Error::from(e))).await;
                    return;
                }
            };
            tokio::pin!(stream);

            while let Some(event) = stream.next().await {
                let item = match event {
                    Ok(WatchEvent::Added(pod)) => Some(Ok((ChangeKind::Added, pod))),
                    Ok(WatchEvent::Modified(pod)) => Some(Ok((ChangeKind::Modified, pod))),
                    Ok(WatchEvent::Deleted(pod)) => Some(Ok((ChangeKind::Deleted, pod))),
                    Ok(WatchEvent::Bookmark(_)) => None,
                    Ok(WatchEvent::Error(e)) => Some(Err(Error::from(kube::Error::Api(e)))),
                    Err(e) => Some(Err(Error::from(e))),
                };
                match item {
                    None => continue,
                    Some(Ok(change)) => {
                        if tx.send(Ok(change)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Whether the solve container has reached a terminated state
pub fn solver_terminated(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .and_then(|statuses| statuses.get(SOLVER_CONTAINER_INDEX))
        .and_then(|container| container.state.as_ref())
        .map(|state| state.terminated.is_some())
        .unwrap_or(false)
}

/// Wait until the solve container terminates and return the final pod state.
///
/// Pairs every watch with a fresh snapshot token so a termination between
/// snapshot and subscription cannot be missed.
pub async fn await_solver_termination(source: &dyn PodSource) -> Result<Pod> {
    loop {
        let (pod, token) = source.get().await?;
        if let Some(pod) = pod {
            if solver_terminated(&pod) {
                return Ok(pod);
            }
        }

        let token = token.unwrap_or_default();
        let mut changes = source.watch_from(&token).await?;
        while let Some(change) = changes.next().await {
            let (kind, pod) = change?;
            if kind == ChangeKind::Deleted {
                return Err(Error::internal_with_context(
                    "sidecar",
                    "pod deleted before the solver terminated",
                ));
            }
            if solver_terminated(&pod) {
                return Ok(pod);
            }
        }

        debug!("watch stream ended before the solver terminated, relisting");
    }
}
