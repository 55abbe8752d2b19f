//! Thin facade over the Kubernetes batch API
//!
//! The dispatcher and the computation watcher need exactly four capabilities
//! from the cluster: create a job, list jobs (yielding a resumption token),
//! watch jobs resuming from that token, and delete a job. Hiding them behind
//! a trait keeps the reconciliation logic testable without an API server.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use solvent_common::{ChangeKind, Error, Result};

/// A single change delivered by a job watch stream
pub type JobChange = (ChangeKind, Job);

/// The four cluster capabilities the core depends on
///
/// Every call can fail transiently; callers must not assume success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create a job and return it as stored by the cluster
    async fn create(&self, job: Job) -> Result<Job>;

    /// List jobs matching a label selector, with the snapshot's resumption token
    async fn list(&self, label_selector: &str) -> Result<(Vec<Job>, Option<String>)>;

    /// Stream job changes, resuming exactly where the given token's snapshot ended
    async fn watch_from(
        &self,
        label_selector: &str,
        token: &str,
    ) -> Result<BoxStream<'static, Result<JobChange>>>;

    /// Delete a job; deleting a job that is already gone counts as success
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Kubernetes-backed orchestrator over a namespaced batch/v1 Job API
pub struct KubeOrchestrator {
    api: Api<Job>,
}

impl KubeOrchestrator {
    /// Create an orchestrator for the given namespace
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn create(&self, job: Job) -> Result<Job> {
        Ok(self.api.create(&PostParams::default(), &job).await?)
    }

    async fn list(&self, label_selector: &str) -> Result<(Vec<Job>, Option<String>)> {
        let params = ListParams::default().labels(label_selector);
        let list = self.api.list(&params).await?;
        Ok((list.items, list.metadata.resource_version))
    }

    async fn watch_from(
        &self,
        label_selector: &str,
        token: &str,
    ) -> Result<BoxStream<'static, Result<JobChange>>> {
        let api = self.api.clone();
        let params = WatchParams::default().labels(label_selector);
        let token = token.to_string();
        let (tx, rx) = mpsc::channel(16);

        // The raw watch stream borrows the API handle, so drive it from its
        // own task and forward changes over a channel. Dropping the receiver
        // ends the task and with it the server-side watch.
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
                    Ok(WatchEvent::Added(job)) => Some(Ok((ChangeKind::Added, job))),
                    Ok(WatchEvent::Modified(job)) => Some(Ok((ChangeKind::Modified, job))),
                    Ok(WatchEvent::Deleted(job)) => Some(Ok((ChangeKind::Deleted, job))),
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

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(job = %name, "job already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
