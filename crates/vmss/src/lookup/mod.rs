//! Cluster lookups: pod → node, pod → container, node → providerID.
//!
//! Two backends implement [`ClusterLookup`]:
//!
//! - [`KubectlLookup`] shells out to `kubectl` with jsonpath queries.
//! - [`KubeApiLookup`] talks to the API server through a `kube` client.

mod kube_api;
mod kubectl;

use async_trait::async_trait;

use crate::error::Result;

pub use kube_api::KubeApiLookup;
pub use kubectl::KubectlLookup;

/// Read-only queries against the Kubernetes control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterLookup: Send + Sync {
    /// Name of the node the pod is scheduled on.
    ///
    /// Fails with `NodeResolution` if the pod is missing or unscheduled.
    async fn resolve_node_from_pod(&self, namespace: &str, pod: &str) -> Result<String>;

    /// Name of the first container in the pod spec.
    async fn resolve_container_name(&self, namespace: &str, pod: &str) -> Result<String>;

    /// The node's `spec.providerID`, possibly empty.
    ///
    /// Fails with `IdentityFetch` if the node cannot be read.
    async fn fetch_node_identity(&self, node: &str) -> Result<String>;
}
