//! Cluster lookup through the Kubernetes API.

use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client as KubeClient, Config as KubeConfig,
};
use tracing::debug;

use super::ClusterLookup;
use crate::error::{Result, VmssError};

/// Resolves cluster objects with direct `GET`s against the API server.
#[derive(Clone)]
pub struct KubeApiLookup {
    client: KubeClient,
}

impl KubeApiLookup {
    /// Wrap an existing client.
    pub fn new(client: KubeClient) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig file and/or context, falling back to
    /// the inferred configuration (in-cluster or `$KUBECONFIG`).
    pub async fn connect(context: Option<&str>, kubeconfig: Option<&Path>) -> AnyResult<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..KubeConfigOptions::default()
        };

        let config = match (kubeconfig, context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                KubeConfig::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .context("Failed to load kubeconfig")?
            }
            (None, Some(_)) => KubeConfig::from_kubeconfig(&options)
                .await
                .context("Failed to load kubeconfig context")?,
            (None, None) => KubeConfig::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?,
        };

        let client = KubeClient::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    async fn get_pod(&self, namespace: &str, pod: &str) -> std::result::Result<Pod, String> {
        debug!(namespace = %namespace, pod = %pod, "GET pod");
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.get(pod).await.map_err(|e| e.to_string())
    }
}

/// Scheduled node of a pod, if any.
fn node_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_deref())
        .filter(|name| !name.is_empty())
}

fn first_container(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .map(|container| container.name.as_str())
}

fn provider_id(node: &Node) -> &str {
    node.spec
        .as_ref()
        .and_then(|spec| spec.provider_id.as_deref())
        .unwrap_or_default()
}

#[async_trait]
impl ClusterLookup for KubeApiLookup {
    async fn resolve_node_from_pod(&self, namespace: &str, pod: &str) -> Result<String> {
        let object = self
            .get_pod(namespace, pod)
            .await
            .map_err(|reason| VmssError::node_resolution(namespace, pod, reason))?;

        node_name(&object).map(str::to_string).ok_or_else(|| {
            VmssError::node_resolution(namespace, pod, "pod has no node assigned")
        })
    }

    async fn resolve_container_name(&self, namespace: &str, pod: &str) -> Result<String> {
        let object = self
            .get_pod(namespace, pod)
            .await
            .map_err(|reason| VmssError::container_resolution(namespace, pod, reason))?;

        first_container(&object).map(str::to_string).ok_or_else(|| {
            VmssError::container_resolution(namespace, pod, "pod spec has no containers")
        })
    }

    async fn fetch_node_identity(&self, node: &str) -> Result<String> {
        debug!(node = %node, "GET node");
        let nodes: Api<Node> = Api::all(self.client.clone());
        let object = nodes
            .get(node)
            .await
            .map_err(|e| VmssError::identity_fetch(node, e.to_string()))?;
        Ok(provider_id(&object).to_string())
    }
}
