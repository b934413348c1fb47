//! `kubectl`-backed cluster lookup.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::ClusterLookup;
use crate::error::{Result, VmssError};
use crate::process::{run_tool, ToolOutput};

/// Resolves cluster objects by running `kubectl get ... -o jsonpath=...`.
///
/// Authentication is whatever the local kubeconfig provides.
#[derive(Debug, Clone)]
pub struct KubectlLookup {
    kubectl_path: String,
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl Default for KubectlLookup {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlLookup {
    /// Create a lookup that runs the given `kubectl` binary.
    pub fn new(kubectl_path: impl Into<String>) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            context: None,
            kubeconfig: None,
        }
    }

    /// Pass `--context` on every invocation.
    #[must_use]
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Pass `--kubeconfig` on every invocation.
    #[must_use]
    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    fn args(&self, query: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(query.len() + 4);
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        args.extend(query.iter().map(ToString::to_string));
        args
    }

    /// Run a query; `Err` holds a reason suitable for the caller's error.
    async fn query(&self, query: &[&str]) -> std::result::Result<String, String> {
        debug!(kubectl = %self.kubectl_path, args = ?query, "Running kubectl");
        let output: ToolOutput = run_tool(&self.kubectl_path, self.args(query))
            .await
            .map_err(|e| format!("failed to execute {}: {e}", self.kubectl_path))?;

        if output.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(output.diagnostic())
        }
    }
}

#[async_trait]
impl ClusterLookup for KubectlLookup {
    async fn resolve_node_from_pod(&self, namespace: &str, pod: &str) -> Result<String> {
        let node = self
            .query(&[
                "get",
                "pod",
                pod,
                "-n",
                namespace,
                "-o",
                "jsonpath={.spec.nodeName}",
            ])
            .await
            .map_err(|reason| VmssError::node_resolution(namespace, pod, reason))?;

        if node.is_empty() {
            return Err(VmssError::node_resolution(
                namespace,
                pod,
                "pod has no node assigned",
            ));
        }
        Ok(node)
    }

    async fn resolve_container_name(&self, namespace: &str, pod: &str) -> Result<String> {
        let container = self
            .query(&[
                "get",
                "pod",
                pod,
                "-n",
                namespace,
                "-o",
                "jsonpath={.spec.containers[0].name}",
            ])
            .await
            .map_err(|reason| VmssError::container_resolution(namespace, pod, reason))?;

        if container.is_empty() {
            return Err(VmssError::container_resolution(
                namespace,
                pod,
                "pod spec has no containers",
            ));
        }
        Ok(container)
    }

    async fn fetch_node_identity(&self, node: &str) -> Result<String> {
        self.query(&["get", "node", node, "-o", "jsonpath={.spec.providerID}"])
            .await
            .map_err(|reason| VmssError::identity_fetch(node, reason))
    }
}
