//! Resolve-then-execute pipeline.
//!
//! ```text
//! Target ──► [pod → node] ──► node → providerID ──► ScaleSetCoordinates
//!                                                        │
//!                  CommandResult ◄── decode ◄── run-command invoke
//! ```
//!
//! Every stage short-circuits on the first error. The two external calls
//! race against a [`CancellationToken`] and an optional per-call timeout.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::envelope::{decode_envelope, CommandResult};
use crate::error::{Result, Stage, VmssError};
use crate::executor::RemoteExecutor;
use crate::identity::{parse_identity, ScaleSetCoordinates};
use crate::lookup::ClusterLookup;

/// What to run a command against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A node by name.
    Node(String),
    /// The node a pod is scheduled on.
    Pod { namespace: String, pod: String },
}

impl Target {
    /// Target a node directly.
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// Target the node hosting `namespace/pod`.
    pub fn pod(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self::Pod {
            namespace: namespace.into(),
            pod: pod.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(name) => write!(f, "node/{name}"),
            Self::Pod { namespace, pod } => write!(f, "pod/{namespace}/{pod}"),
        }
    }
}

/// A node together with the scale-set instance backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub node: String,
    pub coordinates: ScaleSetCoordinates,
}

/// Composes a [`ClusterLookup`] and a [`RemoteExecutor`].
///
/// Holds no per-call state, so one instance can serve many concurrent calls.
#[derive(Clone)]
pub struct Orchestrator {
    lookup: Arc<dyn ClusterLookup>,
    executor: Arc<dyn RemoteExecutor>,
    call_timeout: Option<Duration>,
}

impl Orchestrator {
    /// Create an orchestrator over the given backends.
    pub fn new(
        lookup: impl ClusterLookup + 'static,
        executor: impl RemoteExecutor + 'static,
    ) -> Self {
        Self {
            lookup: Arc::new(lookup),
            executor: Arc::new(executor),
            call_timeout: None,
        }
    }

    /// Bound each external call; an expired call fails as `Cancelled`.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run `call` unless `cancel` fires or the call timeout expires first.
    async fn guarded<T, F>(&self, stage: Stage, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(VmssError::Cancelled { stage });
        }

        let bounded = async {
            match self.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(stage = %stage, timeout_secs = limit.as_secs(), "External call timed out");
                        Err(VmssError::Cancelled { stage })
                    }
                },
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(VmssError::Cancelled { stage }),
            result = bounded => result,
        }
    }

    /// Resolve a target to its node and scale-set coordinates.
    pub async fn resolve(&self, target: &Target, cancel: &CancellationToken) -> Result<Resolution> {
        let node = match target {
            Target::Node(name) => name.clone(),
            Target::Pod { namespace, pod } => {
                let node = self
                    .guarded(
                        Stage::ResolveNode,
                        cancel,
                        self.lookup.resolve_node_from_pod(namespace, pod),
                    )
                    .await?;
                info!(namespace = %namespace, pod = %pod, node = %node, "Resolved pod to node");
                node
            }
        };

        info!(node = %node, "Resolving VMSS info from node");
        let identity = self
            .guarded(
                Stage::FetchIdentity,
                cancel,
                self.lookup.fetch_node_identity(&node),
            )
            .await?;
        let coordinates = parse_identity(identity.trim())?;

        info!(
            subscription = %coordinates.subscription_id(),
            resource_group = %coordinates.resource_group(),
            vmss = %coordinates.scale_set_name(),
            instance = %coordinates.instance_id(),
            "Resolved VMSS instance"
        );

        Ok(Resolution { node, coordinates })
    }

    /// Name of the pod's first container.
    pub async fn resolve_container(
        &self,
        namespace: &str,
        pod: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.guarded(
            Stage::ResolveContainer,
            cancel,
            self.lookup.resolve_container_name(namespace, pod),
        )
        .await
    }

    /// Run `script` on already-resolved coordinates and decode the output.
    pub async fn execute(
        &self,
        coordinates: &ScaleSetCoordinates,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<CommandResult> {
        info!(instance = %coordinates, "Running on instance");
        let raw = self
            .guarded(
                Stage::Execute,
                cancel,
                self.executor.invoke(coordinates, script),
            )
            .await?;
        decode_envelope(&raw)
    }

    /// Run `script` on the node backing `target`.
    pub async fn run(
        &self,
        target: &Target,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<CommandResult> {
        let resolution = self.resolve(target, cancel).await?;
        self.execute(&resolution.coordinates, script, cancel).await
    }

    /// Run `script` against each target concurrently.
    ///
    /// Results come back in input order; one failure does not affect others.
    pub async fn run_batch(
        &self,
        targets: &[Target],
        script: &str,
        cancel: &CancellationToken,
    ) -> Vec<(Target, Result<CommandResult>)> {
        let runs = targets.iter().map(|target| async move {
            let result = self.run(target, script, cancel).await;
            (target.clone(), result)
        });
        join_all(runs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockRemoteExecutor;
    use crate::lookup::MockClusterLookup;

    const PROVIDER_ID: &str = "azure:///subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/MC_my-rg_my-aks_eastus/providers/Microsoft.Compute/virtualMachineScaleSets/aks-nodepool1-12345678-vmss/virtualMachines/0";
    const NODE: &str = "aks-nodepool1-12345678-vmss000000";

    fn envelope(stdout: &str, stderr: &str) -> String {
        format!(
            r#"{{"value":[{{"message":"Enable succeeded: \n[stdout]\n{stdout}\n[stderr]\n{stderr}"}}]}}"#
        )
    }

    #[tokio::test]
    async fn test_run_on_pod_resolves_node_then_executes() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_resolve_node_from_pod()
            .withf(|namespace, pod| namespace == "kube-system" && pod == "cilium-6jnvz")
            .times(1)
            .returning(|_, _| Ok(NODE.to_string()));
        lookup
            .expect_fetch_node_identity()
            .withf(|node| node == NODE)
            .times(1)
            .returning(|_| Ok(format!("{PROVIDER_ID}\n")));

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_invoke()
            .withf(|coords, script| {
                coords.scale_set_name() == "aks-nodepool1-12345678-vmss"
                    && coords.instance_id() == "0"
                    && script == "uname -a"
            })
            .times(1)
            .returning(|_, _| Ok(envelope("Linux", "")));

        let orchestrator = Orchestrator::new(lookup, executor);
        let result = orchestrator
            .run(
                &Target::pod("kube-system", "cilium-6jnvz"),
                "uname -a",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.stdout, "Linux");
        assert_eq!(result.stderr, "");
    }

    #[tokio::test]
    async fn test_node_resolution_failure_skips_executor() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_resolve_node_from_pod()
            .returning(|namespace, pod| {
                Err(VmssError::node_resolution(namespace, pod, "pods \"p\" not found"))
            });
        lookup.expect_fetch_node_identity().never();

        let mut executor = MockRemoteExecutor::new();
        executor.expect_invoke().never();

        let err = Orchestrator::new(lookup, executor)
            .run(&Target::pod("kube-system", "p"), "true", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            VmssError::NodeResolution { namespace, pod, .. } => {
                assert_eq!(namespace, "kube-system");
                assert_eq!(pod, "p");
            }
            other => panic!("expected NodeResolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_azure_node_is_invalid_identity() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_fetch_node_identity()
            .returning(|_| Ok("aws:///us-east-1/i-12345".to_string()));

        let mut executor = MockRemoteExecutor::new();
        executor.expect_invoke().never();

        let err = Orchestrator::new(lookup, executor)
            .run(&Target::node("ip-10-0-0-1"), "true", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VmssError::InvalidIdentityFormat { .. }));
    }

    #[tokio::test]
    async fn test_remote_failure_is_surfaced() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_fetch_node_identity()
            .returning(|_| Ok(PROVIDER_ID.to_string()));

        let mut executor = MockRemoteExecutor::new();
        executor.expect_invoke().returning(|_, _| {
            Err(VmssError::RemoteExecution {
                diagnostic: "exit status: 1\nOutput: ERROR: Conflict".to_string(),
            })
        });

        let err = Orchestrator::new(lookup, executor)
            .run(&Target::node(NODE), "true", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERROR: Conflict"));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_parse_error() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_fetch_node_identity()
            .returning(|_| Ok(PROVIDER_ID.to_string()));

        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_invoke()
            .returning(|_, _| Ok("WARNING: not json".to_string()));

        let err = Orchestrator::new(lookup, executor)
            .run(&Target::node(NODE), "true", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VmssError::EnvelopeParse { ref raw, .. } if raw == "WARNING: not json"));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_lookup() {
        let mut lookup = MockClusterLookup::new();
        lookup.expect_resolve_node_from_pod().never();
        let mut executor = MockRemoteExecutor::new();
        executor.expect_invoke().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Orchestrator::new(lookup, executor)
            .run(&Target::pod("default", "web-0"), "true", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VmssError::Cancelled {
                stage: Stage::ResolveNode
            }
        ));
    }

    #[tokio::test]
    async fn test_resolve_container_delegates() {
        let mut lookup = MockClusterLookup::new();
        lookup
            .expect_resolve_container_name()
            .withf(|namespace, pod| namespace == "kube-system" && pod == "coredns-abc")
            .returning(|_, _| Ok("coredns".to_string()));

        let container = Orchestrator::new(lookup, MockRemoteExecutor::new())
            .resolve_container("kube-system", "coredns-abc", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(container, "coredns");
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::node("n1").to_string(), "node/n1");
        assert_eq!(
            Target::pod("kube-system", "p").to_string(),
            "pod/kube-system/p"
        );
    }
}
