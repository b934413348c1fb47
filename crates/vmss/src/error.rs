//! Error taxonomy for node resolution and remote execution.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = VmssError> = std::result::Result<T, E>;

/// Pipeline stage that performs an external call.
///
/// Carried by [`VmssError::Cancelled`] so callers can tell which round-trip
/// was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Pod → node lookup.
    ResolveNode,
    /// Pod → container name lookup.
    ResolveContainer,
    /// Node → provider identity lookup.
    FetchIdentity,
    /// Remote run-command invocation.
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveNode => write!(f, "resolve-node"),
            Self::ResolveContainer => write!(f, "resolve-container"),
            Self::FetchIdentity => write!(f, "fetch-identity"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Errors that can occur while resolving a node and running a command on it.
///
/// Every variant is terminal for the orchestration call that produced it.
#[derive(Error, Debug)]
pub enum VmssError {
    /// The node's provider identity is not an Azure VMSS instance.
    #[error("could not parse VMSS info from providerID: {identity:?}")]
    InvalidIdentityFormat { identity: String },

    /// The pod could not be found or is not scheduled.
    #[error("could not resolve node for pod {namespace}/{pod}: {reason}")]
    NodeResolution {
        namespace: String,
        pod: String,
        reason: String,
    },

    /// The pod's container name could not be determined.
    #[error("could not get container name for pod {namespace}/{pod}: {reason}")]
    ContainerResolution {
        namespace: String,
        pod: String,
        reason: String,
    },

    /// The node (or its providerID) could not be fetched.
    #[error("could not get providerID for node {node}: {reason}")]
    IdentityFetch { node: String, reason: String },

    /// The run-command invocation itself failed.
    #[error("az vmss run-command failed: {diagnostic}")]
    RemoteExecution { diagnostic: String },

    /// The run-command output was not the expected JSON envelope.
    #[error("failed to parse run-command JSON output: {source}\nRaw: {raw}")]
    EnvelopeParse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope held no status entries.
    #[error("run-command returned no output")]
    EmptyResult,

    /// The call was cancelled or timed out while waiting on an external call.
    #[error("operation cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl VmssError {
    pub(crate) fn node_resolution(namespace: &str, pod: &str, reason: impl Into<String>) -> Self {
        Self::NodeResolution {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn container_resolution(
        namespace: &str,
        pod: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::ContainerResolution {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn identity_fetch(node: &str, reason: impl Into<String>) -> Self {
        Self::IdentityFetch {
            node: node.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from cancellation or a call timeout.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
