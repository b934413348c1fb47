//! Runtime configuration and backend construction.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::AzCliExecutor;
use crate::lookup::{KubeApiLookup, KubectlLookup};
use crate::orchestrator::Orchestrator;

/// Environment variable overriding the `kubectl` binary.
pub const ENV_KUBECTL: &str = "KUBECTL_VMSS_KUBECTL";
/// Environment variable overriding the `az` binary.
pub const ENV_AZ: &str = "KUBECTL_VMSS_AZ";
/// Environment variable selecting the lookup backend (`kubectl` or `api`).
pub const ENV_LOOKUP: &str = "KUBECTL_VMSS_LOOKUP";
/// Environment variable holding the per-call timeout in seconds.
pub const ENV_TIMEOUT: &str = "KUBECTL_VMSS_TIMEOUT";

/// How cluster objects are looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LookupBackend {
    /// Shell out to `kubectl`.
    #[default]
    Kubectl,
    /// Query the API server with a built-in client.
    Api,
}

impl std::str::FromStr for LookupBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kubectl" => Ok(Self::Kubectl),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown lookup backend: {other} (expected kubectl or api)")),
        }
    }
}

/// Settings for building an [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `kubectl` binary.
    pub kubectl_path: String,
    /// `az` binary.
    pub az_path: String,
    /// Lookup backend.
    pub lookup: LookupBackend,
    /// kubeconfig context to use.
    pub kube_context: Option<String>,
    /// kubeconfig file to use.
    pub kubeconfig: Option<PathBuf>,
    /// Timeout for each external call, in seconds.
    pub call_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubectl_path: "kubectl".to_string(),
            az_path: "az".to_string(),
            lookup: LookupBackend::default(),
            kube_context: None,
            kubeconfig: None,
            call_timeout_secs: None,
        }
    }
}

impl Config {
    /// Defaults overridden by `KUBECTL_VMSS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENV_KUBECTL) {
            config.kubectl_path = path;
        }
        if let Ok(path) = std::env::var(ENV_AZ) {
            config.az_path = path;
        }
        if let Ok(lookup) = std::env::var(ENV_LOOKUP) {
            config.lookup = lookup
                .parse::<LookupBackend>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid {ENV_LOOKUP}"))?;
        }
        if let Ok(secs) = std::env::var(ENV_TIMEOUT) {
            config.call_timeout_secs = Some(
                secs.trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid {ENV_TIMEOUT}: {secs}"))?,
            );
        }

        Ok(config)
    }

    /// Per-call timeout, if configured. Zero disables it.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Build the lookup and executor backends and wire them together.
    pub async fn build_orchestrator(&self) -> Result<Orchestrator> {
        debug!(config = ?self, "Building orchestrator");
        let executor = AzCliExecutor::new(self.az_path.clone());

        let orchestrator = match self.lookup {
            LookupBackend::Kubectl => {
                let lookup = KubectlLookup::new(self.kubectl_path.clone())
                    .with_context(self.kube_context.clone())
                    .with_kubeconfig(self.kubeconfig.clone());
                Orchestrator::new(lookup, executor)
            }
            LookupBackend::Api => {
                let lookup = KubeApiLookup::connect(
                    self.kube_context.as_deref(),
                    self.kubeconfig.as_deref(),
                )
                .await
                .context("Failed to connect to the Kubernetes API")?;
                Orchestrator::new(lookup, executor)
            }
        };

        Ok(orchestrator.with_call_timeout(self.call_timeout()))
    }
}
