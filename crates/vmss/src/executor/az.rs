//! `az vmss run-command` executor.

use async_trait::async_trait;
use tracing::{debug, info};

use super::RemoteExecutor;
use crate::error::{Result, VmssError};
use crate::identity::ScaleSetCoordinates;
use crate::process::run_tool;

/// Built-in run-command for Linux instances.
const RUN_SHELL_SCRIPT: &str = "RunShellScript";

/// Invokes scripts through the Azure CLI.
///
/// Credentials come from the CLI's own login state.
#[derive(Debug, Clone)]
pub struct AzCliExecutor {
    az_path: String,
}

impl Default for AzCliExecutor {
    fn default() -> Self {
        Self::new("az")
    }
}

impl AzCliExecutor {
    /// Create an executor that runs the given `az` binary.
    pub fn new(az_path: impl Into<String>) -> Self {
        Self {
            az_path: az_path.into(),
        }
    }

    fn args(coordinates: &ScaleSetCoordinates, script: &str) -> Vec<String> {
        [
            "vmss",
            "run-command",
            "invoke",
            "-g",
            coordinates.resource_group(),
            "-n",
            coordinates.scale_set_name(),
            "--instance-id",
            coordinates.instance_id(),
            "--command-id",
            RUN_SHELL_SCRIPT,
            "--scripts",
            script,
            "--subscription",
            coordinates.subscription_id(),
            "-o",
            "json",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }
}

#[async_trait]
impl RemoteExecutor for AzCliExecutor {
    async fn invoke(&self, coordinates: &ScaleSetCoordinates, script: &str) -> Result<String> {
        info!(
            vmss = %coordinates.scale_set_name(),
            instance = %coordinates.instance_id(),
            "Invoking run-command"
        );
        debug!(script = %script, "Run-command script");

        let output = run_tool(&self.az_path, Self::args(coordinates, script))
            .await
            .map_err(|e| VmssError::RemoteExecution {
                diagnostic: format!("failed to execute {}: {e}", self.az_path),
            })?;

        if !output.success() {
            return Err(VmssError::RemoteExecution {
                diagnostic: output.diagnostic(),
            });
        }

        Ok(output.stdout)
    }
}
