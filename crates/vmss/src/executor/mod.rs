//! Remote command execution on scale-set instances.

mod az;

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::ScaleSetCoordinates;

pub use az::AzCliExecutor;

/// Runs a shell script on a single VMSS instance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Invoke the script and return the raw run-command envelope.
    ///
    /// Fails with `RemoteExecution` if the invocation itself fails.
    async fn invoke(&self, coordinates: &ScaleSetCoordinates, script: &str) -> Result<String>;
}
