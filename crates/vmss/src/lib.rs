//! Out-of-band diagnostics for AKS nodes via Azure VMSS run-command.
//!
//! When the API server cannot reach a node, or the workload on it is
//! crash-looping, `kubectl exec` is no help. This crate resolves the scale-set
//! instance behind a node or pod and runs shell scripts on it through
//! `az vmss run-command invoke`:
//!
//! 1. **Lookup** - pod → node → `spec.providerID` ([`lookup`])
//! 2. **Identity** - providerID → [`ScaleSetCoordinates`] ([`identity`])
//! 3. **Execute** - run-command invocation ([`executor`])
//! 4. **Decode** - JSON envelope → [`CommandResult`] ([`envelope`])
//!
//! [`Orchestrator`] composes the stages; backends are injected.

pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod identity;
pub mod lookup;
pub mod orchestrator;
mod process;
pub mod scripts;

pub use config::{Config, LookupBackend};
pub use envelope::{decode_envelope, decode_message, CommandResult, MarkerStrategy};
pub use error::{Result, Stage, VmssError};
pub use executor::{AzCliExecutor, RemoteExecutor};
pub use identity::{parse_identity, ScaleSetCoordinates};
pub use lookup::{ClusterLookup, KubeApiLookup, KubectlLookup};
pub use orchestrator::{Orchestrator, Resolution, Target};
