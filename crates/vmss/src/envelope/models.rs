//! Run-command response models.

use serde::{Deserialize, Serialize};

// ============================================================================
// Run-command envelope
// ============================================================================

/// Response of `az vmss run-command invoke -o json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunCommandResponse {
    /// Status entries, normally exactly one.
    pub value: Vec<InstanceViewStatus>,
}

/// Wire shape used for decoding.
///
/// Entries stay untyped so that only the first one has to be a valid
/// [`InstanceViewStatus`]; the rest are never inspected.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRunCommandResponse {
    pub value: Vec<serde_json::Value>,
}

/// A single run-command status entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceViewStatus {
    /// Status code, e.g. `ProvisioningState/succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Status level (`Info`, `Warning`, `Error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Human readable status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_status: Option<String>,
    /// Status report embedding the script's stdout and stderr.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl RunCommandResponse {
    /// Build a single-entry response carrying `message`.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            value: vec![InstanceViewStatus {
                code: None,
                level: None,
                display_status: None,
                message: message.into(),
                time: None,
            }],
        }
    }
}
