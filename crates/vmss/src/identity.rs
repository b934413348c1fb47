//! Azure providerID parsing.
//!
//! AKS nodes backed by a scale set carry a providerID of the form:
//!
//! ```text
//! azure:///subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Compute/virtualMachineScaleSets/<vmss>/virtualMachines/<id>
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, VmssError};

/// Scheme prefix every Azure providerID starts with.
pub const AZURE_SCHEME: &str = "azure://";

/// VMSS coordinates of a single scale-set instance.
///
/// Only [`parse_identity`] constructs this type, so every value has all four
/// fields populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleSetCoordinates {
    subscription_id: String,
    resource_group: String,
    scale_set_name: String,
    instance_id: String,
}

impl ScaleSetCoordinates {
    /// Azure subscription ID.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Resource group holding the scale set (usually the `MC_*` node group).
    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Scale set name.
    pub fn scale_set_name(&self) -> &str {
        &self.scale_set_name
    }

    /// Instance ID within the scale set.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl fmt::Display for ScaleSetCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scale_set_name, self.instance_id)
    }
}

impl FromStr for ScaleSetCoordinates {
    type Err = VmssError;

    fn from_str(s: &str) -> Result<Self> {
        parse_identity(s)
    }
}

/// Parse an Azure providerID into scale-set coordinates.
///
/// Keys are matched case-insensitively and values are taken verbatim. Unknown
/// segments are skipped.
pub fn parse_identity(identity: &str) -> Result<ScaleSetCoordinates> {
    let invalid = || VmssError::InvalidIdentityFormat {
        identity: identity.to_string(),
    };

    let path = identity.strip_prefix(AZURE_SCHEME).ok_or_else(invalid)?;

    let segments: Vec<&str> = path.split('/').collect();
    let mut subscription_id = "";
    let mut resource_group = "";
    let mut scale_set_name = "";
    let mut instance_id = "";

    for (i, segment) in segments.iter().enumerate() {
        let Some(&value) = segments.get(i + 1) else {
            break;
        };
        match segment.to_ascii_lowercase().as_str() {
            "subscriptions" => subscription_id = value,
            "resourcegroups" => resource_group = value,
            "virtualmachinescalesets" => scale_set_name = value,
            "virtualmachines" => instance_id = value,
            _ => {}
        }
    }

    if [subscription_id, resource_group, scale_set_name, instance_id]
        .iter()
        .any(|field| field.is_empty())
    {
        return Err(invalid());
    }

    Ok(ScaleSetCoordinates {
        subscription_id: subscription_id.to_string(),
        resource_group: resource_group.to_string(),
        scale_set_name: scale_set_name.to_string(),
        instance_id: instance_id.to_string(),
    })
}
