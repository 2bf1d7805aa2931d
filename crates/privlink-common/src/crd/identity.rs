//! AzureClusterIdentity resource
//!
//! Describes how a cluster authenticates against Azure. Only the identity
//! kinds the operator can turn into credentials are modelled explicitly.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::ExtraFields;

/// Specification of an AzureClusterIdentity
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureClusterIdentity",
    plural = "azureclusteridentities",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterIdentitySpec {
    /// How the identity authenticates
    #[serde(rename = "type")]
    pub identity_type: IdentityType,

    /// Client ID of the managed identity or service principal
    #[serde(default, rename = "clientID")]
    pub client_id: String,

    /// Azure AD tenant
    #[serde(default, rename = "tenantID")]
    pub tenant_id: String,

    /// Secret holding the service principal's client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SecretReference>,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Identity kind
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum IdentityType {
    /// User-assigned managed identity, token from the instance metadata service
    #[default]
    #[serde(rename = "UserAssignedMSI")]
    UserAssignedMsi,
    /// Service principal with a client secret
    ManualServicePrincipal,
    /// Federated workload identity, token exchanged for a projected service account token
    WorkloadIdentity,
    /// Any other kind (certificates, system-assigned identities, ...)
    #[serde(untagged)]
    Other(String),
}

/// Reference to a Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SecretReference {
    /// Secret name
    #[serde(default)]
    pub name: String,

    /// Secret namespace
    #[serde(default)]
    pub namespace: String,
}
