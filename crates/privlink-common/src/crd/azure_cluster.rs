//! AzureCluster (Cluster API Provider Azure) resource
//!
//! An AzureCluster is both a private-link publisher (API server load balancer
//! private links) and a private-endpoint host (endpoints declared on its
//! subnets). The management cluster and every workload cluster have one.

use std::fmt;

use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

use super::ExtraFields;

/// Subnet role whose address space hosts private endpoints
pub const SUBNET_ROLE_NODE: &str = "node";

/// Specification of an AzureCluster (fields used by the operator)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureCluster",
    plural = "azureclusters",
    namespaced,
    status = "AzureClusterStatus",
    derive = "Default",
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterSpec {
    /// Azure subscription the cluster's resources live in
    #[serde(default, rename = "subscriptionID")]
    pub subscription_id: String,

    /// Azure region
    #[serde(default)]
    pub location: String,

    /// Resource group holding the cluster's resources
    #[serde(default)]
    pub resource_group: String,

    /// Reference to the AzureClusterIdentity used to talk to Azure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<ObjectReference>,

    /// Network configuration
    #[serde(default)]
    pub network_spec: NetworkSpec,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Reference to another namespaced object
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ObjectReference {
    /// Object name
    #[serde(default)]
    pub name: String,

    /// Object namespace
    #[serde(default)]
    pub namespace: String,

    /// Fields not modelled by the operator (kind, apiVersion, ...)
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Cluster network configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// API server load balancer
    #[serde(default, rename = "apiServerLB", skip_serializing_if = "Option::is_none")]
    pub api_server_lb: Option<LoadBalancerSpec>,

    /// Subnets of the cluster's virtual network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubnetSpec>,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Load balancer configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    /// Load balancer type (`Public` or `Internal`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub lb_type: Option<String>,

    /// Private links published in front of this load balancer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_links: Vec<PrivateLink>,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Parsed API server load balancer type
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadBalancerType {
    /// Internet-facing load balancer
    Public,
    /// Private (VNet internal) load balancer
    Internal,
    /// Any value this operator does not understand
    Other(String),
}

impl LoadBalancerType {
    /// Parse a load balancer type; an unset type is the provider default (`Public`)
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("") | Some("Public") => Self::Public,
            Some("Internal") => Self::Internal,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LoadBalancerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "Public"),
            Self::Internal => write!(f, "Internal"),
            Self::Other(other) => write!(f, "{}", other),
        }
    }
}

/// A private link published by a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLink {
    /// Link name, unique within the cluster's resource group
    pub name: String,

    /// Subscriptions allowed to connect to this link
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_subscriptions: Vec<String>,

    /// Subscriptions whose connections are approved without a manual step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_approved_subscriptions: Vec<String>,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl PrivateLink {
    /// Whether `subscription_id` may connect to this link
    pub fn allows(&self, subscription_id: &str) -> bool {
        self.allowed_subscriptions.iter().any(|s| s == subscription_id)
    }

    /// Whether connections from `subscription_id` are approved automatically
    pub fn auto_approves(&self, subscription_id: &str) -> bool {
        self.auto_approved_subscriptions
            .iter()
            .any(|s| s == subscription_id)
    }
}

/// A subnet of the cluster's virtual network
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Subnet name
    #[serde(default)]
    pub name: String,

    /// Subnet role (`node`, `control-plane`, `bastion`, `cluster`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Private endpoints allocated from this subnet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_endpoints: Vec<PrivateEndpointSpec>,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl SubnetSpec {
    /// Whether the subnet has the given role
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// A declared private endpoint
///
/// Identity for reconciliation is the name alone.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointSpec {
    /// Endpoint name
    pub name: String,

    /// Azure region of the endpoint
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,

    /// Connections to private links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_link_service_connections: Vec<PrivateLinkServiceConnection>,

    /// Whether connections need manual approval on the link side
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manual_approval: bool,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// A connection from a private endpoint to a private link
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLinkServiceConnection {
    /// Connection name
    #[serde(default)]
    pub name: String,

    /// Fully-qualified resource identifier of the target private link
    #[serde(default, rename = "privateLinkServiceID")]
    pub private_link_service_id: String,

    /// Justification shown to whoever approves the connection
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_message: String,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Observed state of an AzureCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterStatus {
    /// Cluster API conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,

    /// Fields not modelled by the operator
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    #[serde(other)]
    Unknown,
}

/// Cluster API condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Condition status
    #[serde(default)]
    pub status: ConditionStatus,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Fields not modelled by the operator (severity, lastTransitionTime)
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ClusterCondition {
    /// Create a condition with the given type and status
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            ..Default::default()
        }
    }
}

/// Namespace and name of a namespaced object
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl AzureCluster {
    /// Namespace and name of this cluster
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Type of the API server load balancer
    pub fn api_server_lb_type(&self) -> LoadBalancerType {
        LoadBalancerType::parse(
            self.spec
                .network_spec
                .api_server_lb
                .as_ref()
                .and_then(|lb| lb.lb_type.as_deref()),
        )
    }

    /// Private links declared on the API server load balancer
    pub fn private_links(&self) -> &[PrivateLink] {
        self.spec
            .network_spec
            .api_server_lb
            .as_ref()
            .map(|lb| lb.private_links.as_slice())
            .unwrap_or_default()
    }

    /// Conditions reported in status
    pub fn conditions(&self) -> &[ClusterCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Whether the condition of the given type is explicitly `True`
    pub fn is_condition_true(&self, condition_type: &str) -> bool {
        is_condition_true(self.conditions(), condition_type)
    }

    /// Value of an annotation, if set
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Whether the cluster carries the given finalizer
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|s| s == finalizer))
    }
}

/// Whether the condition of the given type is explicitly `True`
///
/// `False`, `Unknown` and an absent condition all read as not true.
pub fn is_condition_true(conditions: &[ClusterCondition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.type_ == condition_type)
        .is_some_and(|c| c.status == ConditionStatus::True)
}
