//! Cluster API Azure resources read and written by the operator
//!
//! The operator does not own these CRDs. Only the fields it needs are typed;
//! every other field is carried through `extra` maps so that writing an
//! object back never drops data owned by other controllers.

mod azure_cluster;
mod identity;

pub use azure_cluster::{
    is_condition_true, AzureCluster, AzureClusterSpec, AzureClusterStatus, ClusterCondition,
    ConditionStatus, LoadBalancerSpec, LoadBalancerType, NetworkSpec, ObjectKey, ObjectReference,
    PrivateEndpointSpec, PrivateLink, PrivateLinkServiceConnection, SubnetSpec, SUBNET_ROLE_NODE,
};
pub use identity::{AzureClusterIdentity, AzureClusterIdentitySpec, IdentityType, SecretReference};

/// Unmodelled fields preserved verbatim across read-modify-write cycles
pub type ExtraFields = std::collections::BTreeMap<String, serde_json::Value>;
