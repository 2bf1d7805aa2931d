//! Cluster identity and the capabilities a reconciliation pass needs
//!
//! A cluster plays up to two roles in a pass: it hosts private endpoints
//! ([`EndpointOps`]) and it publishes private links ([`LinkOps`]). Both roles
//! share the read-only [`Identity`] capability.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use privlink_common::crd::{
    AzureCluster, ClusterCondition, PrivateEndpointSpec, PrivateLink, SubnetSpec,
};
use privlink_common::{Error, Result};

use crate::azure::PrivateEndpointsClient;
use crate::endpoints::EndpointDirectory;
use crate::links::{AddressDirection, LinkDirectory};

/// Immutable snapshot of a cluster's identity, taken when a pass starts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterIdentity {
    /// Cluster name
    pub name: String,
    /// Cluster namespace
    pub namespace: String,
    /// Azure subscription
    pub subscription_id: String,
    /// Azure region
    pub location: String,
    /// Azure resource group
    pub resource_group: String,
}

impl ClusterIdentity {
    /// Snapshot the identity of a loaded cluster
    ///
    /// Rejects objects without a name, which cannot be persisted back.
    pub fn from_cluster(cluster: &AzureCluster) -> Result<Self> {
        let name = cluster
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::invalid_config("AzureCluster has no metadata.name"))?;

        Ok(Self {
            name,
            namespace: cluster.metadata.namespace.clone().unwrap_or_default(),
            subscription_id: cluster.spec.subscription_id.clone(),
            location: cluster.spec.location.clone(),
            resource_group: cluster.spec.resource_group.clone(),
        })
    }
}

/// Read-only access to the identity of the cluster behind a view
pub trait Identity {
    /// The identity snapshot
    fn identity(&self) -> &ClusterIdentity;

    /// Cluster name
    fn cluster_name(&self) -> &str {
        &self.identity().name
    }

    /// Azure subscription
    fn subscription_id(&self) -> &str {
        &self.identity().subscription_id
    }

    /// Azure region
    fn location(&self) -> &str {
        &self.identity().location
    }

    /// Azure resource group
    fn resource_group(&self) -> &str {
        &self.identity().resource_group
    }
}

/// Operations over the private endpoints a cluster hosts
#[async_trait]
pub trait EndpointOps: Identity + Send + Sync {
    /// Whether an endpoint with the candidate's name is declared
    fn contains(&self, candidate: &PrivateEndpointSpec) -> bool;

    /// Declare the candidate unless an endpoint with its name already exists
    ///
    /// Returns true if the candidate was added.
    fn add(&mut self, candidate: PrivateEndpointSpec) -> bool;

    /// Remove the first endpoint with the given name
    ///
    /// Returns true if an endpoint was removed.
    fn remove_by_name(&mut self, name: &str) -> bool;

    /// All declared endpoints
    fn all(&self) -> &[PrivateEndpointSpec];

    /// Endpoints with a connection into the given subscription and resource group
    fn filter_by_target_cluster(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Vec<PrivateEndpointSpec>;

    /// Look up the address the provider assigned to the named endpoint
    async fn resolve_address(&self, endpoint_name: &str) -> Result<IpAddr>;
}

/// Operations over the private links a cluster publishes
pub trait LinkOps: Identity + Send + Sync {
    /// The declared link whose canonical resource identifier equals `resource_id`
    fn lookup_by_identifier(&self, resource_id: &str) -> Option<&PrivateLink>;

    /// Declared links that allow connections from `subscription_id`
    fn links_allowing_subscription(&self, subscription_id: &str) -> Vec<PrivateLink>;

    /// All declared links
    fn declared_links(&self) -> &[PrivateLink];

    /// Whether the links have been validated by the provider
    fn ready(&self) -> bool;

    /// Record a resolved endpoint address in cluster metadata
    fn set_resolved_address(&mut self, direction: AddressDirection, address: IpAddr);
}

/// Disjoint borrows into a loaded cluster, one per view that can be built over it
pub struct ClusterParts<'a> {
    /// Identity snapshot
    pub identity: ClusterIdentity,
    /// Subnets, which carry the declared private endpoints
    pub subnets: &'a mut [SubnetSpec],
    /// Private links of the API server load balancer
    pub links: &'a [PrivateLink],
    /// Status conditions
    pub conditions: &'a [ClusterCondition],
    /// Metadata annotations
    pub annotations: &'a mut Option<BTreeMap<String, String>>,
}

impl<'a> ClusterParts<'a> {
    /// Split a loaded cluster into independently borrowable parts
    pub fn split(cluster: &'a mut AzureCluster) -> Result<Self> {
        let identity = ClusterIdentity::from_cluster(cluster)?;
        let AzureCluster {
            metadata,
            spec,
            status,
            ..
        } = cluster;

        let network = &mut spec.network_spec;
        let links = network
            .api_server_lb
            .as_ref()
            .map(|lb| lb.private_links.as_slice())
            .unwrap_or_default();
        let conditions = status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();

        Ok(Self {
            identity,
            subnets: network.subnets.as_mut_slice(),
            links,
            conditions,
            annotations: &mut metadata.annotations,
        })
    }

    /// View the cluster as a private endpoint host
    pub fn into_endpoint_directory(
        self,
        client: Arc<dyn PrivateEndpointsClient>,
    ) -> Result<EndpointDirectory<'a>> {
        EndpointDirectory::new(self.identity, self.subnets, client)
    }

    /// View the cluster as a private endpoint host for teardown only
    pub fn into_removal_directory(self) -> Result<EndpointDirectory<'a>> {
        EndpointDirectory::for_removal(self.identity, self.subnets)
    }

    /// View the cluster as a private link publisher
    pub fn into_link_directory(self) -> LinkDirectory<'a> {
        LinkDirectory::new(self.identity, self.links, self.conditions, self.annotations)
    }

    /// View the cluster in both roles at once
    pub fn into_directories(
        self,
        client: Arc<dyn PrivateEndpointsClient>,
    ) -> Result<(EndpointDirectory<'a>, LinkDirectory<'a>)> {
        let endpoints = EndpointDirectory::new(self.identity.clone(), self.subnets, client)?;
        let links = LinkDirectory::new(self.identity, self.links, self.conditions, self.annotations);
        Ok((endpoints, links))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privlink_common::crd::{
        AzureClusterSpec, AzureClusterStatus, ConditionStatus, LoadBalancerSpec, NetworkSpec,
    };

    fn cluster(name: Option<&str>) -> AzureCluster {
        let mut cluster = AzureCluster::new(
            "placeholder",
            AzureClusterSpec {
                subscription_id: "1234".into(),
                location: "westeurope".into(),
                resource_group: "rg".into(),
                network_spec: NetworkSpec {
                    api_server_lb: Some(LoadBalancerSpec {
                        lb_type: Some("Internal".into()),
                        private_links: vec![PrivateLink {
                            name: "link".into(),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    subnets: vec![SubnetSpec {
                        name: "node".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        cluster.metadata.name = name.map(String::from);
        cluster.metadata.namespace = Some("org-acme".into());
        cluster.status = Some(AzureClusterStatus {
            conditions: vec![ClusterCondition::new("Ready", ConditionStatus::True)],
            ..Default::default()
        });
        cluster
    }

    #[test]
    fn identity_snapshot_copies_fields() {
        let identity = ClusterIdentity::from_cluster(&cluster(Some("wc1"))).unwrap();
        assert_eq!(
            identity,
            ClusterIdentity {
                name: "wc1".into(),
                namespace: "org-acme".into(),
                subscription_id: "1234".into(),
                location: "westeurope".into(),
                resource_group: "rg".into(),
            }
        );
    }

    #[test]
    fn nameless_cluster_is_rejected() {
        let err = ClusterIdentity::from_cluster(&cluster(None)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let mut nameless = cluster(None);
        assert!(ClusterParts::split(&mut nameless).is_err());
    }

    #[test]
    fn split_exposes_every_part() {
        let mut wc = cluster(Some("wc1"));
        let parts = ClusterParts::split(&mut wc).unwrap();
        assert_eq!(parts.identity.name, "wc1");
        assert_eq!(parts.subnets.len(), 1);
        assert_eq!(parts.links.len(), 1);
        assert_eq!(parts.conditions.len(), 1);
        assert!(parts.annotations.is_none());
    }

    #[test]
    fn split_without_load_balancer_or_status_yields_empty_parts() {
        let mut wc = cluster(Some("wc1"));
        wc.spec.network_spec.api_server_lb = None;
        wc.status = None;
        let parts = ClusterParts::split(&mut wc).unwrap();
        assert!(parts.links.is_empty());
        assert!(parts.conditions.is_empty());
    }
}
