//! Private endpoints declared on a cluster

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use privlink_common::crd::{PrivateEndpointSpec, SubnetSpec, SUBNET_ROLE_NODE};
use privlink_common::{Error, Result};

use crate::azure::{PrivateEndpointResource, PrivateEndpointsClient};
use crate::desired::in_resource_group;
use crate::scope::{ClusterIdentity, EndpointOps, Identity};

/// Mutable view over the private endpoints of one cluster's endpoint subnet
///
/// Endpoint addresses are allocated from the `node` subnet, or from the first
/// declared subnet when no subnet has that role.
pub struct EndpointDirectory<'a> {
    identity: ClusterIdentity,
    endpoints: &'a mut Vec<PrivateEndpointSpec>,
    client: Option<Arc<dyn PrivateEndpointsClient>>,
}

impl<'a> EndpointDirectory<'a> {
    /// Build the view over the cluster's endpoint subnet
    pub fn new(
        identity: ClusterIdentity,
        subnets: &'a mut [SubnetSpec],
        client: Arc<dyn PrivateEndpointsClient>,
    ) -> Result<Self> {
        Self::select(identity, subnets, Some(client))
    }

    /// Build a view that can edit endpoints but not resolve their addresses
    ///
    /// Used for teardown, which must not depend on provider credentials.
    pub fn for_removal(identity: ClusterIdentity, subnets: &'a mut [SubnetSpec]) -> Result<Self> {
        Self::select(identity, subnets, None)
    }

    fn select(
        identity: ClusterIdentity,
        subnets: &'a mut [SubnetSpec],
        client: Option<Arc<dyn PrivateEndpointsClient>>,
    ) -> Result<Self> {
        let index = subnets
            .iter()
            .position(|s| s.has_role(SUBNET_ROLE_NODE))
            .or_else(|| (!subnets.is_empty()).then_some(0))
            .ok_or_else(|| Error::subnets_not_declared(&identity.name))?;

        Ok(Self {
            identity,
            endpoints: &mut subnets[index].private_endpoints,
            client,
        })
    }
}

impl Identity for EndpointDirectory<'_> {
    fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }
}

#[async_trait]
impl EndpointOps for EndpointDirectory<'_> {
    fn contains(&self, candidate: &PrivateEndpointSpec) -> bool {
        self.endpoints.iter().any(|e| e.name == candidate.name)
    }

    fn add(&mut self, candidate: PrivateEndpointSpec) -> bool {
        if self.contains(&candidate) {
            return false;
        }
        debug!(
            cluster = %self.identity.name,
            endpoint = %candidate.name,
            "Adding private endpoint"
        );
        self.endpoints.push(candidate);
        true
    }

    fn remove_by_name(&mut self, name: &str) -> bool {
        match self.endpoints.iter().position(|e| e.name == name) {
            Some(index) => {
                self.endpoints.remove(index);
                debug!(cluster = %self.identity.name, endpoint = %name, "Removed private endpoint");
                true
            }
            None => false,
        }
    }

    fn all(&self) -> &[PrivateEndpointSpec] {
        self.endpoints.as_slice()
    }

    fn filter_by_target_cluster(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Vec<PrivateEndpointSpec> {
        self.endpoints
            .iter()
            .filter(|e| {
                e.private_link_service_connections.iter().any(|c| {
                    in_resource_group(&c.private_link_service_id, subscription_id, resource_group)
                })
            })
            .cloned()
            .collect()
    }

    async fn resolve_address(&self, endpoint_name: &str) -> Result<IpAddr> {
        let client = self.client.as_ref().ok_or_else(|| {
            Error::invalid_config(format!(
                "cannot resolve private endpoint {} without a provider client",
                endpoint_name
            ))
        })?;
        let resource = client
            .get(&self.identity.resource_group, endpoint_name)
            .await?
            .ok_or_else(|| Error::endpoint_not_found(endpoint_name))?;
        first_private_address(endpoint_name, &resource)
    }
}

/// First parseable private address of an endpoint, in interface order
///
/// Additional addresses are ignored.
pub fn first_private_address(
    endpoint_name: &str,
    resource: &PrivateEndpointResource,
) -> Result<IpAddr> {
    if resource.properties.network_interfaces.is_empty() {
        return Err(Error::network_interface_not_found(endpoint_name));
    }
    resource
        .private_addresses()
        .find_map(|address| address.parse::<IpAddr>().ok())
        .ok_or_else(|| Error::private_address_not_assigned(endpoint_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::MockPrivateEndpointsClient;
    use crate::testing::{endpoint_resource, endpoint_to, subnet};

    fn identity() -> ClusterIdentity {
        ClusterIdentity {
            name: "mc".into(),
            namespace: "org-giantswarm".into(),
            subscription_id: "mc-sub".into(),
            location: "westeurope".into(),
            resource_group: "mc-rg".into(),
        }
    }

    fn no_client() -> Arc<dyn PrivateEndpointsClient> {
        Arc::new(MockPrivateEndpointsClient::new())
    }

    #[test]
    fn node_subnet_is_preferred() {
        let mut subnets = vec![
            subnet("cp", Some("control-plane"), vec![]),
            subnet("node", Some("node"), vec![endpoint_to("x", "s", "rg", "l")]),
        ];
        let directory = EndpointDirectory::new(identity(), &mut subnets, no_client()).unwrap();
        assert_eq!(directory.all().len(), 1);
        assert_eq!(directory.all()[0].name, "x");
    }

    #[test]
    fn first_subnet_is_the_fallback() {
        let mut subnets = vec![
            subnet("first", None, vec![endpoint_to("a", "s", "rg", "l")]),
            subnet("second", Some("control-plane"), vec![]),
        ];
        let directory = EndpointDirectory::new(identity(), &mut subnets, no_client()).unwrap();
        assert_eq!(directory.all()[0].name, "a");
    }

    #[test]
    fn no_subnets_is_an_error() {
        let mut subnets: Vec<SubnetSpec> = vec![];
        let err = EndpointDirectory::new(identity(), &mut subnets, no_client())
            .err()
            .unwrap();
        assert!(matches!(err, Error::SubnetsNotDeclared { ref cluster } if cluster == "mc"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn add_is_keyed_by_name_and_first_write_wins() {
        let mut subnets = vec![subnet("node", Some("node"), vec![])];
        {
            let mut directory =
                EndpointDirectory::new(identity(), &mut subnets, no_client()).unwrap();

            let original = endpoint_to("pe", "s", "rg", "l");
            assert!(directory.add(original.clone()));
            assert!(directory.contains(&original));

            let mut changed = original.clone();
            changed.location = "northeurope".into();
            changed.manual_approval = true;
            assert!(directory.contains(&changed));
            assert!(!directory.add(changed));
            assert_eq!(directory.all(), &[original]);
        }
        assert_eq!(subnets[0].private_endpoints.len(), 1);
    }

    #[test]
    fn remove_by_name_removes_first_match_only() {
        let mut subnets = vec![subnet(
            "node",
            Some("node"),
            vec![
                endpoint_to("a", "s", "rg", "l1"),
                endpoint_to("b", "s", "rg", "l2"),
            ],
        )];
        let mut directory = EndpointDirectory::new(identity(), &mut subnets, no_client()).unwrap();

        assert!(directory.remove_by_name("a"));
        assert!(!directory.remove_by_name("a"));
        assert!(!directory.remove_by_name("missing"));
        assert_eq!(directory.all().len(), 1);
        assert_eq!(directory.all()[0].name, "b");
    }

    #[test]
    fn filter_by_target_cluster_matches_connection_prefix() {
        let mut subnets = vec![subnet(
            "node",
            Some("node"),
            vec![
                endpoint_to("wc1-a", "wc-sub", "wc1", "a"),
                endpoint_to("wc2-a", "wc-sub", "wc2", "a"),
                endpoint_to("wc10-a", "wc-sub", "wc10", "a"),
                endpoint_to("other-sub", "other", "wc1", "a"),
            ],
        )];
        let directory = EndpointDirectory::new(identity(), &mut subnets, no_client()).unwrap();

        let names: Vec<_> = directory
            .filter_by_target_cluster("wc-sub", "wc1")
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["wc1-a"]);
    }

    #[tokio::test]
    async fn resolve_address_queries_host_resource_group() {
        let mut client = MockPrivateEndpointsClient::new();
        client
            .expect_get()
            .withf(|rg, name| rg == "mc-rg" && name == "pe")
            .times(1)
            .returning(|_, _| Ok(Some(endpoint_resource(&[&["10.0.0.4"]]))));

        let mut subnets = vec![subnet("node", Some("node"), vec![])];
        let directory =
            EndpointDirectory::new(identity(), &mut subnets, Arc::new(client)).unwrap();

        let address = directory.resolve_address("pe").await.unwrap();
        assert_eq!(address, "10.0.0.4".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn unknown_endpoint_is_retryable() {
        let mut client = MockPrivateEndpointsClient::new();
        client.expect_get().returning(|_, _| Ok(None));

        let mut subnets = vec![subnet("node", Some("node"), vec![])];
        let directory =
            EndpointDirectory::new(identity(), &mut subnets, Arc::new(client)).unwrap();

        let err = directory.resolve_address("pe").await.unwrap_err();
        assert!(matches!(err, Error::EndpointNotFound { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn provider_errors_are_propagated() {
        let mut client = MockPrivateEndpointsClient::new();
        client
            .expect_get()
            .returning(|_, _| Err(Error::provider_status(403, "forbidden")));

        let mut subnets = vec![subnet("node", Some("node"), vec![])];
        let directory =
            EndpointDirectory::new(identity(), &mut subnets, Arc::new(client)).unwrap();

        let err = directory.resolve_address("pe").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn removal_view_edits_without_a_client() {
        let mut subnets = vec![subnet(
            "node",
            Some("node"),
            vec![endpoint_to("a", "s", "rg", "l1")],
        )];
        {
            let mut directory = EndpointDirectory::for_removal(identity(), &mut subnets).unwrap();
            assert!(directory.remove_by_name("a"));

            let err = directory.resolve_address("a").await.unwrap_err();
            assert!(matches!(err, Error::InvalidConfig { .. }));
            assert!(!err.is_retryable());
        }
        assert!(subnets[0].private_endpoints.is_empty());
    }

    #[test]
    fn endpoint_without_interfaces() {
        let err = first_private_address("pe", &endpoint_resource(&[])).unwrap_err();
        assert!(matches!(err, Error::NetworkInterfaceNotFound { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn interfaces_without_addresses() {
        let err = first_private_address("pe", &endpoint_resource(&[&[], &[""]])).unwrap_err();
        assert!(matches!(err, Error::PrivateAddressNotAssigned { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn first_address_in_encounter_order_wins() {
        let resource = endpoint_resource(&[&[], &["not-an-ip", "10.0.0.7", "10.0.0.8"], &["10.0.0.9"]]);
        assert_eq!(
            first_private_address("pe", &resource).unwrap(),
            "10.0.0.7".parse::<IpAddr>().unwrap()
        );
    }
}
