//! Fixtures shared by the unit tests of this crate

use privlink_common::crd::{
    AzureCluster, AzureClusterSpec, AzureClusterStatus, ClusterCondition, ConditionStatus,
    LoadBalancerSpec, NetworkSpec, PrivateEndpointSpec, PrivateLink, PrivateLinkServiceConnection,
    SubnetSpec, SUBNET_ROLE_NODE,
};
use privlink_common::PRIVATE_LINKS_READY_CONDITION;

use crate::azure::{
    IpConfiguration, IpConfigurationProperties, NetworkInterface, NetworkInterfaceProperties,
    PrivateEndpointProperties, PrivateEndpointResource,
};
use crate::desired::{connection_name, endpoint_name, private_link_resource_id};

pub const MC_NAME: &str = "mc";
pub const MC_SUBSCRIPTION: &str = "1234";
pub const MC_RESOURCE_GROUP: &str = "mc-rg";
pub const WC_NAME: &str = "wc1";
pub const WC_SUBSCRIPTION: &str = "5678";

pub fn subnet(name: &str, role: Option<&str>, endpoints: Vec<PrivateEndpointSpec>) -> SubnetSpec {
    SubnetSpec {
        name: name.into(),
        role: role.map(String::from),
        private_endpoints: endpoints,
        ..Default::default()
    }
}

/// Endpoint with one connection to `link` in `subscription`/`resource_group`
pub fn endpoint_to(
    name: &str,
    subscription: &str,
    resource_group: &str,
    link: &str,
) -> PrivateEndpointSpec {
    PrivateEndpointSpec {
        name: name.into(),
        location: "westeurope".into(),
        private_link_service_connections: vec![PrivateLinkServiceConnection {
            name: connection_name(link),
            private_link_service_id: private_link_resource_id(subscription, resource_group, link),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// The endpoint the management cluster declares for a workload cluster link
pub fn api_endpoint_for(link: &str) -> PrivateEndpointSpec {
    endpoint_to(&endpoint_name(link), WC_SUBSCRIPTION, WC_NAME, link)
}

/// Provider resource with one interface per entry, each with the given addresses
pub fn endpoint_resource(interfaces: &[&[&str]]) -> PrivateEndpointResource {
    PrivateEndpointResource {
        properties: PrivateEndpointProperties {
            network_interfaces: interfaces
                .iter()
                .map(|addresses| NetworkInterface {
                    properties: NetworkInterfaceProperties {
                        ip_configurations: addresses
                            .iter()
                            .map(|address| IpConfiguration {
                                properties: IpConfigurationProperties {
                                    private_ip_address: Some(address.to_string()),
                                },
                                ..Default::default()
                            })
                            .collect(),
                    },
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn link(name: &str, allowed: &[&str], auto_approved: &[&str]) -> PrivateLink {
    PrivateLink {
        name: name.into(),
        allowed_subscriptions: allowed.iter().map(|s| s.to_string()).collect(),
        auto_approved_subscriptions: auto_approved.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn azure_cluster(
    name: &str,
    subscription: &str,
    resource_group: &str,
    links: Vec<PrivateLink>,
    subnets: Vec<SubnetSpec>,
) -> AzureCluster {
    let mut cluster = AzureCluster::new(
        name,
        AzureClusterSpec {
            subscription_id: subscription.into(),
            location: "westeurope".into(),
            resource_group: resource_group.into(),
            network_spec: NetworkSpec {
                api_server_lb: Some(LoadBalancerSpec {
                    lb_type: Some("Internal".into()),
                    private_links: links,
                    ..Default::default()
                }),
                subnets,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    cluster.metadata.namespace = Some("org-acme".into());
    cluster
}

/// Management cluster with a node subnet holding `endpoints`
pub fn management_cluster(endpoints: Vec<PrivateEndpointSpec>) -> AzureCluster {
    azure_cluster(
        MC_NAME,
        MC_SUBSCRIPTION,
        MC_RESOURCE_GROUP,
        vec![],
        vec![
            subnet("mc-control-plane", Some("control-plane"), vec![]),
            subnet("mc-node", Some(SUBNET_ROLE_NODE), endpoints),
        ],
    )
}

/// Workload cluster (resource group named after the cluster) declaring `links`
pub fn workload_cluster(links: Vec<PrivateLink>, ready: Option<ConditionStatus>) -> AzureCluster {
    let mut cluster = azure_cluster(
        WC_NAME,
        WC_SUBSCRIPTION,
        WC_NAME,
        links,
        vec![subnet("wc-node", Some(SUBNET_ROLE_NODE), vec![])],
    );
    if let Some(status) = ready {
        cluster.status = Some(AzureClusterStatus {
            conditions: vec![ClusterCondition::new(PRIVATE_LINKS_READY_CONDITION, status)],
            ..Default::default()
        });
    }
    cluster
}
