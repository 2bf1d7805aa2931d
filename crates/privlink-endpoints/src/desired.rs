//! Naming conventions and construction of wanted private endpoints
//!
//! Endpoint names are deterministic in the link (or cluster pair) they serve,
//! so desired-state membership can be decided by name alone.

use privlink_common::crd::{PrivateEndpointSpec, PrivateLink, PrivateLinkServiceConnection};

use crate::scope::ClusterIdentity;

/// Prefix shared by every resource identifier in a subscription's resource group
pub fn resource_group_id(subscription_id: &str, resource_group: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}",
        subscription_id, resource_group
    )
}

/// Canonical resource identifier of a private link
pub fn private_link_resource_id(
    subscription_id: &str,
    resource_group: &str,
    link_name: &str,
) -> String {
    format!(
        "{}/providers/Microsoft.Network/privateLinkServices/{}",
        resource_group_id(subscription_id, resource_group),
        link_name
    )
}

/// Name of the management cluster endpoint that reaches a workload API server link
pub fn endpoint_name(link_name: &str) -> String {
    format!("{}-privateendpoint", link_name)
}

/// Name of the connection from an endpoint to a link
pub fn connection_name(link_name: &str) -> String {
    format!("{}-connection", link_name)
}

/// Name of the workload cluster endpoint that reaches management cluster ingress
pub fn ingress_endpoint_name(workload_cluster: &str, management_cluster: &str) -> String {
    format!(
        "{}-to-{}-privatelink-privateendpoint",
        workload_cluster, management_cluster
    )
}

/// Whether a resource identifier lives in the given subscription and resource group
pub fn in_resource_group(resource_id: &str, subscription_id: &str, resource_group: &str) -> bool {
    let prefix = resource_group_id(subscription_id, resource_group);
    resource_id
        .strip_prefix(&prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Private endpoint in `host` that the management cluster uses to reach a workload API server
pub fn api_server_endpoint(
    host: &ClusterIdentity,
    link_owner: &ClusterIdentity,
    link: &PrivateLink,
) -> PrivateEndpointSpec {
    let message = format!(
        "privlink-operator running in management cluster {} created this private endpoint to access private workload cluster {}",
        host.name, link_owner.name
    );
    build_endpoint(endpoint_name(&link.name), host, link_owner, link, message)
}

/// Private endpoint in the workload cluster `host` that reaches management cluster ingress
///
/// `link` is a private link published by the management cluster `link_owner`.
pub fn ingress_endpoint(
    host: &ClusterIdentity,
    link_owner: &ClusterIdentity,
    link: &PrivateLink,
) -> PrivateEndpointSpec {
    let message = format!(
        "privlink-operator running in management cluster {} created this private endpoint so that private workload cluster {} can reach management cluster ingress",
        link_owner.name, host.name
    );
    build_endpoint(
        ingress_endpoint_name(&host.name, &link_owner.name),
        host,
        link_owner,
        link,
        message,
    )
}

fn build_endpoint(
    name: String,
    host: &ClusterIdentity,
    link_owner: &ClusterIdentity,
    link: &PrivateLink,
    message: String,
) -> PrivateEndpointSpec {
    let manual_approval = !link.auto_approves(&host.subscription_id);
    let request_message = if manual_approval {
        message
    } else {
        String::new()
    };

    PrivateEndpointSpec {
        name,
        location: host.location.clone(),
        private_link_service_connections: vec![PrivateLinkServiceConnection {
            name: connection_name(&link.name),
            private_link_service_id: private_link_resource_id(
                &link_owner.subscription_id,
                &link_owner.resource_group,
                &link.name,
            ),
            request_message,
            ..Default::default()
        }],
        manual_approval,
        ..Default::default()
    }
}
