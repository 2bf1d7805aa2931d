//! Azure Resource Manager access for private endpoint lookups
//!
//! Only one operation is needed: fetch a private endpoint together with its
//! network interfaces so the assigned private address can be read.

mod client;
mod credentials;

use async_trait::async_trait;
use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

use privlink_common::Result;

pub use client::{ArmPrivateEndpointsClient, DEFAULT_ARM_ENDPOINT, PRIVATE_ENDPOINTS_API_VERSION};
pub use credentials::{
    AzureCredential, CredentialKind, TokenProvider, DEFAULT_AUTHORITY_HOST, DEFAULT_IMDS_ENDPOINT,
    DEFAULT_RESOURCE,
};

/// Lookup of private endpoint resources in one subscription
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PrivateEndpointsClient: Send + Sync {
    /// Fetch a private endpoint with its network interfaces expanded
    ///
    /// Returns `None` when the provider does not know the endpoint.
    async fn get(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<PrivateEndpointResource>>;
}

/// Private endpoint as returned by the provider
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointResource {
    /// Resource name
    #[serde(default)]
    pub name: Option<String>,
    /// Resource identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Resource properties
    #[serde(default)]
    pub properties: PrivateEndpointProperties,
}

/// Properties of a private endpoint
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointProperties {
    /// Provisioning state (`Succeeded`, `Updating`, ...)
    #[serde(default)]
    pub provisioning_state: Option<String>,
    /// Network interfaces attached to the endpoint
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

/// A network interface attached to a private endpoint
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Resource identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Interface properties
    #[serde(default)]
    pub properties: NetworkInterfaceProperties,
}

/// Properties of a network interface
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    /// IP configurations of the interface
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
}

/// One IP configuration of a network interface
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpConfiguration {
    /// Configuration name
    #[serde(default)]
    pub name: Option<String>,
    /// Configuration properties
    #[serde(default)]
    pub properties: IpConfigurationProperties,
}

/// Properties of an IP configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct IpConfigurationProperties {
    /// Private address, once assigned
    #[serde(default, rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,
}

impl PrivateEndpointResource {
    /// Private addresses across all interfaces and configurations, in encounter order
    pub fn private_addresses(&self) -> impl Iterator<Item = &str> {
        self.properties
            .network_interfaces
            .iter()
            .flat_map(|nic| nic.properties.ip_configurations.iter())
            .filter_map(|config| config.properties.private_ip_address.as_deref())
            .filter(|address| !address.is_empty())
    }
}
