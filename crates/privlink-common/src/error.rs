//! Error types for the private link operator
//!
//! Errors carry the cluster or endpoint they relate to so that log lines and
//! requeue decisions can be made without string matching. The split between
//! retryable and fatal errors drives the controller's requeue policy: the
//! provisioning system is eventually consistent, so several variants only
//! mean "not yet".

use thiserror::Error;

/// Main error type for private link operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Operator or resource misconfiguration
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what's invalid
        message: String,
    },

    /// The endpoint-hosting cluster declares no subnet to allocate endpoint addresses from
    #[error("cluster {cluster} does not have any subnets set")]
    SubnetsNotDeclared {
        /// Name of the endpoint-hosting cluster
        cluster: String,
    },

    /// No declared private link allows the endpoint-creating subscription
    #[error(
        "cluster {management_cluster} subscription {subscription} is not allowed to connect to any private link of workload cluster {workload_cluster}"
    )]
    SubscriptionNotAuthorized {
        /// Cluster that would host the private endpoints
        management_cluster: String,
        /// Subscription the private endpoints would be created in
        subscription: String,
        /// Cluster that declares the private links
        workload_cluster: String,
    },

    /// API server load balancer type is neither public nor internal
    #[error("cluster {cluster} has unknown API server load balancer type {lb_type}")]
    UnknownLoadBalancerType {
        /// Name of the cluster
        cluster: String,
        /// The load balancer type the cluster declares
        lb_type: String,
    },

    /// Private links are declared but not yet validated
    #[error("private links of cluster {cluster} are not yet ready")]
    LinksNotReady {
        /// Name of the cluster declaring the links
        cluster: String,
    },

    /// The provisioning system does not know the endpoint yet
    #[error("private endpoint {endpoint} not found")]
    EndpointNotFound {
        /// Name of the private endpoint
        endpoint: String,
    },

    /// The endpoint exists but has no network interface attached yet
    #[error("private endpoint {endpoint} has no network interface")]
    NetworkInterfaceNotFound {
        /// Name of the private endpoint
        endpoint: String,
    },

    /// The endpoint's network interfaces carry no private address yet
    #[error("private endpoint {endpoint} has no private IP address assigned")]
    PrivateAddressNotAssigned {
        /// Name of the private endpoint
        endpoint: String,
    },

    /// Provisioning API error (transport failure or unexpected response)
    #[error("provider error: {message}")]
    Provider {
        /// Description of what failed
        message: String,
        /// HTTP status returned by the provider, if a response was received
        status: Option<u16>,
    },

    /// Provider credentials could not be resolved or exchanged for a token
    #[error("credentials error: {message}")]
    Credentials {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
        }
    }

    /// Create a subnets-not-declared error for the given cluster
    pub fn subnets_not_declared(cluster: impl Into<String>) -> Self {
        Self::SubnetsNotDeclared {
            cluster: cluster.into(),
        }
    }

    /// Create a subscription-not-authorized error
    pub fn subscription_not_authorized(
        management_cluster: impl Into<String>,
        subscription: impl Into<String>,
        workload_cluster: impl Into<String>,
    ) -> Self {
        Self::SubscriptionNotAuthorized {
            management_cluster: management_cluster.into(),
            subscription: subscription.into(),
            workload_cluster: workload_cluster.into(),
        }
    }

    /// Create an unknown load balancer type error
    pub fn unknown_load_balancer_type(
        cluster: impl Into<String>,
        lb_type: impl Into<String>,
    ) -> Self {
        Self::UnknownLoadBalancerType {
            cluster: cluster.into(),
            lb_type: lb_type.into(),
        }
    }

    /// Create a links-not-ready error for the given cluster
    pub fn links_not_ready(cluster: impl Into<String>) -> Self {
        Self::LinksNotReady {
            cluster: cluster.into(),
        }
    }

    /// Create an endpoint-not-found error
    pub fn endpoint_not_found(endpoint: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Create a network-interface-not-found error
    pub fn network_interface_not_found(endpoint: impl Into<String>) -> Self {
        Self::NetworkInterfaceNotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Create a private-address-not-assigned error
    pub fn private_address_not_assigned(endpoint: impl Into<String>) -> Self {
        Self::PrivateAddressNotAssigned {
            endpoint: endpoint.into(),
        }
    }

    /// Create a provider error without a response status (transport failure)
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            status: None,
        }
    }

    /// Create a provider error for an unexpected HTTP response
    pub fn provider_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a credentials error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only conditions that resolve on their own are retryable: links awaiting
    /// validation and endpoints the provisioning system has not finished.
    /// Everything else, including transport failures, is fatal by default and
    /// is reported rather than retried on the short interval.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LinksNotReady { .. }
                | Error::EndpointNotFound { .. }
                | Error::NetworkInterfaceNotFound { .. }
                | Error::PrivateAddressNotAssigned { .. }
        )
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::SubnetsNotDeclared { cluster }
            | Error::UnknownLoadBalancerType { cluster, .. }
            | Error::LinksNotReady { cluster } => Some(cluster),
            Error::SubscriptionNotAuthorized {
                workload_cluster, ..
            } => Some(workload_cluster),
            _ => None,
        }
    }

    /// Get the private endpoint name if this error is about a specific endpoint
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Error::EndpointNotFound { endpoint }
            | Error::NetworkInterfaceNotFound { endpoint }
            | Error::PrivateAddressNotAssigned { endpoint } => Some(endpoint),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
