//! Common types for the private link operator: cluster resources, errors, metrics, telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every patch sent by the operator
pub const FIELD_MANAGER: &str = "privlink-operator";

/// Finalizer placed on private workload AzureClusters so endpoints can be torn down
pub const ENDPOINTS_FINALIZER: &str = "privlink.dev/private-endpoints";

/// Annotation carrying the management cluster's private endpoint address for a workload API server
///
/// Consumed by DNS automation that publishes the workload API server record in the
/// management cluster's private zone.
pub const MC_TO_WC_API_ADDRESS_ANNOTATION: &str = "privlink.dev/mc-to-wc-apiserver-ip";

/// Annotation carrying the workload cluster's private endpoint address for management ingress
pub const WC_TO_MC_INGRESS_ADDRESS_ANNOTATION: &str = "privlink.dev/wc-to-mc-ingress-ip";

/// Status condition set once a workload cluster's private links have been provisioned
pub const PRIVATE_LINKS_READY_CONDITION: &str = "PrivateLinksReady";

/// Secret key holding a service principal's client secret
pub const CLIENT_SECRET_KEY: &str = "clientSecret";
