//! Private endpoint reconciliation
//!
//! Keeps the private endpoints declared on one cluster in line with the
//! private links declared on another, and propagates the addresses the
//! provider assigns to those endpoints back as cluster metadata.
//!
//! A reconciliation pass borrows disjoint parts of the two loaded cluster
//! objects ([`ClusterParts`]), wraps them in an [`EndpointDirectory`] and a
//! [`LinkDirectory`], and drives them with a [`ReconciliationService`]. The
//! borrowed objects are persisted by their owner once the pass is over.

#![deny(missing_docs)]

pub mod azure;
pub mod desired;
pub mod endpoints;
pub mod links;
pub mod scope;
pub mod service;

#[cfg(test)]
mod testing;

pub use azure::{PrivateEndpointResource, PrivateEndpointsClient};
pub use endpoints::EndpointDirectory;
pub use links::{AddressDirection, LinkDirectory};
pub use scope::{ClusterIdentity, ClusterParts, EndpointOps, Identity, LinkOps};
pub use service::ReconciliationService;
