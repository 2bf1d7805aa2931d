//! Private endpoint reconciliation
//!
//! A service pairs the cluster that hosts private endpoints with the cluster
//! whose private links those endpoints connect to. Each call is one pass over
//! request-scoped views; nothing is retained between passes.
//!
//! A pass never retries on its own. Errors are returned with their retry
//! classification (see [`privlink_common::Error::is_retryable`]) and partial
//! progress stays in place: endpoints already added are found by name on the
//! next pass instead of being added twice.

use tracing::{debug, info};

use privlink_common::crd::PrivateEndpointSpec;
use privlink_common::{Error, Result};

use crate::desired;
use crate::links::AddressDirection;
use crate::scope::{EndpointOps, Identity, LinkOps};

/// Reconciles the endpoints of one cluster against the links of another
pub struct ReconciliationService<E, L> {
    endpoints: E,
    links: L,
}

impl<E: EndpointOps, L: LinkOps> ReconciliationService<E, L> {
    /// Pair an endpoint host with a link publisher
    pub fn new(endpoints: E, links: L) -> Self {
        Self { endpoints, links }
    }

    /// Bring the host's endpoints in line with the publisher's links
    ///
    /// Adds an endpoint for every link that allows the host's subscription,
    /// records the address of each as the API server address of the
    /// publisher, then drops host endpoints into the publisher's resource
    /// group whose link is no longer declared. The first error aborts the pass.
    pub async fn reconcile(&mut self) -> Result<()> {
        let host = self.endpoints.identity().clone();
        let owner = self.links.identity().clone();

        let links = self.links.links_allowing_subscription(&host.subscription_id);
        if links.is_empty() && !self.links.declared_links().is_empty() {
            return Err(Error::subscription_not_authorized(
                &host.name,
                &host.subscription_id,
                &owner.name,
            ));
        }
        if !links.is_empty() && !self.links.ready() {
            return Err(Error::links_not_ready(&owner.name));
        }

        for link in &links {
            debug!(cluster = %owner.name, link = %link.name, "Found private link");
            let wanted = desired::api_server_endpoint(&host, &owner, link);
            let name = wanted.name.clone();
            if self.endpoints.add(wanted) {
                info!(
                    cluster = %host.name,
                    endpoint = %name,
                    link = %link.name,
                    "Added private endpoint"
                );
            }

            let address = self.endpoints.resolve_address(&name).await?;
            debug!(cluster = %host.name, endpoint = %name, address = %address, "Resolved private endpoint address");
            self.links
                .set_resolved_address(AddressDirection::McToWcApi, address);
        }

        self.remove_unused_endpoints();
        Ok(())
    }

    fn remove_unused_endpoints(&mut self) {
        let owner = self.links.identity().clone();
        let candidates = self
            .endpoints
            .filter_by_target_cluster(&owner.subscription_id, &owner.resource_group);

        for candidate in candidates {
            let used = candidate
                .private_link_service_connections
                .iter()
                .any(|c| self.links.lookup_by_identifier(&c.private_link_service_id).is_some());
            if !used && self.endpoints.remove_by_name(&candidate.name) {
                info!(
                    cluster = %self.endpoints.cluster_name(),
                    endpoint = %candidate.name,
                    "Removed private endpoint whose private link is gone"
                );
            }
        }
    }

    /// Ensure the ingress endpoint exists and record its address
    ///
    /// Ingress endpoints are never removed here; stale ones are left to the
    /// lifecycle of the cluster that hosts them.
    pub async fn reconcile_wc_to_mc_ingress(&mut self, wanted: PrivateEndpointSpec) -> Result<()> {
        let name = wanted.name.clone();
        if self.endpoints.add(wanted) {
            info!(
                cluster = %self.endpoints.cluster_name(),
                endpoint = %name,
                "Added ingress private endpoint"
            );
        }

        let address = self.endpoints.resolve_address(&name).await?;
        debug!(
            cluster = %self.endpoints.cluster_name(),
            endpoint = %name,
            address = %address,
            "Resolved ingress private endpoint address"
        );
        self.links
            .set_resolved_address(AddressDirection::WcToMcIngress, address);
        Ok(())
    }

    /// Remove the host's endpoints for every link that allows its subscription
    ///
    /// Readiness and authorization are not checked, so teardown proceeds even
    /// for links that never became ready. Absent endpoints are skipped.
    pub fn delete(&mut self) {
        let subscription_id = self.endpoints.subscription_id().to_string();
        for link in self.links.links_allowing_subscription(&subscription_id) {
            let name = desired::endpoint_name(&link.name);
            if self.endpoints.remove_by_name(&name) {
                info!(
                    cluster = %self.endpoints.cluster_name(),
                    endpoint = %name,
                    "Removed private endpoint of deleted cluster"
                );
            }
        }
    }

    /// Tear down the management cluster endpoints reaching the workload API server
    pub fn delete_mc_to_wc_api(&mut self) {
        self.delete()
    }
}
