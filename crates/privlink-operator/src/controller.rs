//! AzureCluster controller
//!
//! Workload clusters with an internal API server load balancer are reached
//! from the management cluster through private endpoints. For each such
//! workload cluster the controller keeps the management cluster's endpoints
//! in line with the workload cluster's private links and, when the management
//! cluster is itself private, gives the workload cluster an endpoint to the
//! management cluster's ingress.
//!
//! Both clusters are loaded fresh for every reconciliation and written back
//! on every path, including failed passes, so partial progress survives.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument};

use privlink_common::crd::{AzureCluster, LoadBalancerType, ObjectKey};
use privlink_common::metrics::{ReconcileOutcome, ReconcileTimer};
use privlink_common::{Error, Result, ENDPOINTS_FINALIZER};
use privlink_endpoints::links::links_allowing_subscription;
use privlink_endpoints::{desired, ClusterIdentity, ClusterParts, Identity, ReconciliationService};

use crate::config::Config;
use crate::provider::{ArmClientFactory, ClientFactory};
use crate::store::{pass_outcome, ClusterScope, ClusterStore, KubeClusterStore};

/// Controller context shared by all reconciliations
pub struct Context {
    /// Access to AzureCluster objects
    pub store: Arc<dyn ClusterStore>,
    /// Provisioning clients per cluster identity
    pub clients: Arc<dyn ClientFactory>,
    /// The management cluster's AzureCluster
    pub management_cluster: ObjectKey,
    /// Requeue interval after success and after fatal errors
    pub sync_period: Duration,
    /// Requeue interval after retryable errors
    pub retry_interval: Duration,
}

impl Context {
    /// Create the production context
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            store: Arc::new(KubeClusterStore::new(client.clone())),
            clients: Arc::new(ArmClientFactory::new(
                client,
                config.arm_endpoint.clone(),
                config.azure_authority_host.clone(),
                config.azure_federated_token_file.clone(),
            )),
            management_cluster: config.management_cluster(),
            sync_period: config.sync_period(),
            retry_interval: config.retry_interval(),
        }
    }

    /// Create a context for testing with mock collaborators
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn ClusterStore>,
        clients: Arc<dyn ClientFactory>,
        management_cluster: ObjectKey,
    ) -> Self {
        Self {
            store,
            clients,
            management_cluster,
            sync_period: Duration::from_secs(300),
            retry_interval: Duration::from_secs(60),
        }
    }
}

/// Reconcile one AzureCluster
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<AzureCluster>, ctx: Arc<Context>) -> Result<Action> {
    let timer = ReconcileTimer::start(cluster.name_any());
    match reconcile_cluster(&cluster, &ctx).await {
        Ok((action, outcome)) => {
            timer.finish(outcome);
            Ok(action)
        }
        Err(e) => {
            timer.finish(ReconcileOutcome::Fatal);
            Err(e)
        }
    }
}

async fn reconcile_cluster(
    cluster: &AzureCluster,
    ctx: &Context,
) -> Result<(Action, ReconcileOutcome)> {
    let skipped = Ok((Action::await_change(), ReconcileOutcome::Skipped));
    let key = cluster.object_key();
    if key == ctx.management_cluster {
        debug!("Skipping the management cluster");
        return skipped;
    }

    if cluster.metadata.deletion_timestamp.is_some() {
        return handle_deletion(cluster, ctx).await;
    }

    match cluster.api_server_lb_type() {
        LoadBalancerType::Public => {
            debug!("API server load balancer is public, nothing to do");
            return skipped;
        }
        LoadBalancerType::Internal => {}
        LoadBalancerType::Other(lb_type) => {
            return Err(Error::unknown_load_balancer_type(&key.name, lb_type));
        }
    }

    if !cluster.has_finalizer(ENDPOINTS_FINALIZER) {
        info!("Adding finalizer");
        ctx.store.add_finalizer(&key, ENDPOINTS_FINALIZER).await?;
    }

    let Some(mut wc) = ClusterScope::load(ctx.store.clone(), &key).await? else {
        debug!("Cluster is gone");
        return skipped;
    };
    let mut mc = load_management_cluster(ctx).await?;

    let pass = reconcile_private_cluster(&mut mc, &mut wc, ctx).await;
    let flushes = vec![mc.close().await, wc.close().await];

    match pass_outcome(pass, flushes) {
        Ok(()) => {
            debug!("Private endpoints are up to date");
            Ok((Action::requeue(ctx.sync_period), ReconcileOutcome::Success))
        }
        Err(e) if e.is_retryable() => {
            info!(
                reason = %e,
                waiting_on_cluster = e.cluster(),
                endpoint = e.endpoint(),
                "Private endpoints are still being provisioned, retrying"
            );
            Ok((Action::requeue(ctx.retry_interval), ReconcileOutcome::Retry))
        }
        Err(e) => Err(e),
    }
}

/// Error policy for the controller
///
/// Only fatal errors reach this point; they are retried at the sync period.
pub fn error_policy(cluster: Arc<AzureCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        cluster = %cluster.name_any(),
        failing_cluster = error.cluster(),
        endpoint = error.endpoint(),
        "reconciliation failed"
    );
    Action::requeue(ctx.sync_period)
}

async fn load_management_cluster(ctx: &Context) -> Result<ClusterScope> {
    ClusterScope::load(ctx.store.clone(), &ctx.management_cluster)
        .await?
        .ok_or_else(|| {
            Error::invalid_config(format!(
                "management cluster {} not found",
                ctx.management_cluster
            ))
        })
}

/// Management cluster endpoints to the workload API server, then the
/// workload cluster's endpoint to management ingress when applicable
///
/// A retryable failure of the first pass does not prevent the second.
async fn reconcile_private_cluster(
    mc: &mut ClusterScope,
    wc: &mut ClusterScope,
    ctx: &Context,
) -> Result<()> {
    let mc_identity = ClusterIdentity::from_cluster(mc.cluster())?;
    let mc_is_private = matches!(mc.cluster().api_server_lb_type(), LoadBalancerType::Internal);
    let ingress_link = links_allowing_subscription(
        mc.cluster().private_links(),
        &wc.cluster().spec.subscription_id,
    )
    .into_iter()
    .next();

    let mc_client = ctx.clients.endpoints_client(mc.cluster()).await?;
    let api_pass = {
        let endpoints = ClusterParts::split(mc.cluster_mut())?.into_endpoint_directory(mc_client)?;
        let links = ClusterParts::split(wc.cluster_mut())?.into_link_directory();
        ReconciliationService::new(endpoints, links).reconcile().await
    };
    if matches!(&api_pass, Err(e) if !e.is_retryable()) {
        return api_pass;
    }

    if let (true, Some(link)) = (mc_is_private, ingress_link) {
        let wc_client = ctx.clients.endpoints_client(wc.cluster()).await?;
        let (endpoints, links) = ClusterParts::split(wc.cluster_mut())?.into_directories(wc_client)?;
        let wanted = desired::ingress_endpoint(endpoints.identity(), &mc_identity, &link);
        ReconciliationService::new(endpoints, links)
            .reconcile_wc_to_mc_ingress(wanted)
            .await?;
    }

    api_pass
}

/// Tear down the management cluster's endpoints to a deleted workload cluster
///
/// Only the declared endpoints are edited, so no provider client is needed
/// and missing credentials cannot hold the finalizer.
async fn handle_deletion(
    cluster: &AzureCluster,
    ctx: &Context,
) -> Result<(Action, ReconcileOutcome)> {
    if !cluster.has_finalizer(ENDPOINTS_FINALIZER) {
        return Ok((Action::await_change(), ReconcileOutcome::Skipped));
    }
    let key = cluster.object_key();
    info!("Removing private endpoints of deleted cluster");

    let mut mc = load_management_cluster(ctx).await?;
    let mut wc = cluster.clone();
    let pass = delete_api_endpoints(&mut mc, &mut wc);
    pass_outcome(pass, vec![mc.close().await])?;

    ctx.store.remove_finalizer(&key, ENDPOINTS_FINALIZER).await?;
    info!("Removed finalizer");
    Ok((Action::await_change(), ReconcileOutcome::Success))
}

fn delete_api_endpoints(mc: &mut ClusterScope, wc: &mut AzureCluster) -> Result<()> {
    let endpoints = ClusterParts::split(mc.cluster_mut())?.into_removal_directory()?;
    let links = ClusterParts::split(wc)?.into_link_directory();
    ReconciliationService::new(endpoints, links).delete_mc_to_wc_api();
    Ok(())
}
