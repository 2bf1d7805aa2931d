//! Controller runner - builds the AzureCluster controller future

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use privlink_common::crd::AzureCluster;

use crate::controller::{error_policy, reconcile, Context};

/// Watch timeout in seconds, kept below the client's 30s read timeout so the
/// API server closes idle watches first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the AzureCluster controller, watching all namespaces
pub fn build_controller(client: Client, ctx: Arc<Context>) -> impl Future<Output = ()> + Send {
    let clusters: Api<AzureCluster> = Api::all(client);

    tracing::info!(
        management_cluster = %ctx.management_cluster,
        "- AzureCluster controller"
    );

    Controller::new(clusters, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("AzureCluster"))
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
