//! Loading and persisting AzureClusters
//!
//! A [`ClusterScope`] holds a loaded cluster plus the snapshot it was loaded
//! as. Reconciliation mutates the cluster in memory; closing the scope sends
//! the difference back as one merge patch pinned to the loaded
//! `resourceVersion`, so a concurrent writer makes the patch fail instead of
//! being overwritten.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::{json, Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use privlink_common::crd::{AzureCluster, ObjectKey};
use privlink_common::{Error, Result, FIELD_MANAGER};

/// Access to AzureCluster objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Load a cluster, `None` if it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<AzureCluster>>;

    /// Write back the changes between `before` and `after`
    async fn persist(&self, before: &AzureCluster, after: &AzureCluster) -> Result<()>;

    /// Add a finalizer unless already present
    async fn add_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<()>;

    /// Remove a finalizer if present
    async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<()>;
}

/// Merge patch carrying the annotation and subnet changes between two versions
///
/// Returns `None` when neither changed. Removed annotations are sent as
/// `null`. The subnet list is sent whole, as merge patches replace arrays.
pub fn persist_patch(before: &AzureCluster, after: &AzureCluster) -> Result<Option<Value>> {
    let mut metadata = Map::new();
    let mut patch = Map::new();

    let old = before.metadata.annotations.clone().unwrap_or_default();
    let new = after.metadata.annotations.clone().unwrap_or_default();
    let mut annotations = Map::new();
    for (key, value) in &new {
        if old.get(key) != Some(value) {
            annotations.insert(key.clone(), Value::String(value.clone()));
        }
    }
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        annotations.insert(key.clone(), Value::Null);
    }
    if !annotations.is_empty() {
        metadata.insert("annotations".into(), Value::Object(annotations));
    }

    if before.spec.network_spec.subnets != after.spec.network_spec.subnets {
        let subnets = serde_json::to_value(&after.spec.network_spec.subnets)?;
        patch.insert("spec".into(), json!({ "networkSpec": { "subnets": subnets } }));
    }

    if metadata.is_empty() && patch.is_empty() {
        return Ok(None);
    }

    if let Some(version) = &before.metadata.resource_version {
        metadata.insert("resourceVersion".into(), Value::String(version.clone()));
    }
    patch.insert("metadata".into(), Value::Object(metadata));
    Ok(Some(Value::Object(patch)))
}

/// Kubernetes-backed cluster store
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<AzureCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(&self, key: &ObjectKey, finalizers: Vec<String>) -> Result<()> {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.api(&key.namespace)
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<AzureCluster>> {
        match self.api(&key.namespace).get(&key.name).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, before: &AzureCluster, after: &AzureCluster) -> Result<()> {
        let Some(patch) = persist_patch(before, after)? else {
            return Ok(());
        };
        let key = after.object_key();
        debug!(cluster = %key, "Persisting AzureCluster changes");
        self.api(&key.namespace)
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn add_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<()> {
        let cluster = self.api(&key.namespace).get(&key.name).await?;
        let mut finalizers = cluster.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(key, finalizers).await
    }

    async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> Result<()> {
        let cluster = match self.api(&key.namespace).get(&key.name).await {
            Ok(cluster) => cluster,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let finalizers = cluster.metadata.finalizers.unwrap_or_default();
        if !finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let remaining = finalizers.into_iter().filter(|f| f != finalizer).collect();
        self.patch_finalizers(key, remaining).await
    }
}

/// A loaded cluster whose in-memory changes are flushed on [`close`](Self::close)
pub struct ClusterScope {
    store: Arc<dyn ClusterStore>,
    original: AzureCluster,
    current: AzureCluster,
}

impl ClusterScope {
    /// Load a cluster, `None` if it does not exist
    pub async fn load(store: Arc<dyn ClusterStore>, key: &ObjectKey) -> Result<Option<Self>> {
        Ok(store
            .get(key)
            .await?
            .map(|cluster| Self::from_cluster(store, cluster)))
    }

    /// Wrap an already loaded cluster
    pub fn from_cluster(store: Arc<dyn ClusterStore>, cluster: AzureCluster) -> Self {
        Self {
            store,
            original: cluster.clone(),
            current: cluster,
        }
    }

    /// The cluster with in-memory changes applied
    pub fn cluster(&self) -> &AzureCluster {
        &self.current
    }

    /// Mutable access for a reconciliation pass
    pub fn cluster_mut(&mut self) -> &mut AzureCluster {
        &mut self.current
    }

    /// Whether the cluster was changed since it was loaded
    pub fn is_dirty(&self) -> bool {
        self.original != self.current
    }

    /// Flush pending changes, if any
    pub async fn close(self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        self.store.persist(&self.original, &self.current).await
    }
}

/// Outcome of a pass after flushing its scopes
///
/// A fatal pass error wins over flush errors; otherwise the first flush error
/// wins over a retryable pass error, since unsaved progress must be redone.
pub fn pass_outcome(pass: Result<()>, flushes: Vec<Result<()>>) -> Result<()> {
    if matches!(&pass, Err(e) if !e.is_retryable()) {
        return pass;
    }
    for flush in flushes {
        flush?;
    }
    pass
}

impl std::fmt::Debug for ClusterScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterScope")
            .field("cluster", &self.current.object_key())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
