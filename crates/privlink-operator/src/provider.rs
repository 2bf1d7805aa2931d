//! Authenticated provisioning clients per cluster
//!
//! A cluster's `identityRef` points at an AzureClusterIdentity. The identity
//! is resolved into a [`CredentialKind`] each time a client is requested, so
//! rotated secrets are picked up; clients and their token caches are shared
//! between reconciliations for as long as the credential stays the same.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use parking_lot::Mutex;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use privlink_common::crd::{
    AzureCluster, AzureClusterIdentity, AzureClusterIdentitySpec, IdentityType, ObjectKey,
};
use privlink_common::{Error, Result, CLIENT_SECRET_KEY};
use privlink_endpoints::azure::{ArmPrivateEndpointsClient, AzureCredential, CredentialKind};
use privlink_endpoints::PrivateEndpointsClient;

/// Builds provisioning clients authenticated as a cluster's identity
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Client for the private endpoints of `cluster`'s subscription
    async fn endpoints_client(&self, cluster: &AzureCluster) -> Result<Arc<dyn PrivateEndpointsClient>>;
}

/// Map an identity to the credential it authenticates with
///
/// `client_secret` is the content of the identity's secret, when it has one.
pub fn credential_kind(
    identity: &AzureClusterIdentitySpec,
    client_secret: Option<String>,
    token_file: &Path,
) -> Result<CredentialKind> {
    if identity.client_id.is_empty() {
        return Err(Error::invalid_config("cluster identity has no clientID"));
    }
    let client_id = identity.client_id.clone();

    match &identity.identity_type {
        IdentityType::UserAssignedMsi => Ok(CredentialKind::ManagedIdentity { client_id }),
        IdentityType::ManualServicePrincipal => {
            let tenant_id = require_tenant(identity)?;
            let client_secret = client_secret
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::credentials("service principal identity has no client secret"))?;
            Ok(CredentialKind::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            })
        }
        IdentityType::WorkloadIdentity => Ok(CredentialKind::WorkloadIdentity {
            tenant_id: require_tenant(identity)?,
            client_id,
            token_file: token_file.to_path_buf(),
        }),
        IdentityType::Other(other) => Err(Error::credentials(format!(
            "unsupported identity type {}",
            other
        ))),
    }
}

fn require_tenant(identity: &AzureClusterIdentitySpec) -> Result<String> {
    if identity.tenant_id.is_empty() {
        return Err(Error::invalid_config("cluster identity has no tenantID"));
    }
    Ok(identity.tenant_id.clone())
}

/// Subscription plus the AzureClusterIdentity a client authenticates as
type ClientCacheKey = (String, ObjectKey);

struct CachedClient {
    kind: CredentialKind,
    client: Arc<ArmPrivateEndpointsClient>,
}

/// One client per subscription and identity
///
/// A changed credential for the same identity (a rotated secret) replaces
/// the cached client instead of adding another.
#[derive(Default)]
struct ClientCache {
    entries: Mutex<HashMap<ClientCacheKey, CachedClient>>,
}

impl ClientCache {
    fn get_or_create(
        &self,
        key: ClientCacheKey,
        kind: CredentialKind,
        create: impl FnOnce(&CredentialKind) -> ArmPrivateEndpointsClient,
    ) -> Arc<ArmPrivateEndpointsClient> {
        let mut entries = self.entries.lock();
        if let Some(cached) = entries.get(&key).filter(|c| c.kind == kind) {
            return cached.client.clone();
        }
        let client = Arc::new(create(&kind));
        entries.insert(
            key,
            CachedClient {
                kind,
                client: client.clone(),
            },
        );
        client
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Factory creating Azure Resource Manager clients from cluster identities
pub struct ArmClientFactory {
    client: Client,
    arm_endpoint: String,
    authority_host: String,
    token_file: PathBuf,
    cache: ClientCache,
}

impl ArmClientFactory {
    /// Create a factory resolving identities through `client`
    pub fn new(
        client: Client,
        arm_endpoint: impl Into<String>,
        authority_host: impl Into<String>,
        token_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            arm_endpoint: arm_endpoint.into(),
            authority_host: authority_host.into(),
            token_file: token_file.into(),
            cache: ClientCache::default(),
        }
    }

    async fn resolve_credential(&self, cluster: &AzureCluster) -> Result<(ObjectKey, CredentialKind)> {
        let reference = cluster.spec.identity_ref.as_ref().ok_or_else(|| {
            Error::invalid_config(format!("cluster {} has no identityRef", cluster.name_any()))
        })?;
        let namespace = if reference.namespace.is_empty() {
            cluster.namespace().unwrap_or_default()
        } else {
            reference.namespace.clone()
        };

        let identities: Api<AzureClusterIdentity> = Api::namespaced(self.client.clone(), &namespace);
        let identity = identities.get_opt(&reference.name).await?.ok_or_else(|| {
            Error::invalid_config(format!(
                "AzureClusterIdentity {}/{} not found",
                namespace, reference.name
            ))
        })?;

        let client_secret = match &identity.spec.client_secret {
            Some(secret_ref) if identity.spec.identity_type == IdentityType::ManualServicePrincipal => {
                let secret_namespace = if secret_ref.namespace.is_empty() {
                    namespace.as_str()
                } else {
                    secret_ref.namespace.as_str()
                };
                self.read_client_secret(secret_namespace, &secret_ref.name).await?
            }
            _ => None,
        };

        let kind = credential_kind(&identity.spec, client_secret, &self.token_file)?;
        Ok((ObjectKey::new(namespace, &reference.name), kind))
    }

    async fn read_client_secret(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = secrets.get_opt(name).await? else {
            return Err(Error::credentials(format!(
                "client secret {}/{} not found",
                namespace, name
            )));
        };
        secret
            .data
            .and_then(|mut data| data.remove(CLIENT_SECRET_KEY))
            .map(|bytes| {
                String::from_utf8(bytes.0).map_err(|_| {
                    Error::credentials(format!(
                        "client secret {}/{} is not valid UTF-8",
                        namespace, name
                    ))
                })
            })
            .transpose()
    }
}

#[async_trait]
impl ClientFactory for ArmClientFactory {
    async fn endpoints_client(&self, cluster: &AzureCluster) -> Result<Arc<dyn PrivateEndpointsClient>> {
        let subscription_id = cluster.spec.subscription_id.clone();
        let (identity, kind) = self.resolve_credential(cluster).await?;

        let client = self
            .cache
            .get_or_create((subscription_id.clone(), identity), kind, |kind| {
                debug!(
                    cluster = %cluster.name_any(),
                    credential = kind.name(),
                    client_id = kind.client_id(),
                    "Creating private endpoints client"
                );
                let credential = AzureCredential::new(kind.clone())
                    .with_authority_host(self.authority_host.clone());
                ArmPrivateEndpointsClient::new(subscription_id, Arc::new(credential))
                    .with_endpoint(self.arm_endpoint.clone())
            });
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privlink_common::crd::SecretReference;
    use rstest::rstest;

    fn identity(identity_type: IdentityType, tenant: &str) -> AzureClusterIdentitySpec {
        AzureClusterIdentitySpec {
            identity_type,
            client_id: "client".into(),
            tenant_id: tenant.into(),
            client_secret: Some(SecretReference {
                name: "sp".into(),
                namespace: String::new(),
            }),
            ..Default::default()
        }
    }

    fn token_file() -> PathBuf {
        PathBuf::from("/var/run/token")
    }

    #[test]
    fn managed_identity_needs_only_a_client_id() {
        let kind = credential_kind(&identity(IdentityType::UserAssignedMsi, ""), None, &token_file())
            .unwrap();
        assert_eq!(
            kind,
            CredentialKind::ManagedIdentity {
                client_id: "client".into()
            }
        );
    }

    #[test]
    fn service_principal_uses_the_secret() {
        let kind = credential_kind(
            &identity(IdentityType::ManualServicePrincipal, "tenant"),
            Some("s3cret".into()),
            &token_file(),
        )
        .unwrap();
        assert_eq!(
            kind,
            CredentialKind::ClientSecret {
                tenant_id: "tenant".into(),
                client_id: "client".into(),
                client_secret: "s3cret".into(),
            }
        );
        assert!(!format!("{:?}", kind).contains("s3cret"));
    }

    #[test]
    fn workload_identity_uses_the_token_file() {
        let kind = credential_kind(
            &identity(IdentityType::WorkloadIdentity, "tenant"),
            None,
            &token_file(),
        )
        .unwrap();
        assert_eq!(
            kind,
            CredentialKind::WorkloadIdentity {
                tenant_id: "tenant".into(),
                client_id: "client".into(),
                token_file: token_file(),
            }
        );
    }

    #[rstest]
    #[case::missing_secret(IdentityType::ManualServicePrincipal, "tenant", None)]
    #[case::empty_secret(IdentityType::ManualServicePrincipal, "tenant", Some(""))]
    #[case::unsupported_type(IdentityType::Other("ServicePrincipalCertificate".into()), "tenant", None)]
    fn credential_errors(
        #[case] identity_type: IdentityType,
        #[case] tenant: &str,
        #[case] secret: Option<&str>,
    ) {
        let err = credential_kind(
            &identity(identity_type, tenant),
            secret.map(String::from),
            &token_file(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Credentials { .. }));
        assert!(!err.is_retryable());
    }

    #[rstest]
    #[case::sp_without_tenant(IdentityType::ManualServicePrincipal)]
    #[case::workload_without_tenant(IdentityType::WorkloadIdentity)]
    fn tenant_is_required(#[case] identity_type: IdentityType) {
        let err = credential_kind(&identity(identity_type, ""), Some("s".into()), &token_file())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    fn secret_kind(secret: &str) -> CredentialKind {
        CredentialKind::ClientSecret {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: secret.into(),
        }
    }

    fn arm_client(kind: &CredentialKind) -> ArmPrivateEndpointsClient {
        ArmPrivateEndpointsClient::new("1234", Arc::new(AzureCredential::new(kind.clone())))
    }

    fn cache_key() -> ClientCacheKey {
        ("1234".into(), ObjectKey::new("org-giantswarm", "mc-identity"))
    }

    #[test]
    fn unchanged_credential_reuses_the_client() {
        let cache = ClientCache::default();
        let first = cache.get_or_create(cache_key(), secret_kind("a"), arm_client);
        let second = cache.get_or_create(cache_key(), secret_kind("a"), |_| {
            panic!("client should have been reused")
        });
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rotated_secret_replaces_the_client() {
        let cache = ClientCache::default();
        let first = cache.get_or_create(cache_key(), secret_kind("a"), arm_client);
        let rotated = cache.get_or_create(cache_key(), secret_kind("b"), arm_client);
        let again = cache.get_or_create(cache_key(), secret_kind("c"), arm_client);

        assert!(!Arc::ptr_eq(&first, &rotated));
        assert!(!Arc::ptr_eq(&rotated, &again));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn identities_are_cached_separately() {
        let cache = ClientCache::default();
        cache.get_or_create(cache_key(), secret_kind("a"), arm_client);
        cache.get_or_create(
            ("1234".into(), ObjectKey::new("org-acme", "wc-identity")),
            secret_kind("a"),
            arm_client,
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn client_id_is_required() {
        let mut spec = identity(IdentityType::UserAssignedMsi, "");
        spec.client_id.clear();
        let err = credential_kind(&spec, None, &token_file()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
