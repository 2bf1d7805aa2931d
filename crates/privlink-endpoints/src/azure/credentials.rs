//! Azure AD credentials
//!
//! The credential kind is resolved once, when the client for a cluster is
//! built. Tokens are cached until shortly before they expire.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use privlink_common::{Error, Result};

/// Azure AD authority for the public cloud
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Instance metadata service address
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";

/// Resource tokens are requested for
pub const DEFAULT_RESOURCE: &str = "https://management.azure.com/";

const IMDS_API_VERSION: &str = "2018-02-01";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Tokens closer than this to expiry are refreshed
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Source of bearer tokens for the Resource Manager API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A valid access token
    async fn token(&self) -> Result<String>;
}

/// How a cluster identity authenticates against Azure AD
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// User-assigned managed identity via the instance metadata service
    ManagedIdentity {
        /// Client ID of the identity
        client_id: String,
    },
    /// Service principal with a client secret
    ClientSecret {
        /// Azure AD tenant
        tenant_id: String,
        /// Application (client) ID
        client_id: String,
        /// The client secret
        client_secret: String,
    },
    /// Federated credential exchanged for a projected service account token
    WorkloadIdentity {
        /// Azure AD tenant
        tenant_id: String,
        /// Application (client) ID
        client_id: String,
        /// File holding the service account token
        token_file: PathBuf,
    },
}

impl CredentialKind {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::ManagedIdentity { .. } => "managed identity",
            Self::ClientSecret { .. } => "client secret",
            Self::WorkloadIdentity { .. } => "workload identity",
        }
    }

    /// Client ID of the identity
    pub fn client_id(&self) -> &str {
        match self {
            Self::ManagedIdentity { client_id }
            | Self::ClientSecret { client_id, .. }
            | Self::WorkloadIdentity { client_id, .. } => client_id,
        }
    }
}

impl fmt::Debug for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
            Self::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::WorkloadIdentity {
                tenant_id,
                client_id,
                token_file,
            } => f
                .debug_struct("WorkloadIdentity")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("token_file", token_file)
                .finish(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Seconds>,
}

/// IMDS reports `expires_in` as a string, Azure AD as a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        let secs = match &self.expires_in {
            Some(Seconds::Number(n)) => *n,
            Some(Seconds::Text(s)) => s.parse().unwrap_or(0),
            None => 0,
        };
        Duration::from_secs(secs)
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Token provider for one cluster identity
pub struct AzureCredential {
    kind: CredentialKind,
    http: reqwest::Client,
    authority_host: String,
    imds_endpoint: String,
    resource: String,
    cache: Mutex<Option<CachedToken>>,
}

impl AzureCredential {
    /// Create a credential for the public cloud
    pub fn new(kind: CredentialKind) -> Self {
        Self {
            kind,
            http: reqwest::Client::new(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            imds_endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Override the Azure AD authority
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    /// Override the instance metadata service address
    pub fn with_imds_endpoint(mut self, imds_endpoint: impl Into<String>) -> Self {
        self.imds_endpoint = imds_endpoint.into();
        self
    }

    /// Override the resource tokens are requested for
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// The credential kind
    pub fn kind(&self) -> &CredentialKind {
        &self.kind
    }

    fn scope(&self) -> String {
        format!("{}/.default", self.resource.trim_end_matches('/'))
    }

    fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            tenant_id
        )
    }

    async fn fetch(&self) -> Result<TokenResponse> {
        let request = match &self.kind {
            CredentialKind::ManagedIdentity { client_id } => self
                .http
                .get(format!(
                    "{}/metadata/identity/oauth2/token",
                    self.imds_endpoint.trim_end_matches('/')
                ))
                .header("Metadata", "true")
                .query(&[
                    ("api-version", IMDS_API_VERSION),
                    ("resource", self.resource.as_str()),
                    ("client_id", client_id.as_str()),
                ]),
            CredentialKind::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => self.http.post(self.token_url(tenant_id)).form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", self.scope().as_str()),
            ]),
            CredentialKind::WorkloadIdentity {
                tenant_id,
                client_id,
                token_file,
            } => {
                let assertion = tokio::fs::read_to_string(token_file).await.map_err(|e| {
                    Error::credentials(format!(
                        "failed to read federated token file {}: {}",
                        token_file.display(),
                        e
                    ))
                })?;
                self.http.post(self.token_url(tenant_id)).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                    ("client_assertion", assertion.trim()),
                    ("scope", self.scope().as_str()),
                ])
            }
        };

        let response = request.send().await.map_err(|e| {
            Error::credentials(format!("{} token request failed: {}", self.kind.name(), e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::credentials(format!(
                "{} token request returned {}: {}",
                self.kind.name(),
                status,
                body
            )));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            Error::credentials(format!(
                "invalid {} token response: {}",
                self.kind.name(),
                e
            ))
        })
    }
}

#[async_trait]
impl TokenProvider for AzureCredential {
    async fn token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.token.clone());
        }

        let response = self.fetch().await?;
        debug!(
            credential = self.kind.name(),
            client_id = %self.kind.client_id(),
            lifetime_secs = response.lifetime().as_secs(),
            "Acquired access token"
        );
        *cache = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at: Instant::now() + response.lifetime(),
        });
        Ok(response.access_token)
    }
}
