//! Resource Manager client for private endpoints

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::trace;

use privlink_common::{Error, Result};

use super::{PrivateEndpointResource, PrivateEndpointsClient, TokenProvider};

/// Resource Manager endpoint for the public cloud
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// API version used for private endpoint lookups
pub const PRIVATE_ENDPOINTS_API_VERSION: &str = "2023-09-01";

/// Private endpoints client for one subscription
pub struct ArmPrivateEndpointsClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    credential: Arc<dyn TokenProvider>,
}

impl ArmPrivateEndpointsClient {
    /// Create a client against the public cloud
    pub fn new(subscription_id: impl Into<String>, credential: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            subscription_id: subscription_id.into(),
            credential,
        }
    }

    /// Override the Resource Manager endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Subscription the client looks resources up in
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    fn url(&self, resource_group: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/privateEndpoints/{}",
            self.endpoint.trim_end_matches('/'),
            self.subscription_id,
            resource_group,
            name
        )
    }
}

#[async_trait]
impl PrivateEndpointsClient for ArmPrivateEndpointsClient {
    async fn get(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<Option<PrivateEndpointResource>> {
        let token = self.credential.token().await?;
        let url = self.url(resource_group, name);
        trace!(url = %url, "Fetching private endpoint");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("api-version", PRIVATE_ENDPOINTS_API_VERSION),
                ("$expand", "NetworkInterfaces"),
            ])
            .send()
            .await
            .map_err(|e| Error::provider(format!("failed to get private endpoint {}: {}", name, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider_status(
                status.as_u16(),
                format!("get private endpoint {} returned {}: {}", name, status, body),
            ));
        }

        let resource = response.json::<PrivateEndpointResource>().await.map_err(|e| {
            Error::provider(format!("invalid private endpoint {} response: {}", name, e))
        })?;
        Ok(Some(resource))
    }
}
