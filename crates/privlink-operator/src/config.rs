//! Operator configuration from command-line flags and environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use privlink_common::crd::ObjectKey;
use privlink_common::telemetry::LogFormat;
use privlink_common::{Error, Result};
use privlink_endpoints::azure::{DEFAULT_ARM_ENDPOINT, DEFAULT_AUTHORITY_HOST};

/// Default location of the projected service account token for workload identity
pub const DEFAULT_FEDERATED_TOKEN_FILE: &str = "/var/run/secrets/azure/tokens/azure-identity-token";

/// privlink-operator - private endpoints between a management cluster and private workload clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "privlink-operator", version, about, long_about = None)]
pub struct Config {
    /// Name of the management cluster's AzureCluster
    #[arg(long, env = "PRIVLINK_MANAGEMENT_CLUSTER_NAME")]
    pub management_cluster_name: String,

    /// Namespace of the management cluster's AzureCluster
    #[arg(long, env = "PRIVLINK_MANAGEMENT_CLUSTER_NAMESPACE")]
    pub management_cluster_namespace: String,

    /// Seconds between reconciliations of a converged cluster, and after fatal errors
    #[arg(long, env = "PRIVLINK_SYNC_PERIOD", default_value_t = 300)]
    pub sync_period: u64,

    /// Seconds before retrying a cluster whose links or endpoints are still being provisioned
    #[arg(long, env = "PRIVLINK_RETRY_INTERVAL", default_value_t = 60)]
    pub retry_interval: u64,

    /// Log output format (json or text)
    #[arg(long, env = "PRIVLINK_LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Address the liveness and readiness probes are served on
    #[arg(long, env = "PRIVLINK_HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: SocketAddr,

    /// Azure Resource Manager endpoint
    #[arg(long, env = "PRIVLINK_ARM_ENDPOINT", default_value = DEFAULT_ARM_ENDPOINT)]
    pub arm_endpoint: String,

    /// Azure AD authority used for service principal and workload identity tokens
    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    pub azure_authority_host: String,

    /// Projected service account token exchanged for workload identity tokens
    #[arg(long, env = "AZURE_FEDERATED_TOKEN_FILE", default_value = DEFAULT_FEDERATED_TOKEN_FILE)]
    pub azure_federated_token_file: PathBuf,

    /// OTLP collector receiving reconciliation metrics; metrics are not exported when unset
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Reject values clap cannot rule out on its own
    pub fn validate(&self) -> Result<()> {
        if self.management_cluster_name.trim().is_empty() {
            return Err(Error::invalid_config("management cluster name must not be empty"));
        }
        if self.management_cluster_namespace.trim().is_empty() {
            return Err(Error::invalid_config(
                "management cluster namespace must not be empty",
            ));
        }
        if self.sync_period == 0 {
            return Err(Error::invalid_config("sync period must be positive"));
        }
        if self.retry_interval == 0 {
            return Err(Error::invalid_config("retry interval must be positive"));
        }
        Ok(())
    }

    /// The management cluster's AzureCluster
    pub fn management_cluster(&self) -> ObjectKey {
        ObjectKey::new(
            &self.management_cluster_namespace,
            &self.management_cluster_name,
        )
    }

    /// Requeue interval after success and after fatal errors
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period)
    }

    /// Requeue interval after retryable errors
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(extra: &[&str]) -> Config {
        let mut args = vec![
            "privlink-operator",
            "--management-cluster-name",
            "glippy",
            "--management-cluster-namespace",
            "org-giantswarm",
        ];
        args.extend_from_slice(extra);
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        assert_eq!(config.sync_period(), Duration::from_secs(300));
        assert_eq!(config.retry_interval(), Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.health_probe_bind_address,
            "0.0.0.0:8081".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.arm_endpoint, DEFAULT_ARM_ENDPOINT);
        assert_eq!(
            config.management_cluster(),
            ObjectKey::new("org-giantswarm", "glippy")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides() {
        let config = parse(&[
            "--sync-period",
            "120",
            "--retry-interval",
            "15",
            "--log-format",
            "text",
            "--otlp-endpoint",
            "http://otel-collector:4317",
        ]);
        assert_eq!(config.sync_period(), Duration::from_secs(120));
        assert_eq!(config.retry_interval(), Duration::from_secs(15));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(
            config.otlp_endpoint.as_deref(),
            Some("http://otel-collector:4317")
        );
    }

    #[rstest]
    #[case::blank_name(|c: &mut Config| c.management_cluster_name = " ".into())]
    #[case::blank_namespace(|c: &mut Config| c.management_cluster_namespace = String::new())]
    #[case::zero_sync(|c: &mut Config| c.sync_period = 0)]
    #[case::zero_retry(|c: &mut Config| c.retry_interval = 0)]
    fn invalid_values_are_rejected(#[case] break_config: fn(&mut Config)) {
        let mut config = parse(&[]);
        break_config(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn unknown_log_format_fails_to_parse() {
        let result = Config::try_parse_from([
            "privlink-operator",
            "--management-cluster-name",
            "mc",
            "--management-cluster-namespace",
            "ns",
            "--log-format",
            "xml",
        ]);
        assert!(result.is_err());
    }
}
