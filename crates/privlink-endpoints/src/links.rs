//! Private links published by a cluster

use std::collections::BTreeMap;
use std::net::IpAddr;

use tracing::debug;

use privlink_common::crd::{is_condition_true, ClusterCondition, PrivateLink};
use privlink_common::{
    MC_TO_WC_API_ADDRESS_ANNOTATION, PRIVATE_LINKS_READY_CONDITION,
    WC_TO_MC_INGRESS_ADDRESS_ANNOTATION,
};

use crate::desired::private_link_resource_id;
use crate::scope::{ClusterIdentity, Identity, LinkOps};

/// Which way a resolved endpoint address points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressDirection {
    /// Management cluster endpoint reaching a workload API server
    McToWcApi,
    /// Workload cluster endpoint reaching management cluster ingress
    WcToMcIngress,
}

impl AddressDirection {
    /// Annotation the address is recorded under
    pub fn annotation_key(self) -> &'static str {
        match self {
            Self::McToWcApi => MC_TO_WC_API_ADDRESS_ANNOTATION,
            Self::WcToMcIngress => WC_TO_MC_INGRESS_ADDRESS_ANNOTATION,
        }
    }
}

/// Declared links allowing connections from `subscription_id`, in declaration order
pub fn links_allowing_subscription(links: &[PrivateLink], subscription_id: &str) -> Vec<PrivateLink> {
    links
        .iter()
        .filter(|link| link.allows(subscription_id))
        .cloned()
        .collect()
}

/// View over a cluster's private links, readiness and address annotations
pub struct LinkDirectory<'a> {
    identity: ClusterIdentity,
    links: &'a [PrivateLink],
    conditions: &'a [ClusterCondition],
    annotations: &'a mut Option<BTreeMap<String, String>>,
}

impl<'a> LinkDirectory<'a> {
    /// Build the view from borrowed cluster parts
    pub fn new(
        identity: ClusterIdentity,
        links: &'a [PrivateLink],
        conditions: &'a [ClusterCondition],
        annotations: &'a mut Option<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            identity,
            links,
            conditions,
            annotations,
        }
    }

    /// Address currently recorded for a direction
    pub fn resolved_address(&self, direction: AddressDirection) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(direction.annotation_key()))
            .map(String::as_str)
    }
}

impl Identity for LinkDirectory<'_> {
    fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }
}

impl LinkOps for LinkDirectory<'_> {
    fn lookup_by_identifier(&self, resource_id: &str) -> Option<&PrivateLink> {
        self.links.iter().find(|link| {
            private_link_resource_id(
                &self.identity.subscription_id,
                &self.identity.resource_group,
                &link.name,
            ) == resource_id
        })
    }

    fn links_allowing_subscription(&self, subscription_id: &str) -> Vec<PrivateLink> {
        links_allowing_subscription(self.links, subscription_id)
    }

    fn declared_links(&self) -> &[PrivateLink] {
        self.links
    }

    fn ready(&self) -> bool {
        is_condition_true(self.conditions, PRIVATE_LINKS_READY_CONDITION)
    }

    fn set_resolved_address(&mut self, direction: AddressDirection, address: IpAddr) {
        let value = address.to_string();
        if self.resolved_address(direction) == Some(value.as_str()) {
            return;
        }
        debug!(
            cluster = %self.identity.name,
            annotation = direction.annotation_key(),
            address = %value,
            "Recording private endpoint address"
        );
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(direction.annotation_key().to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ClusterParts;
    use crate::testing::{link, workload_cluster, WC_SUBSCRIPTION};
    use privlink_common::crd::ConditionStatus;
    use rstest::rstest;

    #[test]
    fn lookup_reconstructs_canonical_identifier() {
        let mut wc = workload_cluster(vec![link("a", &[], &[]), link("b", &[], &[])], None);
        let directory = ClusterParts::split(&mut wc).unwrap().into_link_directory();

        let id = private_link_resource_id(WC_SUBSCRIPTION, "wc1", "b");
        assert_eq!(directory.lookup_by_identifier(&id).map(|l| l.name.as_str()), Some("b"));

        let foreign = private_link_resource_id("other", "wc1", "b");
        assert!(directory.lookup_by_identifier(&foreign).is_none());
        assert!(directory
            .lookup_by_identifier(&private_link_resource_id(WC_SUBSCRIPTION, "wc1", "c"))
            .is_none());
    }

    #[test]
    fn filter_keeps_declaration_order() {
        let mut wc = workload_cluster(
            vec![
                link("a", &["1234"], &[]),
                link("b", &["9999"], &[]),
                link("c", &["9999", "1234"], &[]),
            ],
            None,
        );
        let directory = ClusterParts::split(&mut wc).unwrap().into_link_directory();

        let names: Vec<_> = directory
            .links_allowing_subscription("1234")
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(directory.links_allowing_subscription("0000").is_empty());
        assert_eq!(directory.declared_links().len(), 3);
    }

    #[rstest]
    #[case::ready(Some(ConditionStatus::True), true)]
    #[case::not_ready(Some(ConditionStatus::False), false)]
    #[case::unknown(Some(ConditionStatus::Unknown), false)]
    #[case::absent(None, false)]
    fn readiness_is_explicit_true_only(
        #[case] status: Option<ConditionStatus>,
        #[case] expected: bool,
    ) {
        let mut wc = workload_cluster(vec![link("a", &["1234"], &[])], status);
        let directory = ClusterParts::split(&mut wc).unwrap().into_link_directory();
        assert_eq!(directory.ready(), expected);
    }

    #[test]
    fn addresses_are_written_per_direction() {
        let mut wc = workload_cluster(vec![], None);
        {
            let mut directory = ClusterParts::split(&mut wc).unwrap().into_link_directory();
            directory.set_resolved_address(
                AddressDirection::McToWcApi,
                "10.10.10.10".parse().unwrap(),
            );
            directory.set_resolved_address(
                AddressDirection::WcToMcIngress,
                "10.1.0.4".parse().unwrap(),
            );
            directory.set_resolved_address(
                AddressDirection::McToWcApi,
                "10.10.10.11".parse().unwrap(),
            );
        }

        assert_eq!(
            wc.annotation(MC_TO_WC_API_ADDRESS_ANNOTATION),
            Some("10.10.10.11")
        );
        assert_eq!(
            wc.annotation(WC_TO_MC_INGRESS_ADDRESS_ANNOTATION),
            Some("10.1.0.4")
        );
    }

    #[test]
    fn unchanged_address_leaves_annotations_untouched() {
        let mut wc = workload_cluster(vec![], None);
        wc.metadata.annotations = Some(BTreeMap::from([(
            MC_TO_WC_API_ADDRESS_ANNOTATION.to_string(),
            "10.10.10.10".to_string(),
        )]));
        let before = wc.clone();
        {
            let mut directory = ClusterParts::split(&mut wc).unwrap().into_link_directory();
            directory.set_resolved_address(
                AddressDirection::McToWcApi,
                "10.10.10.10".parse().unwrap(),
            );
        }
        assert_eq!(wc, before);
    }

    #[test]
    fn no_write_means_no_annotation_map() {
        let mut wc = workload_cluster(vec![], None);
        let directory = ClusterParts::split(&mut wc).unwrap().into_link_directory();
        assert_eq!(directory.resolved_address(AddressDirection::McToWcApi), None);
        drop(directory);
        assert!(wc.metadata.annotations.is_none());
    }
}
