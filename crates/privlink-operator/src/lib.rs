//! privlink-operator - private endpoints between a management cluster and private workload clusters
//!
//! Watches AzureClusters. For every workload cluster whose API server sits
//! behind an internal load balancer, the management cluster gets a private
//! endpoint to each private link the workload cluster allows it to use, and
//! the resolved addresses are published as annotations on the workload
//! cluster for DNS automation to pick up.

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod health;
pub mod provider;
pub mod store;
