//! Grafana Terraform Provider
//!
//! This crate implements a Terraform provider for Grafana using the
//! Terraform Plugin Protocol v6.

pub mod config;
pub mod data_sources;
pub mod error;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod state;

pub mod tfplugin6 {
    tonic::include_proto!("tfplugin6");
}

pub use provider::GrafanaProvider;
pub use server::{serve, ProviderService};
