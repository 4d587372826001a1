//! # elk-infra - ELK logging stack topology for AWS
//!
//! elk-infra declares the cloud resources that host an Elasticsearch,
//! Logstash and Kibana deployment on ECS Fargate. It does not talk to a
//! cloud API. Instead it builds a typed resource dependency graph and renders
//! it into a deterministic manifest that a provisioning engine applies.
//!
//! ## Core Concepts
//!
//! - **Stacks**: Network, Security, Data, Compute and Monitoring, built in
//!   that order; each takes its upstream stacks by reference
//! - **Blueprint**: the resource registry; enforces unique names, stack
//!   ordering and common tags
//! - **Inputs**: property values that may be literal or deferred
//!   (`${resource.attribute}`) until the engine applies the manifest
//! - **Manifest**: the rendered desired state, fingerprinted with SHA-256
//! - **Snapshots**: recorded manifests that `plan` diffs against
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         CLI Interface                         │
//! │            (synth, plan, graph, outputs, validate)            │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Deployment                           │
//! │   Network ─► Security ─► Data ─► Compute ─► Monitoring        │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!              ┌─────────────────┼─────────────────┐
//!              ▼                 ▼                 ▼
//!     ┌────────────────┐ ┌───────────────┐ ┌────────────────┐
//!     │   Blueprint    │ │ ResourceGraph │ │    Provider    │
//!     │ (specs + tags) │ │  (petgraph)   │ │ (AZs, account) │
//!     └────────────────┘ └───────────────┘ └────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │              Manifest ─► Snapshot store ─► Plan               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use elk_infra::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::load(None)?.validate()?;
//!     let deployment = Deployment::build(&config)?;
//!
//!     let manifest = deployment.manifest();
//!     println!("{}", manifest.to_json()?);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::config::{Config, StackConfig};
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::graph::{Blueprint, Input, Manifest, Reference, ResourceHandle, ResourceKind, StackKind};
    pub use crate::provider::{Provider, StaticProvider};
    pub use crate::stacks::{Deployment, LoggingComponent};
    pub use crate::state::{DiffEngine, JsonPersistence, PlanReport, Snapshot, StatePersistence};
    pub use crate::tags::Tags;
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// The main [`Error`](error::Error) enum covers configuration, declaration,
/// ordering, provider lookup and state store failures.
pub mod error;

/// Configuration loading, environment overrides and validation.
pub mod config;

/// Tag sets and the common tags applied to every taggable resource.
pub mod tags;

// ============================================================================
// Resource Graph
// ============================================================================

/// Resource declarations, deferred inputs, the dependency graph and the
/// rendered manifest.
pub mod graph;

/// Typed AWS property builders (CIDRs, security rules, IAM documents,
/// container definitions, load balancer actions).
pub mod aws;

/// Lookups answered by the cloud provider at declaration time.
pub mod provider;

// ============================================================================
// Stacks
// ============================================================================

/// The five stacks of the logging deployment and the orchestrator that builds
/// them in order.
pub mod stacks;

// ============================================================================
// State
// ============================================================================

/// Manifest snapshots and plan computation.
pub mod state;

pub use error::{Error, Result};

/// Returns the current version of elk-infra.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
