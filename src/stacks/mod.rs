//! The five stacks of an ELK deployment and the orchestrator building them.
//!
//! Each stack constructor takes the stacks it depends on by reference, so
//! the compiler rejects declaring a stack before its dependencies. The
//! [`Blueprint`] additionally checks the order at runtime.
//!
//! | Stack | Depends on |
//! |-------|------------|
//! | [`NetworkStack`] | - |
//! | [`SecurityStack`] | network |
//! | [`DataStack`] | network, security |
//! | [`ComputeStack`] | network, security, data |
//! | [`MonitoringStack`] | network, security, compute |

pub mod components;
pub mod compute;
pub mod data;
pub mod monitoring;
pub mod network;
pub mod security;

use tracing::{debug, error};

pub use components::LoggingComponent;
pub use compute::ComputeStack;
pub use data::DataStack;
pub use monitoring::MonitoringStack;
pub use network::NetworkStack;
pub use security::SecurityStack;

use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::graph::{Blueprint, Input, Manifest, ResourceBuilder, ResourceKind, StackKind};
use crate::provider::{Provider, StaticProvider};

/// Names of the exported outputs
pub mod outputs {
    pub const VPC_ID: &str = "vpc_id";
    pub const PRIVATE_SUBNET_IDS: &str = "private_subnet_ids";
    pub const PUBLIC_SUBNET_IDS: &str = "public_subnet_ids";
    pub const ECS_CLUSTER_NAME: &str = "ecs_cluster_name";
    pub const RDS_ENDPOINT: &str = "rds_endpoint";
}

/// Declaration context of a single stack.
pub struct StackContext<'a> {
    blueprint: &'a mut Blueprint,
    config: &'a StackConfig,
    provider: &'a dyn Provider,
    stack: StackKind,
}

impl<'a> StackContext<'a> {
    /// Open `stack` on the blueprint
    pub fn begin(
        blueprint: &'a mut Blueprint,
        config: &'a StackConfig,
        provider: &'a dyn Provider,
        stack: StackKind,
    ) -> Result<Self> {
        blueprint.begin_stack(stack)?;
        Ok(Self {
            blueprint,
            config,
            provider,
            stack,
        })
    }

    /// Close the stack
    pub fn finish(self) -> Result<()> {
        self.blueprint.finish_stack(self.stack)
    }

    pub fn config(&self) -> &StackConfig {
        self.config
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider
    }

    /// `{project}-{suffix}`
    pub fn name(&self, suffix: &str) -> String {
        self.config.resource_name(suffix)
    }

    /// Start declaring `{project}-{suffix}` in this stack
    pub fn resource(&mut self, kind: ResourceKind, suffix: &str) -> ResourceBuilder<'_> {
        let name = self.name(suffix);
        self.blueprint.resource(self.stack, kind, name)
    }

    /// Failure boundary: any error raised by `f` is reported as a failure
    /// to create `what` in this stack.
    pub fn create<T, F>(&mut self, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let stack = self.stack;
        f(self).map_err(|e| Error::resource_creation(stack.as_str(), what, e))
    }
}

/// A fully declared deployment.
#[derive(Debug)]
pub struct Deployment {
    config: StackConfig,
    blueprint: Blueprint,
    pub network: NetworkStack,
    pub security: SecurityStack,
    pub data: DataStack,
    pub compute: ComputeStack,
    pub monitoring: MonitoringStack,
}

impl Deployment {
    /// Build every stack with lookups answered from configuration
    pub fn build(config: &StackConfig) -> Result<Self> {
        let provider = StaticProvider::from_config(config);
        Self::build_with_provider(config, &provider)
    }

    /// Build every stack, in dependency order, aborting on the first error
    pub fn build_with_provider(config: &StackConfig, provider: &dyn Provider) -> Result<Self> {
        let mut blueprint = Blueprint::new(config.common_tags());

        let network = initialized(
            StackKind::Network,
            NetworkStack::new(&mut blueprint, config, provider),
        )?;
        let security = initialized(
            StackKind::Security,
            SecurityStack::new(&mut blueprint, config, provider, &network),
        )?;
        let data = initialized(
            StackKind::Data,
            DataStack::new(&mut blueprint, config, provider, &network, &security),
        )?;
        let compute = initialized(
            StackKind::Compute,
            ComputeStack::new(&mut blueprint, config, provider, &network, &security, &data),
        )?;
        let monitoring = initialized(
            StackKind::Monitoring,
            MonitoringStack::new(&mut blueprint, config, provider, &network, &security, &compute),
        )?;

        blueprint.export(outputs::VPC_ID, network.vpc.id())?;
        blueprint.export(outputs::PRIVATE_SUBNET_IDS, network.private_subnet_ids())?;
        blueprint.export(outputs::PUBLIC_SUBNET_IDS, network.public_subnet_ids())?;
        blueprint.export(outputs::ECS_CLUSTER_NAME, compute.cluster_name())?;
        blueprint.export(outputs::RDS_ENDPOINT, data.endpoint())?;

        blueprint.validate().map_err(|e| {
            error!("Deployment graph failed validation: {}", e);
            e
        })?;

        debug!(
            resources = blueprint.len(),
            edges = blueprint.graph().edge_count(),
            "Deployment declared"
        );

        Ok(Self {
            config: config.clone(),
            blueprint,
            network,
            security,
            data,
            compute,
            monitoring,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Exported output values
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.blueprint
            .outputs()
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Rendered desired state
    pub fn manifest(&self) -> Manifest {
        self.blueprint
            .manifest(&self.config.project, &self.config.environment)
    }
}

fn initialized<T>(stack: StackKind, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            debug!("{} stack initialized successfully.", stack);
            Ok(value)
        }
        Err(e) => {
            error!(stack = %stack, "Error initializing stacks: {}", e);
            Err(e)
        }
    }
}
