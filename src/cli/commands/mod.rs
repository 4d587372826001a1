//! Subcommand implementations.

pub mod graph;
pub mod init;
pub mod outputs;
pub mod plan;
pub mod synth;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;
use elk_infra::config::{Config, StackConfig};
use elk_infra::stacks::Deployment;
use elk_infra::Error;
use elk_infra::state::JsonPersistence;

use crate::cli::output::OutputFormatter;
use crate::cli::Cli;

/// Common context shared between commands
pub struct CommandContext {
    /// Output formatter
    pub output: OutputFormatter,
    /// Explicit configuration file, if any
    pub config_path: Option<PathBuf>,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli) -> Self {
        Self {
            output: OutputFormatter::new(!cli.no_color, cli.output, cli.verbosity()),
            config_path: cli.config.clone(),
            verbosity: cli.verbosity(),
        }
    }

    /// Load and validate the configuration
    pub fn stack_config(&self) -> Result<StackConfig> {
        let config = Config::load(self.config_path.as_deref())?;
        let config = config.validate()?;
        self.output.debug(&format!(
            "Configuration: project={} environment={} region={}",
            config.project, config.environment, config.region
        ));
        Ok(config)
    }

    /// Load the configuration and declare every stack
    pub fn deployment(&self) -> Result<Deployment> {
        let config = self.stack_config()?;
        let deployment = Deployment::build(&config)?;
        self.output.info(&format!(
            "Declared {} resources in {}",
            deployment.blueprint().len(),
            self.output.elapsed()
        ));
        Ok(deployment)
    }

    /// Snapshot store of the deployment
    pub fn state_store(&self, config: &StackConfig) -> Result<JsonPersistence> {
        let store = JsonPersistence::new(config.state_dir.clone()).map_err(Error::from)?;
        self.output
            .debug(&format!("State directory: {}", store.base_dir().display()));
        Ok(store)
    }
}
