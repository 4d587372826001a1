//! Command-line interface for elk-infra.
//!
//! Argument parsing and subcommand dispatch.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// elk-infra - ELK logging stack topology for AWS ECS
///
/// Declares the network, security, data, compute and monitoring resources of
/// the logging deployment and renders them into a manifest.
#[derive(Parser, Debug, Clone)]
#[command(name = "elk-infra")]
#[command(author = "elk-infra Contributors")]
#[command(version)]
#[command(about = "Declarative AWS topology for an ELK logging stack", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "ELK_INFRA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
    /// YAML output
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the deployment and print its manifest
    Synth(commands::synth::SynthArgs),

    /// Show what changed since the last recorded snapshot
    Plan(commands::plan::PlanArgs),

    /// Print the resource dependency graph
    Graph(commands::graph::GraphArgs),

    /// Print the exported stack outputs
    Outputs(commands::outputs::OutputsArgs),

    /// Build the deployment and check its invariants
    Validate(commands::validate::ValidateArgs),

    /// Write a sample configuration file
    Init(commands::init::InitArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["elk-infra", "synth"]).unwrap();
        assert!(matches!(cli.command, Commands::Synth(_)));
        assert_eq!(cli.output, OutputFormat::Human);
    }

    #[test]
    fn test_verbosity_is_capped() {
        let cli = Cli::try_parse_from(["elk-infra", "-vvvvv", "validate"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "elk-infra",
            "graph",
            "--format",
            "order",
            "--output",
            "json",
            "-c",
            "infra.yaml",
        ])
        .unwrap();
        assert!(cli.is_json());
        assert_eq!(cli.config, Some(PathBuf::from("infra.yaml")));
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        assert!(Cli::try_parse_from(["elk-infra", "--output", "xml", "synth"]).is_err());
    }
}
