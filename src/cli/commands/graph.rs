//! Graph command - inspect the resource dependency graph

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use super::CommandContext;

/// Graph rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GraphFormat {
    /// Graphviz DOT
    #[default]
    Dot,
    /// Topological creation order
    Order,
}

/// Arguments for the graph command
#[derive(Parser, Debug, Clone)]
pub struct GraphArgs {
    /// Rendering of the graph
    #[arg(long, short = 'f', value_enum, default_value = "dot")]
    pub format: GraphFormat,

    /// Show what depends on this resource instead of the whole graph
    #[arg(long, value_name = "RESOURCE")]
    pub impact: Option<String>,
}

impl GraphArgs {
    /// Execute the graph command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let deployment = ctx.deployment()?;
        let graph = deployment.blueprint().graph();

        if let Some(name) = &self.impact {
            if !graph.contains(name) {
                bail!("unknown resource '{}'", name);
            }
            let impact = graph.impact_analysis(name);
            if ctx.output.is_machine() {
                ctx.output.document(&impact)?;
            } else {
                ctx.output.banner(&format!("IMPACT OF {}", name));
                let stacks: Vec<String> =
                    impact.affected_stacks.iter().map(ToString::to_string).collect();
                ctx.output.line(&format!(
                    "{} dependent resources across stacks: {}",
                    impact.affected_count(),
                    stacks.join(", ")
                ));
                ctx.output.line(&format!(
                    "Longest dependency chain: {}",
                    impact.critical_path_length
                ));
                ctx.output.list("Affected resources", &impact.affected_resources);
            }
            return Ok(0);
        }

        match self.format {
            GraphFormat::Dot => {
                print!("{}", graph.to_dot());
                ctx.output.flush();
            }
            GraphFormat::Order => {
                let order = graph.creation_order()?;
                if ctx.output.is_machine() {
                    ctx.output.document(&order)?;
                } else {
                    for (i, name) in order.iter().enumerate() {
                        ctx.output.line(&format!("{:>3}. {}", i + 1, name));
                    }
                }
            }
        }

        Ok(0)
    }
}
