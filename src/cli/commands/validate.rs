//! Validate command - build the graph and check its invariants

use anyhow::Result;
use clap::Parser;
use elk_infra::graph::StackKind;
use serde::Serialize;

use super::CommandContext;

/// Arguments for the validate command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Also print every resource of each stack
    #[arg(long)]
    pub list: bool,
}

#[derive(Serialize)]
struct StackSummary {
    stack: StackKind,
    resources: usize,
    depends_on: Vec<StackKind>,
}

#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    project: String,
    environment: String,
    resources: usize,
    dependencies: usize,
    outputs: usize,
    fingerprint: String,
    stacks: Vec<StackSummary>,
}

impl ValidateArgs {
    /// Execute the validate command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let deployment = ctx.deployment()?;
        let blueprint = deployment.blueprint();
        let manifest = deployment.manifest();
        let counts = manifest.counts_by_stack();

        let stacks: Vec<StackSummary> = StackKind::ALL
            .iter()
            .map(|stack| StackSummary {
                stack: *stack,
                resources: counts.get(stack).copied().unwrap_or(0),
                depends_on: stack.dependencies().to_vec(),
            })
            .collect();

        let report = ValidationReport {
            valid: true,
            project: manifest.project.clone(),
            environment: manifest.environment.clone(),
            resources: blueprint.len(),
            dependencies: blueprint.graph().edge_count(),
            outputs: blueprint.outputs().len(),
            fingerprint: manifest.fingerprint()?,
            stacks,
        };

        if ctx.output.is_machine() {
            ctx.output.document(&report)?;
            return Ok(0);
        }

        ctx.output.banner("DEPLOYMENT VALIDATION");
        ctx.output.line(&format!(
            "Project: {}  Environment: {}",
            report.project, report.environment
        ));

        let rows: Vec<Vec<String>> = report
            .stacks
            .iter()
            .map(|s| {
                let upstream: Vec<&str> = s.depends_on.iter().map(|d| d.as_str()).collect();
                vec![
                    s.stack.to_string(),
                    s.resources.to_string(),
                    if upstream.is_empty() {
                        "-".to_string()
                    } else {
                        upstream.join(", ")
                    },
                ]
            })
            .collect();
        ctx.output.section("Stacks");
        ctx.output.table(&["Stack", "Resources", "Depends on"], &rows);

        if self.list {
            for (stack, names) in blueprint.graph().resources_by_stack() {
                ctx.output.list(stack.as_str(), &names);
            }
        }

        ctx.output.line("");
        ctx.output.line(&format!(
            "{} resources, {} dependencies, {} outputs",
            report.resources, report.dependencies, report.outputs
        ));
        ctx.output.line(&format!("Fingerprint: {}", report.fingerprint));
        ctx.output.success("Deployment is valid.");

        Ok(0)
    }
}
