//! Plan command - diff against the last recorded snapshot

use anyhow::Result;
use clap::Parser;
use elk_infra::state::{ChangeType, DiffEngine, StatePersistence};
use elk_infra::Error;

use super::CommandContext;

/// Arguments for the plan command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Do not show property diffs of modified resources
    #[arg(long)]
    pub no_diff: bool,

    /// Also list resources that did not change
    #[arg(long)]
    pub show_unchanged: bool,

    /// Unchanged lines shown around each change in property diffs
    #[arg(long, default_value_t = 3)]
    pub context: usize,
}

impl PlanArgs {
    /// Execute the plan command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let deployment = ctx.deployment()?;
        let manifest = deployment.manifest();
        let store = ctx.state_store(deployment.config())?;

        let previous = store
            .latest_snapshot(&manifest.state_key())
            .map_err(Error::from)?;

        let engine = DiffEngine::new()
            .with_value_diffs(!self.no_diff)
            .with_unchanged(self.show_unchanged)
            .with_context_lines(self.context);
        let mut report = engine.compare(previous.as_ref().map(|s| &s.manifest), &manifest);
        if let Some(snapshot) = &previous {
            report = report.against(snapshot.id.clone());
        }

        if ctx.output.is_machine() {
            ctx.output.document(&report)?;
            return Ok(0);
        }

        ctx.output.banner(&format!("PLAN {}", report.state_key));
        match &previous {
            Some(snapshot) => ctx.output.line(&format!(
                "Comparing with snapshot {} ({})",
                snapshot.id,
                snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => ctx
                .output
                .hint("No snapshot recorded yet; run `elk-infra synth --save` after applying"),
        }

        if !report.resource_changes.is_empty() {
            ctx.output.section("Resources");
            for change in &report.resource_changes {
                ctx.output.change(
                    change.change_type,
                    &format!("{} ({}) [{}]", change.name, change.type_token, change.stack),
                );
                if let Some(diff) = &change.diff {
                    ctx.output.diff(&diff.unified_diff);
                }
            }
        }

        let output_changes: Vec<_> = report
            .output_changes
            .iter()
            .filter(|c| c.change_type != ChangeType::Unchanged)
            .collect();
        if !output_changes.is_empty() {
            ctx.output.section("Outputs");
            for change in output_changes {
                ctx.output.change(change.change_type, &change.name);
            }
        }

        ctx.output.line("");
        if report.has_changes() {
            ctx.output.line(&report.summary_text());
        } else {
            ctx.output.success(&report.summary_text());
        }

        Ok(0)
    }
}
