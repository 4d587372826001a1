//! Synth command - render the manifest

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use elk_infra::graph::Manifest;
use elk_infra::stacks::Deployment;
use elk_infra::state::{Snapshot, StatePersistence};
use elk_infra::Error;
use serde::Serialize;

use super::CommandContext;

/// Arguments for the synth command
#[derive(Parser, Debug, Clone)]
pub struct SynthArgs {
    /// Write the manifest to a file instead of stdout (.json, .yaml or .yml)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Record the manifest as a snapshot in the state directory
    #[arg(long)]
    pub save: bool,
}

#[derive(Serialize)]
struct SynthSummary {
    path: PathBuf,
    fingerprint: String,
    resources: usize,
    snapshot: Option<String>,
}

impl SynthArgs {
    /// Execute the synth command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let deployment = ctx.deployment()?;
        let manifest = deployment.manifest();
        let fingerprint = manifest.fingerprint()?;

        match &self.out {
            Some(path) => {
                manifest.write_to(path)?;
                let snapshot = self.record(ctx, &deployment, &manifest)?;
                if ctx.output.is_machine() {
                    ctx.output.document(&SynthSummary {
                        path: path.clone(),
                        fingerprint,
                        resources: manifest.resources.len(),
                        snapshot,
                    })?;
                } else {
                    ctx.output.success(&format!(
                        "Wrote {} resources to {}",
                        manifest.resources.len(),
                        path.display()
                    ));
                    ctx.output.line(&format!("Fingerprint: {}", fingerprint));
                    if let Some(id) = &snapshot {
                        ctx.output.line(&format!("Recorded snapshot {}", id));
                    }
                }
            }
            None => {
                ctx.output.document(&manifest)?;
                if let Some(id) = self.record(ctx, &deployment, &manifest)? {
                    ctx.output.info(&format!("Recorded snapshot {}", id));
                }
            }
        }

        Ok(0)
    }

    /// Save a snapshot of the delivered manifest when `--save` is given
    fn record(
        &self,
        ctx: &CommandContext,
        deployment: &Deployment,
        manifest: &Manifest,
    ) -> Result<Option<String>> {
        if !self.save {
            return Ok(None);
        }
        let snapshot = Snapshot::new(manifest.clone()).map_err(Error::from)?;
        let store = ctx.state_store(deployment.config())?;
        store.save_snapshot(&snapshot).map_err(Error::from)?;
        Ok(Some(snapshot.id))
    }
}
