//! Init command - write a sample configuration

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use elk_infra::config::Config;

use super::CommandContext;

/// Arguments for the init command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Configuration file to create
    #[arg(default_value = "elk-infra.yaml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        if self.path.exists() && !self.force {
            bail!(
                "{} already exists (use --force to overwrite)",
                self.path.display()
            );
        }

        let example = Config::example();
        let content = match self.path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(&example)?,
            Some("toml") => toml::to_string_pretty(&example)?,
            _ => example.to_yaml()?,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, content)?;

        ctx.output
            .success(&format!("Created {}", self.path.display()));
        ctx.output.hint(&format!(
            "Edit the file, then run 'elk-infra -c {} validate'",
            self.path.display()
        ));

        Ok(0)
    }
}
