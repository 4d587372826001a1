//! Outputs command - print exported stack outputs

use anyhow::Result;
use clap::Parser;
use indexmap::IndexMap;
use serde_json::Value;

use super::CommandContext;

/// Arguments for the outputs command
#[derive(Parser, Debug, Clone)]
pub struct OutputsArgs {
    /// Print a single output
    pub name: Option<String>,
}

impl OutputsArgs {
    /// Execute the outputs command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let deployment = ctx.deployment()?;

        let mut outputs: IndexMap<String, Value> = deployment
            .outputs()
            .map(|(name, value)| (name.to_string(), value.render()))
            .collect();

        if let Some(name) = &self.name {
            match outputs.shift_remove(name) {
                Some(value) => {
                    outputs = IndexMap::from([(name.clone(), value)]);
                }
                None => {
                    let known: Vec<&str> = deployment.outputs().map(|(n, _)| n).collect();
                    ctx.output.error(&format!("Unknown output '{}'", name));
                    ctx.output.hint(&format!("Available outputs: {}", known.join(", ")));
                    return Ok(1);
                }
            }
        }

        if ctx.output.is_machine() {
            ctx.output.document(&outputs)?;
            return Ok(0);
        }

        let rows: Vec<Vec<String>> = outputs
            .iter()
            .map(|(name, value)| vec![name.clone(), render_value(value)])
            .collect();
        ctx.output.table(&["Output", "Value"], &rows);

        Ok(0)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("${elk-vpc.id}")), "${elk-vpc.id}");
        assert_eq!(render_value(&json!(["a", "b"])), "a, b");
        assert_eq!(render_value(&json!(3)), "3");
    }
}
