//! Plan computation.
//!
//! Compares a freshly synthesized manifest against the last recorded one and
//! reports which resources and outputs would be added, removed or modified.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use crate::graph::{Manifest, ManifestResource, StackKind};

/// Compares manifests
#[derive(Debug, Clone)]
pub struct DiffEngine {
    /// Whether to attach a text diff to modified resources
    include_value_diffs: bool,
    /// Whether unchanged resources are listed in the report
    include_unchanged: bool,
    /// Context lines around each changed hunk
    context_lines: usize,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self {
            include_value_diffs: true,
            include_unchanged: false,
            context_lines: 3,
        }
    }

    pub fn with_value_diffs(mut self, include: bool) -> Self {
        self.include_value_diffs = include;
        self
    }

    pub fn with_unchanged(mut self, include: bool) -> Self {
        self.include_unchanged = include;
        self
    }

    pub fn with_context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Plan the move from `old` (if anything was recorded) to `new`
    pub fn compare(&self, old: Option<&Manifest>, new: &Manifest) -> PlanReport {
        let mut report = PlanReport::new(new.state_key());

        let previous: HashMap<&str, &ManifestResource> = old
            .map(|m| m.resources.iter().map(|r| (r.name.as_str(), r)).collect())
            .unwrap_or_default();

        for resource in &new.resources {
            let change = match previous.get(resource.name.as_str()) {
                None => ResourceChange::new(resource, ChangeType::Added),
                Some(before) if *before != resource => {
                    let mut change = ResourceChange::new(resource, ChangeType::Modified);
                    if self.include_value_diffs {
                        change.diff = Some(StateDiff::from_json_with_context(
                            &resource_body(before),
                            &resource_body(resource),
                            self.context_lines,
                        ));
                    }
                    change
                }
                Some(_) if self.include_unchanged => {
                    ResourceChange::new(resource, ChangeType::Unchanged)
                }
                Some(_) => continue,
            };
            report.resource_changes.push(change);
        }

        if let Some(old) = old {
            for resource in &old.resources {
                if new.resource(&resource.name).is_none() {
                    report
                        .resource_changes
                        .push(ResourceChange::new(resource, ChangeType::Removed));
                }
            }
        }

        self.diff_outputs(old, new, &mut report);
        report.calculate_summary();
        report
    }

    fn diff_outputs(&self, old: Option<&Manifest>, new: &Manifest, report: &mut PlanReport) {
        for (name, value) in &new.outputs {
            let before = old.and_then(|m| m.outputs.get(name));
            let change_type = match before {
                None => ChangeType::Added,
                Some(before) if before != value => ChangeType::Modified,
                Some(_) if self.include_unchanged => ChangeType::Unchanged,
                Some(_) => continue,
            };
            report.output_changes.push(OutputChange {
                name: name.clone(),
                change_type,
                old_value: before.cloned(),
                new_value: Some(value.clone()),
            });
        }

        if let Some(old) = old {
            for (name, value) in &old.outputs {
                if !new.outputs.contains_key(name) {
                    report.output_changes.push(OutputChange {
                        name: name.clone(),
                        change_type: ChangeType::Removed,
                        old_value: Some(value.clone()),
                        new_value: None,
                    });
                }
            }
        }
    }
}

/// The part of a resource a plan compares
fn resource_body(resource: &ManifestResource) -> Value {
    serde_json::json!({
        "type": resource.type_token,
        "properties": resource.properties,
        "dependsOn": resource.depends_on,
    })
}

/// Type of change detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Added => write!(f, "+"),
            ChangeType::Removed => write!(f, "-"),
            ChangeType::Modified => write!(f, "~"),
            ChangeType::Unchanged => write!(f, " "),
        }
    }
}

/// A planned change to one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub name: String,
    #[serde(rename = "type")]
    pub type_token: String,
    pub stack: StackKind,
    pub change_type: ChangeType,
    /// Text diff of the resource body, for modified resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<StateDiff>,
}

impl ResourceChange {
    fn new(resource: &ManifestResource, change_type: ChangeType) -> Self {
        Self {
            name: resource.name.clone(),
            type_token: resource.type_token.clone(),
            stack: resource.stack,
            change_type,
            diff: None,
        }
    }
}

/// A planned change to an exported output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChange {
    pub name: String,
    pub change_type: ChangeType,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Counts of planned changes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub resources_added: usize,
    pub resources_removed: usize,
    pub resources_modified: usize,
    pub outputs_changed: usize,
    pub has_changes: bool,
}

/// Result of comparing two manifests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub generated_at: DateTime<Utc>,
    pub state_key: String,
    /// Id of the snapshot the plan was computed against
    pub previous_snapshot_id: Option<String>,
    pub resource_changes: Vec<ResourceChange>,
    pub output_changes: Vec<OutputChange>,
    pub summary: PlanSummary,
}

impl PlanReport {
    fn new(state_key: String) -> Self {
        Self {
            generated_at: Utc::now(),
            state_key,
            previous_snapshot_id: None,
            resource_changes: Vec::new(),
            output_changes: Vec::new(),
            summary: PlanSummary::default(),
        }
    }

    /// Record which snapshot the plan is based on
    pub fn against(mut self, snapshot_id: impl Into<String>) -> Self {
        self.previous_snapshot_id = Some(snapshot_id.into());
        self
    }

    pub fn calculate_summary(&mut self) {
        let count = |kind: ChangeType| {
            self.resource_changes
                .iter()
                .filter(|c| c.change_type == kind)
                .count()
        };
        let outputs_changed = self
            .output_changes
            .iter()
            .filter(|c| c.change_type != ChangeType::Unchanged)
            .count();

        self.summary = PlanSummary {
            resources_added: count(ChangeType::Added),
            resources_removed: count(ChangeType::Removed),
            resources_modified: count(ChangeType::Modified),
            outputs_changed,
            has_changes: false,
        };
        self.summary.has_changes = self.summary.resources_added
            + self.summary.resources_removed
            + self.summary.resources_modified
            + outputs_changed
            > 0;
    }

    pub fn has_changes(&self) -> bool {
        self.summary.has_changes
    }

    /// Changes of the given type
    pub fn changes_of(&self, kind: ChangeType) -> impl Iterator<Item = &ResourceChange> {
        self.resource_changes
            .iter()
            .filter(move |c| c.change_type == kind)
    }

    pub fn summary_text(&self) -> String {
        if !self.has_changes() {
            return "No changes. Infrastructure matches the recorded state.".to_string();
        }

        let mut parts = Vec::new();
        if self.summary.resources_added > 0 {
            parts.push(format!("{} to add", self.summary.resources_added));
        }
        if self.summary.resources_modified > 0 {
            parts.push(format!("{} to change", self.summary.resources_modified));
        }
        if self.summary.resources_removed > 0 {
            parts.push(format!("{} to remove", self.summary.resources_removed));
        }
        if self.summary.outputs_changed > 0 {
            parts.push(format!("{} outputs changed", self.summary.outputs_changed));
        }

        format!("Plan: {}", parts.join(", "))
    }
}

/// Line diff between two renderings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDiff {
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
    pub unified_diff: String,
}

impl StateDiff {
    /// Diff of two JSON values, keeping `context` lines around each hunk
    pub fn from_json_with_context(old: &Value, new: &Value, context: usize) -> Self {
        let old_str = serde_json::to_string_pretty(old).unwrap_or_default();
        let new_str = serde_json::to_string_pretty(new).unwrap_or_default();
        Self::build(&old_str, &new_str, context)
    }

    fn build(old: &str, new: &str, context: usize) -> Self {
        let diff = TextDiff::from_lines(old, new);
        let mut additions = Vec::new();
        let mut deletions = Vec::new();
        let mut unified_diff = String::new();

        for group in diff.grouped_ops(context) {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;
            unified_diff.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                old_range.start + 1,
                old_range.len(),
                new_range.start + 1,
                new_range.len()
            ));

            for op in &group {
                for change in diff.iter_changes(op) {
                    let line = change.value().trim_end();
                    match change.tag() {
                        ChangeTag::Insert => {
                            additions.push(line.to_string());
                            unified_diff.push_str(&format!("+{}\n", line));
                        }
                        ChangeTag::Delete => {
                            deletions.push(line.to_string());
                            unified_diff.push_str(&format!("-{}\n", line));
                        }
                        ChangeTag::Equal => {
                            unified_diff.push_str(&format!(" {}\n", line));
                        }
                    }
                }
            }
        }

        Self {
            additions,
            deletions,
            unified_diff,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.additions.is_empty() || !self.deletions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::manifest;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_no_previous_state_adds_everything() {
        let new = manifest("dev", "10.0.0.0/16");
        let report = DiffEngine::new().compare(None, &new);
        assert_eq!(report.summary.resources_added, 1);
        assert_eq!(report.summary.outputs_changed, 1);
        assert!(report.has_changes());
        assert!(report.previous_snapshot_id.is_none());
    }

    #[test]
    fn test_identical_manifests_have_no_changes() {
        let old = manifest("dev", "10.0.0.0/16");
        let new = manifest("dev", "10.0.0.0/16");
        let report = DiffEngine::new().compare(Some(&old), &new);
        assert!(!report.has_changes());
        assert!(report.resource_changes.is_empty());
        assert!(report.summary_text().starts_with("No changes"));
    }

    #[test]
    fn test_unchanged_listed_on_request() {
        let old = manifest("dev", "10.0.0.0/16");
        let report = DiffEngine::new()
            .with_unchanged(true)
            .compare(Some(&old), &old.clone());
        assert_eq!(report.resource_changes[0].change_type, ChangeType::Unchanged);
        assert!(!report.has_changes());
    }

    #[test]
    fn test_modified_resource_carries_diff() {
        let old = manifest("dev", "10.0.0.0/16");
        let new = manifest("dev", "10.1.0.0/16");
        let report = DiffEngine::new().compare(Some(&old), &new);

        assert_eq!(report.summary.resources_modified, 1);
        let change = &report.resource_changes[0];
        assert_eq!(change.name, "elk-vpc");
        let diff = change.diff.as_ref().unwrap();
        assert_eq!(diff.additions, vec![r#"    "cidrBlock": "10.1.0.0/16""#]);
        assert_eq!(diff.deletions, vec![r#"    "cidrBlock": "10.0.0.0/16""#]);
        assert_eq!(report.summary_text(), "Plan: 1 to change");
    }

    #[test]
    fn test_value_diffs_can_be_disabled() {
        let old = manifest("dev", "10.0.0.0/16");
        let new = manifest("dev", "10.1.0.0/16");
        let report = DiffEngine::new()
            .with_value_diffs(false)
            .compare(Some(&old), &new);
        assert!(report.resource_changes[0].diff.is_none());
    }

    #[test]
    fn test_removed_resources_and_outputs() {
        let old = manifest("dev", "10.0.0.0/16");
        let mut new = old.clone();
        new.resources.clear();
        new.outputs.clear();
        new.outputs.insert("rds_endpoint".into(), json!("${elk-postgresql.endpoint}"));

        let report = DiffEngine::new().compare(Some(&old), &new).against("abc");
        assert_eq!(report.summary.resources_removed, 1);
        assert_eq!(report.changes_of(ChangeType::Removed).count(), 1);
        let outputs: Vec<(&str, ChangeType)> = report
            .output_changes
            .iter()
            .map(|c| (c.name.as_str(), c.change_type))
            .collect();
        assert_eq!(
            outputs,
            vec![("rds_endpoint", ChangeType::Added), ("vpc_id", ChangeType::Removed)]
        );
        assert_eq!(report.previous_snapshot_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_distant_changes_get_separate_hunks() {
        let old = json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 7, "h": 8});
        let new = json!({"a": 0, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6, "g": 7, "h": 9});
        let diff = StateDiff::from_json_with_context(&old, &new, 1);

        let headers: Vec<&str> = diff
            .unified_diff
            .lines()
            .filter(|l| l.starts_with("@@"))
            .collect();
        assert_eq!(headers, vec!["@@ -1,3 +1,3 @@", "@@ -8,3 +8,3 @@"]);
        assert_eq!(diff.additions, vec![r#"  "a": 0,"#, r#"  "h": 9"#]);
        assert!(diff.has_changes());
    }

    #[test]
    fn test_context_lines_control_hunk_size() {
        let old = manifest("dev", "10.0.0.0/16");
        let new = manifest("dev", "10.1.0.0/16");
        let report = DiffEngine::new()
            .with_context_lines(0)
            .compare(Some(&old), &new);
        let diff = report.resource_changes[0].diff.as_ref().unwrap();
        assert_eq!(diff.unified_diff.lines().count(), 3);
        assert!(diff.unified_diff.starts_with("@@ "));
    }
}
