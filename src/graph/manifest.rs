//! The rendered desired-state document handed to the provisioning engine.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::resource::StackKind;
use crate::error::Result;

/// A rendered resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResource {
    /// Logical name
    pub name: String,
    /// Provider type token
    #[serde(rename = "type")]
    pub type_token: String,
    /// Owning stack
    pub stack: StackKind,
    /// Rendered properties
    pub properties: IndexMap<String, Value>,
    /// Explicit dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// The full desired state of one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Project name
    pub project: String,
    /// Environment name
    pub environment: String,
    /// Resources in creation order
    pub resources: Vec<ManifestResource>,
    /// Exported stack outputs
    pub outputs: IndexMap<String, Value>,
}

impl Manifest {
    /// Find a resource by logical name
    pub fn resource(&self, name: &str) -> Option<&ManifestResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Key identifying the deployment in the state directory.
    ///
    /// `/` is not allowed in project or environment names, so distinct
    /// deployments never share a key.
    pub fn state_key(&self) -> String {
        format!("{}/{}", self.project, self.environment)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// SHA-256 of the compact JSON rendering.
    ///
    /// Two builds from the same configuration have the same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Write the manifest to a file; the format follows the extension
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yml" | "yaml") => self.to_yaml()?,
            _ => self.to_json()?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Number of resources per stack
    pub fn counts_by_stack(&self) -> IndexMap<StackKind, usize> {
        let mut counts = IndexMap::new();
        for resource in &self.resources {
            *counts.entry(resource.stack).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Manifest {
        let mut properties = IndexMap::new();
        properties.insert("cidrBlock".to_string(), json!("10.0.0.0/16"));
        Manifest {
            project: "elk".into(),
            environment: "dev".into(),
            resources: vec![ManifestResource {
                name: "elk-vpc".into(),
                type_token: "aws:ec2/vpc:Vpc".into(),
                stack: StackKind::Network,
                properties,
                depends_on: vec![],
            }],
            outputs: IndexMap::new(),
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = sample();
        let b = sample();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = sample();
        let mut b = sample();
        b.resources[0]
            .properties
            .insert("cidrBlock".into(), json!("10.1.0.0/16"));
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_json_roundtrip_keeps_type_field() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"type\": \"aws:ec2/vpc:Vpc\""));
        assert!(!json.contains("dependsOn"));
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_state_key() {
        assert_eq!(sample().state_key(), "elk/dev");
    }

    #[test]
    fn test_state_key_separates_hyphenated_names() {
        let mut a = sample();
        a.project = "elk-a".into();
        a.environment = "dev".into();
        let mut b = sample();
        b.project = "elk".into();
        b.environment = "a-dev".into();
        assert_ne!(a.state_key(), b.state_key());
    }
}
