//! Resource graph construction.
//!
//! A [`Blueprint`] collects every resource declared by the stacks of a
//! deployment. Declaring a resource goes through a [`ResourceBuilder`] which:
//!
//! 1. validates the logical name and rejects duplicates,
//! 2. applies the common tag set (plus resource tags) to taggable kinds,
//! 3. checks that every embedded reference points at an already declared
//!    resource,
//! 4. records the reference edges in the [`ResourceGraph`].
//!
//! Because references can only point backwards, the graph is acyclic by
//! construction and the declaration order is a valid creation order.
//!
//! ## Example
//!
//! ```rust
//! use elk_infra::graph::{Blueprint, ResourceKind, StackKind};
//! use elk_infra::tags::Tags;
//!
//! let mut blueprint = Blueprint::new(Tags::common("elk", "dev", "DevOps", "elk-infra"));
//! blueprint.begin_stack(StackKind::Network).unwrap();
//!
//! let vpc = blueprint
//!     .resource(StackKind::Network, ResourceKind::Vpc, "elk-vpc")
//!     .prop("cidrBlock", "10.0.0.0/16")
//!     .name_tag()
//!     .declare()
//!     .unwrap();
//!
//! blueprint
//!     .resource(StackKind::Network, ResourceKind::InternetGateway, "elk-igw")
//!     .prop("vpcId", vpc.id())
//!     .declare()
//!     .unwrap();
//!
//! assert_eq!(blueprint.graph().edge_count(), 1);
//! ```

pub mod dependencies;
pub mod input;
pub mod manifest;
pub mod resource;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

pub use dependencies::{DependencyType, ImpactAnalysis, ResourceDependency, ResourceGraph, ResourceNode};
pub use input::{Input, Reference};
pub use manifest::{Manifest, ManifestResource};
pub use resource::{Properties, ResourceHandle, ResourceKind, ResourceSpec, StackKind};

use crate::error::{Error, Result};
use crate::tags::{keys, Tags};

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("static pattern is valid")
});

/// Property key holding the tag map
pub const TAGS_PROPERTY: &str = "tags";

/// Validate a logical resource name
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
            message: "must start with an alphanumeric character and contain only \
                      alphanumerics, '.', '_' or '-' (max 128)"
                .to_string(),
        })
    }
}

/// All resources declared for one deployment.
#[derive(Debug, Clone)]
pub struct Blueprint {
    common_tags: Tags,
    specs: IndexMap<String, ResourceSpec>,
    graph: ResourceGraph,
    outputs: IndexMap<String, Input>,
    completed: Vec<StackKind>,
    current: Option<StackKind>,
}

impl Blueprint {
    /// Create an empty blueprint with the given common tag set
    pub fn new(common_tags: Tags) -> Self {
        Self {
            common_tags,
            specs: IndexMap::new(),
            graph: ResourceGraph::new(),
            outputs: IndexMap::new(),
            completed: Vec::new(),
            current: None,
        }
    }

    /// Common tag set applied to every taggable resource
    pub fn common_tags(&self) -> &Tags {
        &self.common_tags
    }

    /// Start declaring a stack. Every stack it depends on must be finished.
    pub fn begin_stack(&mut self, stack: StackKind) -> Result<()> {
        if self.completed.contains(&stack) || self.current == Some(stack) {
            return Err(Error::StackRedeclared(stack.to_string()));
        }
        if let Some(open) = self.current {
            return Err(Error::StackOrdering {
                stack: stack.to_string(),
                dependency: open.to_string(),
            });
        }
        if let Some(missing) = stack
            .dependencies()
            .iter()
            .find(|dep| !self.completed.contains(dep))
        {
            return Err(Error::StackOrdering {
                stack: stack.to_string(),
                dependency: missing.to_string(),
            });
        }
        self.current = Some(stack);
        Ok(())
    }

    /// Mark the current stack as fully declared
    pub fn finish_stack(&mut self, stack: StackKind) -> Result<()> {
        if self.current != Some(stack) {
            return Err(Error::StackOrdering {
                stack: stack.to_string(),
                dependency: self
                    .current
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }
        self.current = None;
        self.completed.push(stack);
        Ok(())
    }

    /// Stacks finished so far, in order
    pub fn completed_stacks(&self) -> &[StackKind] {
        &self.completed
    }

    /// Start declaring a resource
    pub fn resource(
        &mut self,
        stack: StackKind,
        kind: ResourceKind,
        name: impl Into<String>,
    ) -> ResourceBuilder<'_> {
        ResourceBuilder {
            blueprint: self,
            stack,
            kind,
            name: name.into(),
            properties: Properties::new(),
            extra_tags: Tags::new(),
            depends_on: Vec::new(),
        }
    }

    /// Export a named output
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<Input>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        for reference in value.references() {
            if !self.graph.contains(&reference.resource) {
                return Err(Error::UnresolvedReference {
                    resource: format!("output:{}", name),
                    reference: reference.to_string(),
                });
            }
        }
        self.outputs.insert(name, value);
        Ok(())
    }

    /// Declared resources in declaration order
    pub fn specs(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.values()
    }

    /// Look up a declared resource
    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.specs.get(name)
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing has been declared yet
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The dependency graph
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Exported outputs
    pub fn outputs(&self) -> &IndexMap<String, Input> {
        &self.outputs
    }

    /// Check the graph invariants.
    ///
    /// - no dependency cycles
    /// - every edge points from an earlier declaration to a later one
    /// - every taggable resource carries the common tag set
    pub fn validate(&self) -> Result<()> {
        if self.graph.has_cycles() {
            let cycles: Vec<String> = self
                .graph
                .get_cycles()
                .into_iter()
                .map(|c| c.join(" -> "))
                .collect();
            return Err(Error::DependencyCycle(cycles.join("; ")));
        }

        for dep in self.graph.dependencies() {
            let from = self.specs.get_index_of(&dep.from);
            let to = self.specs.get_index_of(&dep.to);
            if from >= to {
                return Err(Error::DependencyCycle(format!(
                    "'{}' depends on later resource '{}'",
                    dep.to, dep.from
                )));
            }
        }

        for spec in self.specs.values() {
            if !spec.kind.is_taggable() {
                continue;
            }
            let tags = spec
                .properties
                .get(TAGS_PROPERTY)
                .map(tags_of)
                .unwrap_or_default();
            if !tags.is_superset_of(&self.common_tags) {
                return Err(Error::invalid_attribute(
                    TAGS_PROPERTY,
                    format!("'{}' is missing common tags", spec.name),
                ));
            }
        }

        Ok(())
    }

    /// Render the manifest
    pub fn manifest(&self, project: &str, environment: &str) -> Manifest {
        let resources = self
            .specs
            .values()
            .map(|spec| ManifestResource {
                name: spec.name.clone(),
                type_token: spec.kind.type_token().to_string(),
                stack: spec.stack,
                properties: spec
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render()))
                    .collect(),
                depends_on: spec.depends_on.clone(),
            })
            .collect();

        let outputs = self
            .outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.render()))
            .collect();

        Manifest {
            project: project.to_string(),
            environment: environment.to_string(),
            resources,
            outputs,
        }
    }

    fn insert(&mut self, spec: ResourceSpec) -> Result<ResourceHandle> {
        if self.current != Some(spec.stack) {
            return Err(Error::StackOrdering {
                stack: spec.stack.to_string(),
                dependency: self
                    .current
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }

        validate_name(&spec.name)?;
        if self.graph.contains(&spec.name) {
            return Err(Error::DuplicateResource(spec.name));
        }

        // Group referenced attributes per upstream resource
        let mut upstream: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for reference in spec.references() {
            if !self.graph.contains(&reference.resource) {
                return Err(Error::UnresolvedReference {
                    resource: spec.name.clone(),
                    reference: reference.to_string(),
                });
            }
            upstream
                .entry(reference.resource.as_str())
                .or_default()
                .push(reference.attribute.clone());
        }
        for dep in &spec.depends_on {
            if !self.graph.contains(dep) {
                return Err(Error::UnresolvedReference {
                    resource: spec.name.clone(),
                    reference: dep.clone(),
                });
            }
        }

        let dependencies: Vec<ResourceDependency> = upstream
            .into_iter()
            .map(|(from, attributes)| {
                ResourceDependency::new(from, &spec.name, DependencyType::Reference)
                    .with_attributes(attributes)
            })
            .chain(
                spec.depends_on
                    .iter()
                    .map(|dep| ResourceDependency::new(dep, &spec.name, DependencyType::Explicit)),
            )
            .collect();

        self.graph
            .add_node(ResourceNode::new(&spec.name, spec.kind, spec.stack))?;
        for dependency in dependencies {
            self.graph.add_dependency(dependency)?;
        }

        trace!(
            resource = %spec.name,
            kind = spec.kind.type_token(),
            stack = %spec.stack,
            "declared resource"
        );

        let handle = ResourceHandle::new(spec.name.clone(), spec.kind);
        self.specs.insert(spec.name.clone(), spec);
        Ok(handle)
    }
}

/// Read literal tags back out of a rendered tag property
fn tags_of(input: &Input) -> Tags {
    match input {
        Input::Map(entries) => entries
            .iter()
            .filter_map(|(k, v)| match v {
                Input::Literal(serde_json::Value::String(s)) => Some((k.clone(), s.clone())),
                _ => None,
            })
            .collect(),
        _ => Tags::new(),
    }
}

/// Builder for a single resource declaration.
#[must_use = "a resource is only declared once `declare` is called"]
pub struct ResourceBuilder<'a> {
    blueprint: &'a mut Blueprint,
    stack: StackKind,
    kind: ResourceKind,
    name: String,
    properties: Properties,
    extra_tags: Tags,
    depends_on: Vec<String>,
}

impl ResourceBuilder<'_> {
    /// Set a property
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Input>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set a property only when a value is present
    pub fn prop_opt(self, key: impl Into<String>, value: Option<impl Into<Input>>) -> Self {
        match value {
            Some(v) => self.prop(key, v),
            None => self,
        }
    }

    /// Add a resource-specific tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_tags.insert(key, value);
        self
    }

    /// Tag the resource with `Name = <logical name>`
    pub fn name_tag(self) -> Self {
        let name = self.name.clone();
        self.tag(keys::NAME, name)
    }

    /// Add an explicit ordering dependency
    pub fn depends_on(mut self, handle: &ResourceHandle) -> Self {
        self.depends_on.push(handle.logical_name().to_string());
        self
    }

    /// Finish the declaration
    pub fn declare(self) -> Result<ResourceHandle> {
        let ResourceBuilder {
            blueprint,
            stack,
            kind,
            name,
            mut properties,
            extra_tags,
            depends_on,
        } = self;

        if properties.contains_key(TAGS_PROPERTY) {
            return Err(Error::invalid_attribute(
                TAGS_PROPERTY,
                "tags are derived from the common tag set; use `tag` instead",
            ));
        }

        if kind.is_taggable() {
            let tags = blueprint.common_tags.merge(&extra_tags)?;
            properties.insert(TAGS_PROPERTY.to_string(), Input::from(&tags));
        } else if !extra_tags.is_empty() {
            return Err(Error::invalid_attribute(
                TAGS_PROPERTY,
                format!("{} does not accept tags", kind.type_token()),
            ));
        }

        blueprint.insert(ResourceSpec {
            name,
            kind,
            stack,
            properties,
            depends_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blueprint() -> Blueprint {
        let mut bp = Blueprint::new(Tags::common("elk", "dev", "DevOps", "elk-infra"));
        bp.begin_stack(StackKind::Network).unwrap();
        bp
    }

    #[test]
    fn test_declare_applies_common_tags() {
        let mut bp = blueprint();
        bp.resource(StackKind::Network, ResourceKind::Vpc, "elk-vpc")
            .name_tag()
            .declare()
            .unwrap();

        let manifest = bp.manifest("elk", "dev");
        assert_eq!(
            manifest.resources[0].properties["tags"],
            json!({
                "Environment": "dev",
                "ManagedBy": "elk-infra",
                "Name": "elk-vpc",
                "Owner": "DevOps",
                "Project": "elk",
            })
        );
    }

    #[test]
    fn test_untaggable_kind_rejects_tags() {
        let mut bp = blueprint();
        let err = bp
            .resource(StackKind::Network, ResourceKind::RouteTableAssociation, "elk-assoc")
            .name_tag()
            .declare()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { .. }));
    }

    #[test]
    fn test_untaggable_kind_has_no_tags_property() {
        let mut bp = blueprint();
        bp.resource(StackKind::Network, ResourceKind::RouteTableAssociation, "elk-assoc")
            .declare()
            .unwrap();
        assert!(!bp.get("elk-assoc").unwrap().properties.contains_key("tags"));
    }

    #[test]
    fn test_unresolved_reference() {
        let mut bp = blueprint();
        let err = bp
            .resource(StackKind::Network, ResourceKind::Subnet, "elk-subnet")
            .prop("vpcId", Reference::new("elk-vpc", "id"))
            .declare()
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { .. }));
        assert!(bp.is_empty());
    }

    #[test]
    fn test_duplicate_name() {
        let mut bp = blueprint();
        bp.resource(StackKind::Network, ResourceKind::Vpc, "elk-vpc")
            .declare()
            .unwrap();
        let err = bp
            .resource(StackKind::Network, ResourceKind::Vpc, "elk-vpc")
            .declare()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(_)));
    }

    #[test]
    fn test_invalid_name() {
        assert!(validate_name("elk-ecr.api-endpoint").is_ok());
        assert!(validate_name("-leading-dash").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_references_become_edges() {
        let mut bp = blueprint();
        let vpc = bp
            .resource(StackKind::Network, ResourceKind::Vpc, "elk-vpc")
            .declare()
            .unwrap();
        bp.resource(StackKind::Network, ResourceKind::SecurityGroup, "elk-sg")
            .prop("vpcId", vpc.id())
            .prop("cidr", vpc.output("cidrBlock"))
            .declare()
            .unwrap();

        assert_eq!(bp.graph().edge_count(), 1);
        let deps = bp.graph().get_direct_dependencies("elk-sg");
        assert_eq!(deps[0].attributes, vec!["id", "cidrBlock"]);
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_stack_ordering_enforced() {
        let mut bp = Blueprint::new(Tags::new());
        let err = bp.begin_stack(StackKind::Security).unwrap_err();
        assert!(matches!(
            err,
            Error::StackOrdering { ref dependency, .. } if dependency == "network"
        ));

        bp.begin_stack(StackKind::Network).unwrap();
        bp.finish_stack(StackKind::Network).unwrap();
        bp.begin_stack(StackKind::Security).unwrap();
        bp.finish_stack(StackKind::Security).unwrap();

        // compute needs data as well
        assert!(bp.begin_stack(StackKind::Compute).is_err());
        assert!(matches!(
            bp.begin_stack(StackKind::Network),
            Err(Error::StackRedeclared(_))
        ));
    }

    #[test]
    fn test_declare_outside_current_stack() {
        let mut bp = blueprint();
        let err = bp
            .resource(StackKind::Security, ResourceKind::KmsKey, "elk-kms-key")
            .declare()
            .unwrap_err();
        assert!(matches!(err, Error::StackOrdering { .. }));
    }

    #[test]
    fn test_export_requires_declared_resource() {
        let mut bp = blueprint();
        assert!(bp.export("vpc_id", Reference::new("elk-vpc", "id")).is_err());
        let vpc = bp
            .resource(StackKind::Network, ResourceKind::Vpc, "elk-vpc")
            .declare()
            .unwrap();
        bp.export("vpc_id", vpc.id()).unwrap();
        assert_eq!(
            bp.manifest("elk", "dev").outputs["vpc_id"],
            json!("${elk-vpc.id}")
        );
    }
}
