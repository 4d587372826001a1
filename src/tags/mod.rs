//! Resource tags and their propagation.
//!
//! Every taggable resource in a deployment carries the common tag set:
//!
//! - `Project`: the configured project name
//! - `Environment`: the configured environment
//! - `ManagedBy`: the tool owning the resources
//! - `Owner`: the owning team
//!
//! Resources may add their own tags (`Name`, `Type`, ...) on top of the common
//! set, but never replace a common key. That keeps the tag set of every
//! declared resource a superset of the common set.
//!
//! # Example
//!
//! ```rust
//! use elk_infra::tags::Tags;
//!
//! let common = Tags::common("elk", "dev", "DevOps", "elk-infra");
//! let extra = Tags::new().with("Name", "elk-vpc");
//!
//! let merged = common.merge(&extra).unwrap();
//! assert!(merged.is_superset_of(&common));
//! assert_eq!(merged.get("Name"), Some("elk-vpc"));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Well-known tag keys
pub mod keys {
    /// Project the resource belongs to
    pub const PROJECT: &str = "Project";

    /// Deployment environment
    pub const ENVIRONMENT: &str = "Environment";

    /// Tool managing the resource
    pub const MANAGED_BY: &str = "ManagedBy";

    /// Owning team
    pub const OWNER: &str = "Owner";

    /// Display name shown in the provider console
    pub const NAME: &str = "Name";

    /// Subnet tier (Public / Private)
    pub const TYPE: &str = "Type";
}

/// An ordered set of key/value tags.
///
/// Keys are kept sorted so that rendering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build the common tag set shared by every resource in a deployment
    pub fn common(project: &str, environment: &str, owner: &str, managed_by: &str) -> Self {
        Self::new()
            .with(keys::PROJECT, project)
            .with(keys::ENVIRONMENT, environment)
            .with(keys::MANAGED_BY, managed_by)
            .with(keys::OWNER, owner)
    }

    /// Add a tag, returning the updated set
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a tag in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a tag value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over tags in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every tag in `other` is present here with the same value
    pub fn is_superset_of(&self, other: &Tags) -> bool {
        other.iter().all(|(k, v)| self.get(k) == Some(v))
    }

    /// Layer resource-specific tags on top of this (common) set.
    ///
    /// A resource tag may repeat a common tag with the same value, but a
    /// different value for a common key is rejected.
    pub fn merge(&self, extra: &Tags) -> Result<Tags> {
        let mut merged = self.clone();
        for (key, value) in extra.iter() {
            match self.get(key) {
                Some(existing) if existing != value => {
                    return Err(Error::TagConflict {
                        key: key.to_string(),
                    });
                }
                _ => merged.insert(key, value),
            }
        }
        Ok(merged)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
