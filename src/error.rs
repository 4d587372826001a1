//! Error types for elk-infra.
//!
//! This module defines the error types used while loading configuration and
//! declaring the resource graph. Every resource declaration runs inside a
//! failure boundary that wraps the underlying cause in
//! [`Error::ResourceCreation`], so a failed build always names the stack and
//! the resource that broke it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for elk-infra operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for elk-infra.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A required configuration key was not provided.
    #[error("Missing required configuration key '{0}'")]
    MissingConfig(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Failed to read or parse a configuration file.
    #[error("Failed to load configuration from '{path}': {message}")]
    ConfigLoad {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Declaration Errors
    // ========================================================================
    /// A resource could not be declared. Wraps the underlying cause.
    #[error("Failed to create {resource} in {stack} stack: {source}")]
    ResourceCreation {
        /// Stack that owns the resource
        stack: String,
        /// Human readable resource kind (e.g. "VPC", "ALB listener")
        resource: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Two resources were declared with the same logical name.
    #[error("Duplicate resource name '{0}'")]
    DuplicateResource(String),

    /// A logical resource name does not satisfy the naming rules.
    #[error("Invalid resource name '{name}': {message}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Error message
        message: String,
    },

    /// A property references a resource that is not declared in this graph.
    #[error("Unresolved reference '{reference}' in resource '{resource}'")]
    UnresolvedReference {
        /// Resource holding the reference
        resource: String,
        /// Rendered reference
        reference: String,
    },

    /// Invalid attribute value in a resource specification.
    #[error("Invalid attribute '{attribute}': {message}")]
    InvalidAttribute {
        /// Attribute name
        attribute: String,
        /// Error message
        message: String,
    },

    /// Resource-specific tags tried to replace a common tag.
    #[error("Tag '{key}' shadows the common tag set")]
    TagConflict {
        /// Conflicting tag key
        key: String,
    },

    /// A stack was declared before one of the stacks it depends on.
    #[error("Stack '{stack}' declared before its dependency '{dependency}'")]
    StackOrdering {
        /// Stack being declared
        stack: String,
        /// Missing upstream stack
        dependency: String,
    },

    /// A stack was declared twice in the same deployment.
    #[error("Stack '{0}' already declared")]
    StackRedeclared(String),

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// A provider lookup (availability zones, region, account) failed.
    #[error("Provider lookup '{lookup}' failed: {message}")]
    ProviderLookup {
        /// Lookup name
        lookup: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// State persistence error.
    #[error(transparent)]
    State(#[from] crate::state::StateError),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Wraps an error in the failure boundary of a resource declaration.
    pub fn resource_creation(
        stack: impl Into<String>,
        resource: impl Into<String>,
        source: Error,
    ) -> Self {
        Self::ResourceCreation {
            stack: stack.into(),
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid attribute error.
    pub fn invalid_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Creates a new provider lookup error.
    pub fn provider_lookup(lookup: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderLookup {
            lookup: lookup.into(),
            message: message.into(),
        }
    }

    /// Returns the innermost cause, skipping failure-boundary wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ResourceCreation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingConfig(_) | Error::InvalidConfig { .. } | Error::ConfigLoad { .. } => 2,
            Error::ResourceCreation { .. } => match self.root_cause() {
                Error::ProviderLookup { .. } => 5,
                _ => 3,
            },
            Error::DuplicateResource(_)
            | Error::InvalidName { .. }
            | Error::UnresolvedReference { .. }
            | Error::InvalidAttribute { .. }
            | Error::TagConflict { .. } => 3,
            Error::StackOrdering { .. }
            | Error::StackRedeclared(_)
            | Error::DependencyCycle(_) => 4,
            Error::ProviderLookup { .. } => 5,
            Error::State(_) => 6,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_creation_message_names_stack_and_resource() {
        let err = Error::resource_creation(
            "network",
            "VPC",
            Error::invalid_attribute("cidr_block", "not a CIDR"),
        );
        let msg = err.to_string();
        assert!(msg.contains("VPC"));
        assert!(msg.contains("network"));
        assert!(msg.contains("not a CIDR"));
    }

    #[test]
    fn test_root_cause_unwraps_boundaries() {
        let err = Error::resource_creation(
            "data",
            "DB instance",
            Error::DuplicateResource("elk-postgresql".to_string()),
        );
        assert!(matches!(err.root_cause(), Error::DuplicateResource(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::MissingConfig("project".into()).exit_code(), 2);
        assert_eq!(Error::DuplicateResource("x".into()).exit_code(), 3);
        assert_eq!(Error::DependencyCycle("a -> b".into()).exit_code(), 4);
        assert_eq!(Error::provider_lookup("region", "down").exit_code(), 5);
    }

    #[test]
    fn test_wrapped_errors_keep_provider_exit_code() {
        let lookup = Error::resource_creation(
            "network",
            "PublicSubnet",
            Error::provider_lookup("availability_zones", "down"),
        );
        assert_eq!(lookup.exit_code(), 5);

        let declaration = Error::resource_creation(
            "data",
            "DB instance",
            Error::DuplicateResource("elk-postgresql".to_string()),
        );
        assert_eq!(declaration.exit_code(), 3);
    }

    #[test]
    fn test_error_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.context("reading manifest").unwrap_err();
        assert_eq!(err.to_string(), "reading manifest");
    }
}
