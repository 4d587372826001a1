//! Provider lookups performed at declaration time.
//!
//! A few values have to be known while the graph is built: the region (for
//! endpoint service names), the availability zones (they appear in subnet
//! names) and the account id (embedded in the KMS key policy). They sit
//! behind the [`Provider`] trait so the graph can be built without cloud
//! credentials and tests can substitute their own answers.

use std::fmt;

use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::graph::Input;

/// Data-source function resolving the caller identity
pub const CALLER_IDENTITY_FUNCTION: &str = "aws:index/getCallerIdentity:getCallerIdentity";

/// Declaration-time provider lookups.
pub trait Provider: fmt::Debug {
    /// Region the deployment targets
    fn region(&self) -> Result<String>;

    /// Availability zones in the region, in provider order
    fn availability_zones(&self) -> Result<Vec<String>>;

    /// Account id, either known or deferred to the engine
    fn account_id(&self) -> Result<Input>;
}

/// Answers every lookup from the validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticProvider {
    region: String,
    availability_zones: Vec<String>,
    account_id: Option<String>,
}

impl StaticProvider {
    /// Create a provider with explicit answers
    pub fn new(
        region: impl Into<String>,
        availability_zones: Vec<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            region: region.into(),
            availability_zones,
            account_id,
        }
    }

    /// Create a provider answering from configuration
    pub fn from_config(config: &StackConfig) -> Self {
        Self::new(
            config.region.clone(),
            config.availability_zones.clone(),
            config.account_id.clone(),
        )
    }
}

impl Provider for StaticProvider {
    fn region(&self) -> Result<String> {
        if self.region.is_empty() {
            return Err(Error::provider_lookup("region", "no region configured"));
        }
        Ok(self.region.clone())
    }

    /// Known zones located in the region
    fn availability_zones(&self) -> Result<Vec<String>> {
        let zones: Vec<String> = self
            .availability_zones
            .iter()
            .filter(|zone| zone.starts_with(&self.region))
            .cloned()
            .collect();
        if zones.is_empty() {
            return Err(Error::provider_lookup(
                "availability_zones",
                format!("no availability zones known for {}", self.region),
            ));
        }
        Ok(zones)
    }

    fn account_id(&self) -> Result<Input> {
        Ok(match &self.account_id {
            Some(id) => Input::from(id.as_str()),
            None => Input::Invoke {
                function: CALLER_IDENTITY_FUNCTION.to_string(),
                field: "accountId".to_string(),
            },
        })
    }
}
