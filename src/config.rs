//! Configuration module for elk-infra
//!
//! Handles loading and merging configuration from multiple sources:
//! - User configuration (`~/.config/elk-infra/config.{yaml,yml,toml,json}`)
//! - Project configuration (`./elk-infra.{yaml,yml,toml,json}`)
//! - An explicit file given on the command line (replaces the search)
//! - Environment variables (`ELK_INFRA_*`)
//!
//! The raw [`Config`] keeps every key optional so layers can be merged.
//! [`Config::validate`] turns it into a [`StackConfig`] with every required
//! key present and every default applied.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aws::Ipv4Cidr;
use crate::error::{Error, Result};
use crate::tags::Tags;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "ELK_INFRA_";

/// Default region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default VPC address range
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Default number of availability zones spanned
pub const DEFAULT_AZ_COUNT: usize = 2;

/// Default owning team
pub const DEFAULT_OWNER: &str = "DevOps";

/// Default `ManagedBy` tag value
pub const DEFAULT_MANAGED_BY: &str = "elk-infra";

/// Default state directory
pub const DEFAULT_STATE_DIR: &str = ".elk-infra";

/// Most zones a deployment may span; default zones are suffixed `a..=z`
pub const MAX_AZ_COUNT: usize = 26;

const MAX_PROJECT_LEN: usize = 32;
const MIN_STORAGE_GB: u32 = 20;
const MAX_STORAGE_GB: u32 = 65_536;

static PROJECT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("static pattern is valid"));
static ENVIRONMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").expect("static pattern is valid"));
static ACCOUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{12}$").expect("static pattern is valid"));

/// Raw configuration as read from files and the environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Project name, prefix of every resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Deployment environment (dev, staging, prod, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Public domain of the deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Database instance class, e.g. `db.t3.micro`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rds_instance_class: Option<String>,

    /// Database storage in GiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rds_allocated_storage: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,

    /// Account id; looked up by the engine when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_cidr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub az_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,

    /// Where manifest snapshots are recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(Error::ConfigLoad {
                    path: path.to_path_buf(),
                    message: "file does not exist".to_string(),
                });
            }
            config = config.merge_from_file(path)?;
        } else {
            for path in Self::get_config_paths() {
                if path.exists() {
                    tracing::debug!("Loading configuration from {}", path.display());
                    config = config.merge_from_file(&path)?;
                }
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Configuration file locations, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(dir) = dirs::config_dir() {
            let dir = dir.join("elk-infra");
            for ext in ["yaml", "yml", "toml", "json"] {
                paths.push(dir.join(format!("config.{}", ext)));
            }
        }

        for ext in ["yaml", "yml", "toml", "json"] {
            paths.push(PathBuf::from(format!("elk-infra.{}", ext)));
        }

        paths
    }

    /// Load a single file without search paths or environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let load_error = |message: String| Error::ConfigLoad {
            path: path.to_path_buf(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| load_error(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?,
            "toml" => toml::from_str(&content).map_err(|e| load_error(e.to_string()))?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| load_error(e.to_string()))?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; set values in `other` win
    pub fn merge(&self, other: Config) -> Config {
        Config {
            project: other.project.or_else(|| self.project.clone()),
            environment: other.environment.or_else(|| self.environment.clone()),
            domain: other.domain.or_else(|| self.domain.clone()),
            rds_instance_class: other
                .rds_instance_class
                .or_else(|| self.rds_instance_class.clone()),
            rds_allocated_storage: other.rds_allocated_storage.or(self.rds_allocated_storage),
            region: other.region.or_else(|| self.region.clone()),
            availability_zones: if other.availability_zones.is_empty() {
                self.availability_zones.clone()
            } else {
                other.availability_zones
            },
            account_id: other.account_id.or_else(|| self.account_id.clone()),
            vpc_cidr: other.vpc_cidr.or_else(|| self.vpc_cidr.clone()),
            az_count: other.az_count.or(self.az_count),
            owner: other.owner.or_else(|| self.owner.clone()),
            managed_by: other.managed_by.or_else(|| self.managed_by.clone()),
            state_dir: other.state_dir.or_else(|| self.state_dir.clone()),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        fn var(key: &str) -> Option<String> {
            std::env::var(format!("{}{}", ENV_PREFIX, key))
                .ok()
                .filter(|v| !v.is_empty())
        }

        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value.parse().map_err(|_| {
                Error::invalid_config(
                    format!("{}{}", ENV_PREFIX, key),
                    format!("'{}' is not a valid number", value),
                )
            })
        }

        if let Some(v) = var("PROJECT") {
            self.project = Some(v);
        }
        if let Some(v) = var("ENVIRONMENT") {
            self.environment = Some(v);
        }
        if let Some(v) = var("DOMAIN") {
            self.domain = Some(v);
        }
        if let Some(v) = var("RDS_INSTANCE_CLASS") {
            self.rds_instance_class = Some(v);
        }
        if let Some(v) = var("RDS_ALLOCATED_STORAGE") {
            self.rds_allocated_storage = Some(parse("RDS_ALLOCATED_STORAGE", v)?);
        }
        if let Some(v) = var("REGION") {
            self.region = Some(v);
        }
        if let Some(v) = var("AVAILABILITY_ZONES") {
            self.availability_zones = v
                .split(',')
                .map(str::trim)
                .filter(|z| !z.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("ACCOUNT_ID") {
            self.account_id = Some(v);
        }
        if let Some(v) = var("VPC_CIDR") {
            self.vpc_cidr = Some(v);
        }
        if let Some(v) = var("AZ_COUNT") {
            self.az_count = Some(parse("AZ_COUNT", v)?);
        }
        if let Some(v) = var("OWNER") {
            self.owner = Some(v);
        }
        if let Some(v) = var("MANAGED_BY") {
            self.managed_by = Some(v);
        }
        if let Some(v) = var("STATE_DIR") {
            self.state_dir = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Sample configuration written by `elk-infra init`
    pub fn example() -> Self {
        Config {
            project: Some("elk".to_string()),
            environment: Some("dev".to_string()),
            domain: Some("logs.example.com".to_string()),
            rds_instance_class: Some("db.t3.micro".to_string()),
            rds_allocated_storage: Some(20),
            region: Some(DEFAULT_REGION.to_string()),
            az_count: Some(DEFAULT_AZ_COUNT),
            ..Config::default()
        }
    }

    /// Check required keys and apply defaults
    pub fn validate(&self) -> Result<StackConfig> {
        let project = required(&self.project, "project")?;
        if !PROJECT_PATTERN.is_match(&project) || project.len() > MAX_PROJECT_LEN {
            return Err(Error::invalid_config(
                "project",
                format!(
                    "'{}' must start with a lowercase letter, contain only lowercase \
                     letters, digits or '-', and be at most {} characters",
                    project, MAX_PROJECT_LEN
                ),
            ));
        }

        let environment = required(&self.environment, "environment")?;
        if !ENVIRONMENT_PATTERN.is_match(&environment) {
            return Err(Error::invalid_config(
                "environment",
                format!("'{}' must be alphanumeric with '-'", environment),
            ));
        }

        let domain = required(&self.domain, "domain")?;

        let rds_instance_class = required(&self.rds_instance_class, "rds_instance_class")?;
        if !rds_instance_class.starts_with("db.") {
            return Err(Error::invalid_config(
                "rds_instance_class",
                format!("'{}' is not a database instance class", rds_instance_class),
            ));
        }

        let rds_allocated_storage = self
            .rds_allocated_storage
            .ok_or_else(|| Error::MissingConfig("rds_allocated_storage".to_string()))?;
        if !(MIN_STORAGE_GB..=MAX_STORAGE_GB).contains(&rds_allocated_storage) {
            return Err(Error::invalid_config(
                "rds_allocated_storage",
                format!(
                    "{} GiB is outside {}..={}",
                    rds_allocated_storage, MIN_STORAGE_GB, MAX_STORAGE_GB
                ),
            ));
        }

        let region = self
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let az_count = self.az_count.unwrap_or(DEFAULT_AZ_COUNT);
        if !(DEFAULT_AZ_COUNT..=MAX_AZ_COUNT).contains(&az_count) {
            return Err(Error::invalid_config(
                "az_count",
                format!("{} is outside {}..={}", az_count, DEFAULT_AZ_COUNT, MAX_AZ_COUNT),
            ));
        }

        let vpc_cidr: Ipv4Cidr = self
            .vpc_cidr
            .as_deref()
            .unwrap_or(DEFAULT_VPC_CIDR)
            .parse()
            .map_err(|e: Error| Error::invalid_config("vpc_cidr", e.to_string()))?;
        // public and private subnet per zone
        let last_subnet = u32::try_from(az_count)
            .ok()
            .and_then(|n| n.checked_mul(2))
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| {
                Error::invalid_config("az_count", format!("{} is too large", az_count))
            })?;
        vpc_cidr
            .subnet24(last_subnet)
            .map_err(|e| Error::invalid_config("vpc_cidr", e.to_string()))?;

        let availability_zones = if self.availability_zones.is_empty() {
            default_zones(&region, az_count)
        } else {
            if self.availability_zones.len() < az_count {
                return Err(Error::invalid_config(
                    "availability_zones",
                    format!(
                        "{} zones listed but az_count is {}",
                        self.availability_zones.len(),
                        az_count
                    ),
                ));
            }
            self.availability_zones.clone()
        };

        if let Some(account) = &self.account_id {
            if !ACCOUNT_PATTERN.is_match(account) {
                return Err(Error::invalid_config(
                    "account_id",
                    format!("'{}' is not a 12 digit account id", account),
                ));
            }
        }

        Ok(StackConfig {
            project,
            environment,
            domain,
            rds_instance_class,
            rds_allocated_storage,
            region,
            availability_zones,
            account_id: self.account_id.clone(),
            vpc_cidr,
            az_count,
            owner: self.owner.clone().unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            managed_by: self
                .managed_by
                .clone()
                .unwrap_or_else(|| DEFAULT_MANAGED_BY.to_string()),
            state_dir: self
                .state_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
        })
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(Error::MissingConfig(key.to_string())),
    }
}

/// `{region}a`, `{region}b`, ... one per zone
fn default_zones(region: &str, az_count: usize) -> Vec<String> {
    (b'a'..=b'z')
        .take(az_count)
        .map(|suffix| format!("{}{}", region, suffix as char))
        .collect()
}

/// Validated configuration of one deployment
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfig {
    pub project: String,
    pub environment: String,
    pub domain: String,
    pub rds_instance_class: String,
    pub rds_allocated_storage: u32,
    pub region: String,
    pub availability_zones: Vec<String>,
    pub account_id: Option<String>,
    pub vpc_cidr: Ipv4Cidr,
    pub az_count: usize,
    pub owner: String,
    pub managed_by: String,
    pub state_dir: PathBuf,
}

impl StackConfig {
    /// Tag set applied to every taggable resource
    pub fn common_tags(&self) -> Tags {
        Tags::common(&self.project, &self.environment, &self.owner, &self.managed_by)
    }

    /// `{project}-{suffix}`
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.project, suffix)
    }

    /// Database name derived from the project
    pub fn db_name(&self) -> String {
        format!("{}_db", self.project.replace('-', "_"))
    }
}
