//! Shared fixtures for the elk-infra integration tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use elk_infra::config::{Config, StackConfig};

/// Minimal valid configuration with a fixed account id
pub const BASE_CONFIG: &str = r#"project: elk
environment: dev
domain: logs.example.com
rds_instance_class: db.t3.micro
rds_allocated_storage: 20
account_id: "123456789012"
"#;

/// Write `BASE_CONFIG` plus `extra` lines and a state directory under `dir`
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("elk-infra.yaml");
    let content = format!(
        "{}state_dir: {}\n{}",
        BASE_CONFIG,
        dir.join("state").display(),
        extra
    );
    fs::write(&path, content).expect("write config");
    path
}

/// Validated configuration equivalent to `BASE_CONFIG`
pub fn stack_config() -> StackConfig {
    config().validate().expect("base config is valid")
}

/// Raw configuration equivalent to `BASE_CONFIG`
pub fn config() -> Config {
    Config {
        account_id: Some("123456789012".to_string()),
        ..Config::example()
    }
}
