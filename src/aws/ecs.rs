//! ECS container definitions and service autoscaling settings.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::Input;

/// Launch type / compatibility of every task
pub const FARGATE: &str = "FARGATE";

/// Name/value pair of a container environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub name: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A container port exposed by the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
}

/// One container of a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    /// Hard memory limit in MiB
    pub memory: u32,
    /// CPU units
    pub cpu: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
}

/// Render container definitions as the JSON string a task definition expects
pub fn container_definitions_input(containers: &[ContainerDefinition]) -> Result<Input> {
    let value = serde_json::to_value(containers)?;
    Ok(Input::to_json(Input::literal(value)))
}

/// Service metrics usable for target tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMetric {
    Cpu,
    Memory,
}

impl ScalingMetric {
    /// Predefined metric type name
    pub fn metric_type(self) -> &'static str {
        match self {
            ScalingMetric::Cpu => "ECSServiceAverageCPUUtilization",
            ScalingMetric::Memory => "ECSServiceAverageMemoryUtilization",
        }
    }

    /// Short name used in resource names
    pub fn short_name(self) -> &'static str {
        match self {
            ScalingMetric::Cpu => "cpu",
            ScalingMetric::Memory => "memory",
        }
    }
}

/// A target tracking scaling policy configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetTracking {
    pub metric: ScalingMetric,
    /// Utilization percentage to hold
    pub target_value: f64,
    pub scale_in_cooldown: u32,
    pub scale_out_cooldown: u32,
}

impl TargetTracking {
    /// Hold average CPU at 70% with one minute cooldowns
    pub fn cpu() -> Self {
        Self {
            metric: ScalingMetric::Cpu,
            target_value: 70.0,
            scale_in_cooldown: 60,
            scale_out_cooldown: 60,
        }
    }

    /// Hold average memory at 80% with 100 second cooldowns
    pub fn memory() -> Self {
        Self {
            metric: ScalingMetric::Memory,
            target_value: 80.0,
            scale_in_cooldown: 100,
            scale_out_cooldown: 100,
        }
    }

    pub fn to_input(&self) -> Input {
        Input::map([
            (
                "predefinedMetricSpecification",
                Input::map([("predefinedMetricType", Input::from(self.metric.metric_type()))]),
            ),
            ("targetValue", Input::from(self.target_value)),
            ("scaleInCooldown", Input::from(self.scale_in_cooldown)),
            ("scaleOutCooldown", Input::from(self.scale_out_cooldown)),
        ])
    }
}
