//! Application load balancer settings: health checks, listener actions and
//! routing conditions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{Input, Reference};

/// Health check of a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub enabled: bool,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    /// Seconds between checks
    pub interval: u32,
    /// Seconds before a check fails
    pub timeout: u32,
    pub path: String,
    pub port: String,
    pub protocol: String,
    pub matcher: String,
}

impl HealthCheck {
    /// HTTP check of `path` on the traffic port
    pub fn http(path: impl Into<String>) -> Self {
        Self {
            enabled: true,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
            interval: 30,
            timeout: 5,
            path: path.into(),
            port: "traffic-port".to_string(),
            protocol: "HTTP".to_string(),
            matcher: "200".to_string(),
        }
    }

    pub fn to_input(&self) -> Result<Input> {
        if self.timeout >= self.interval {
            return Err(Error::invalid_attribute(
                "health_check.timeout",
                format!("{}s must be shorter than the {}s interval", self.timeout, self.interval),
            ));
        }
        Ok(Input::literal(serde_json::to_value(self)?))
    }
}

/// What a listener does with a matching request.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerAction {
    /// Answer directly without a target
    FixedResponse {
        status_code: u16,
        content_type: String,
        message_body: String,
    },
    /// Forward to weighted target groups
    Forward(Vec<(Reference, u32)>),
}

impl ListenerAction {
    /// Plain-text 404 answer
    pub fn not_found() -> Self {
        ListenerAction::FixedResponse {
            status_code: 404,
            content_type: "text/plain".to_string(),
            message_body: "Not Found".to_string(),
        }
    }

    /// Forward everything to one target group
    pub fn forward_to(target_group_arn: Reference) -> Self {
        ListenerAction::Forward(vec![(target_group_arn, 1)])
    }

    pub fn to_input(&self) -> Input {
        match self {
            ListenerAction::FixedResponse {
                status_code,
                content_type,
                message_body,
            } => Input::map([
                ("type", Input::from("fixed-response")),
                (
                    "fixedResponse",
                    Input::map([
                        ("statusCode", Input::from(status_code.to_string())),
                        ("contentType", Input::from(content_type.as_str())),
                        ("messageBody", Input::from(message_body.as_str())),
                    ]),
                ),
            ]),
            ListenerAction::Forward(groups) => Input::map([
                ("type", Input::from("forward")),
                (
                    "forward",
                    Input::map([(
                        "targetGroups",
                        Input::list(groups.iter().map(|(arn, weight)| {
                            Input::map([
                                ("arn", Input::from(arn.clone())),
                                ("weight", Input::from(*weight)),
                            ])
                        })),
                    )]),
                ),
            ]),
        }
    }
}

/// Routing condition matching request paths
pub fn path_pattern_condition(pattern: impl Into<String>) -> Input {
    Input::map([(
        "pathPattern",
        Input::map([("values", Input::list([Input::from(pattern.into())]))]),
    )])
}
