//! Typed building blocks for AWS resource properties.
//!
//! The stacks assemble resource properties from these types instead of raw
//! maps, so structural rules are checked before anything reaches the
//! manifest:
//!
//! - [`ec2`]: CIDR blocks, security group rules, routes
//! - [`iam`]: policy documents
//! - [`ecs`]: container definitions, target tracking scaling
//! - [`elb`]: health checks, listener actions, routing conditions

pub mod ec2;
pub mod ecs;
pub mod elb;
pub mod iam;

pub use ec2::{Ipv4Cidr, Protocol, Route, RouteTarget, RuleSource, SecurityGroupRule};
pub use ecs::{ContainerDefinition, KeyValuePair, PortMapping, ScalingMetric, TargetTracking};
pub use elb::{HealthCheck, ListenerAction};
pub use iam::{Effect, PolicyDocument, Principal, Statement};
