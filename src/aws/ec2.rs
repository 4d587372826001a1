//! EC2 networking building blocks.
//!
//! - [`Ipv4Cidr`]: CIDR parsing and `/24` subnet carving
//! - [`SecurityGroupRule`]: ingress/egress rules whose source is either CIDR
//!   blocks or security groups
//! - [`Route`]: default routes through an internet or NAT gateway

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::graph::{Input, Reference};

/// CIDR block reachable from anywhere
pub const ANYWHERE: &str = "0.0.0.0/0";

/// An IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Create a CIDR block; host bits of `addr` must be zero
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::invalid_attribute(
                "cidr_block",
                format!("prefix length {} exceeds 32", prefix),
            ));
        }
        let cidr = Self {
            network: addr,
            prefix,
        };
        if u32::from(addr) & !cidr.mask() != 0 {
            return Err(Error::invalid_attribute(
                "cidr_block",
                format!("{}/{} has host bits set", addr, prefix),
            ));
        }
        Ok(cidr)
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix)
        }
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && u32::from(other.network) & self.mask() == u32::from(self.network)
    }

    /// The `index`-th `/24` block inside this one.
    ///
    /// For `10.0.0.0/16`, index 3 is `10.0.3.0/24`.
    pub fn subnet24(&self, index: u32) -> Result<Ipv4Cidr> {
        if self.prefix > 24 {
            return Err(Error::invalid_attribute(
                "cidr_block",
                format!("{} is too small to hold /24 subnets", self),
            ));
        }
        let capacity = 1u64 << (24 - self.prefix);
        if u64::from(index) >= capacity {
            return Err(Error::invalid_attribute(
                "cidr_block",
                format!("{} holds {} /24 subnets, index {} is out of range", self, capacity, index),
            ));
        }
        let base = u32::from(self.network) + (index << 8);
        Ipv4Cidr::new(Ipv4Addr::from(base), 24)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_attribute("cidr_block", format!("'{}' is not an IPv4 CIDR", s));
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Ipv4Cidr::new(addr, prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Ipv4Cidr> for Input {
    fn from(cidr: Ipv4Cidr) -> Self {
        Input::from(cidr.to_string())
    }
}

/// IP protocol of a security group rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    /// Every protocol; ports must be 0
    All,
}

impl Protocol {
    /// Provider spelling
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::All => "-1",
        }
    }
}

/// Where the traffic of a rule comes from (or goes to).
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSource {
    /// Literal or deferred CIDR blocks
    Cidr(Vec<Input>),
    /// Other security groups
    SecurityGroups(Vec<Reference>),
}

impl RuleSource {
    /// Traffic from anywhere
    pub fn anywhere() -> Self {
        RuleSource::Cidr(vec![Input::from(ANYWHERE)])
    }

    /// Traffic from one security group
    pub fn group(id: Reference) -> Self {
        RuleSource::SecurityGroups(vec![id])
    }
}

/// A security group ingress or egress rule.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
    pub description: Option<String>,
}

impl SecurityGroupRule {
    /// TCP rule for a single port
    pub fn tcp(port: u16, source: RuleSource) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: port,
            to_port: port,
            source,
            description: None,
        }
    }

    /// Every protocol and port to anywhere
    pub fn allow_all_outbound() -> Self {
        Self {
            protocol: Protocol::All,
            from_port: 0,
            to_port: 0,
            source: RuleSource::anywhere(),
            description: Some("Allow all outbound traffic".to_string()),
        }
    }

    /// Set the description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check port range and source
    pub fn validate(&self) -> Result<()> {
        if self.from_port > self.to_port {
            return Err(Error::invalid_attribute(
                "from_port",
                format!("{} is above to_port {}", self.from_port, self.to_port),
            ));
        }
        if self.protocol == Protocol::All && (self.from_port != 0 || self.to_port != 0) {
            return Err(Error::invalid_attribute(
                "protocol",
                "rules for all protocols must use port 0",
            ));
        }
        let empty = match &self.source {
            RuleSource::Cidr(blocks) => blocks.is_empty(),
            RuleSource::SecurityGroups(groups) => groups.is_empty(),
        };
        if empty {
            return Err(Error::invalid_attribute("source", "rule has no source"));
        }
        Ok(())
    }

    /// Validate and render as a resource property
    pub fn to_input(&self) -> Result<Input> {
        self.validate()?;
        let mut entries: Vec<(&str, Input)> = vec![
            ("protocol", Input::from(self.protocol.as_str())),
            ("fromPort", Input::from(self.from_port)),
            ("toPort", Input::from(self.to_port)),
        ];
        match &self.source {
            RuleSource::Cidr(blocks) => entries.push(("cidrBlocks", Input::list(blocks.clone()))),
            RuleSource::SecurityGroups(groups) => {
                entries.push(("securityGroups", Input::from(groups.clone())))
            }
        }
        if let Some(description) = &self.description {
            entries.push(("description", Input::from(description.as_str())));
        }
        Ok(Input::map(entries))
    }
}

/// Render a list of rules
pub fn rules_input(rules: &[SecurityGroupRule]) -> Result<Input> {
    let items = rules
        .iter()
        .map(SecurityGroupRule::to_input)
        .collect::<Result<Vec<_>>>()?;
    Ok(Input::list(items))
}

/// Next hop of a route.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteTarget {
    InternetGateway(Reference),
    NatGateway(Reference),
}

/// A route table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub destination: String,
    pub target: RouteTarget,
}

impl Route {
    /// `0.0.0.0/0` through `target`
    pub fn default_via(target: RouteTarget) -> Self {
        Self {
            destination: ANYWHERE.to_string(),
            target,
        }
    }

    /// Render as a resource property
    pub fn to_input(&self) -> Input {
        let hop = match &self.target {
            RouteTarget::InternetGateway(id) => ("gatewayId", Input::from(id.clone())),
            RouteTarget::NatGateway(id) => ("natGatewayId", Input::from(id.clone())),
        };
        Input::map([("cidrBlock", Input::from(self.destination.as_str())), hop])
    }
}
