//! Resource kinds, stacks and declared resource specifications.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::input::{Input, Reference};

/// The five stacks of a deployment, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    /// VPC, subnets, gateways, routing, endpoints
    Network,
    /// KMS, security groups, IAM roles, secrets
    Security,
    /// Managed PostgreSQL
    Data,
    /// ECS cluster and load balancing
    Compute,
    /// ELK task definitions, services, autoscaling
    Monitoring,
}

impl StackKind {
    /// All stacks in dependency order
    pub const ALL: [StackKind; 5] = [
        StackKind::Network,
        StackKind::Security,
        StackKind::Data,
        StackKind::Compute,
        StackKind::Monitoring,
    ];

    /// Stacks that must be fully declared before this one
    pub fn dependencies(self) -> &'static [StackKind] {
        match self {
            StackKind::Network => &[],
            StackKind::Security => &[StackKind::Network],
            StackKind::Data => &[StackKind::Network, StackKind::Security],
            StackKind::Compute => &[StackKind::Network, StackKind::Security, StackKind::Data],
            StackKind::Monitoring => {
                &[StackKind::Network, StackKind::Security, StackKind::Compute]
            }
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            StackKind::Network => "network",
            StackKind::Security => "security",
            StackKind::Data => "data",
            StackKind::Compute => "compute",
            StackKind::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every kind of cloud resource the deployment declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Vpc,
    InternetGateway,
    Subnet,
    Eip,
    NatGateway,
    RouteTable,
    RouteTableAssociation,
    SecurityGroup,
    VpcEndpoint,
    KmsKey,
    KmsAlias,
    IamRole,
    IamRolePolicy,
    IamRolePolicyAttachment,
    RandomPassword,
    Secret,
    SecretVersion,
    DbSubnetGroup,
    DbParameterGroup,
    DbInstance,
    EcsCluster,
    LoadBalancer,
    TargetGroup,
    Listener,
    ListenerRule,
    TaskDefinition,
    EcsService,
    AutoscalingTarget,
    AutoscalingPolicy,
}

impl ResourceKind {
    /// Provider type token understood by the provisioning engine
    pub fn type_token(self) -> &'static str {
        match self {
            ResourceKind::Vpc => "aws:ec2/vpc:Vpc",
            ResourceKind::InternetGateway => "aws:ec2/internetGateway:InternetGateway",
            ResourceKind::Subnet => "aws:ec2/subnet:Subnet",
            ResourceKind::Eip => "aws:ec2/eip:Eip",
            ResourceKind::NatGateway => "aws:ec2/natGateway:NatGateway",
            ResourceKind::RouteTable => "aws:ec2/routeTable:RouteTable",
            ResourceKind::RouteTableAssociation => {
                "aws:ec2/routeTableAssociation:RouteTableAssociation"
            }
            ResourceKind::SecurityGroup => "aws:ec2/securityGroup:SecurityGroup",
            ResourceKind::VpcEndpoint => "aws:ec2/vpcEndpoint:VpcEndpoint",
            ResourceKind::KmsKey => "aws:kms/key:Key",
            ResourceKind::KmsAlias => "aws:kms/alias:Alias",
            ResourceKind::IamRole => "aws:iam/role:Role",
            ResourceKind::IamRolePolicy => "aws:iam/rolePolicy:RolePolicy",
            ResourceKind::IamRolePolicyAttachment => {
                "aws:iam/rolePolicyAttachment:RolePolicyAttachment"
            }
            ResourceKind::RandomPassword => "random:index/randomPassword:RandomPassword",
            ResourceKind::Secret => "aws:secretsmanager/secret:Secret",
            ResourceKind::SecretVersion => "aws:secretsmanager/secretVersion:SecretVersion",
            ResourceKind::DbSubnetGroup => "aws:rds/subnetGroup:SubnetGroup",
            ResourceKind::DbParameterGroup => "aws:rds/parameterGroup:ParameterGroup",
            ResourceKind::DbInstance => "aws:rds/instance:Instance",
            ResourceKind::EcsCluster => "aws:ecs/cluster:Cluster",
            ResourceKind::LoadBalancer => "aws:lb/loadBalancer:LoadBalancer",
            ResourceKind::TargetGroup => "aws:lb/targetGroup:TargetGroup",
            ResourceKind::Listener => "aws:lb/listener:Listener",
            ResourceKind::ListenerRule => "aws:lb/listenerRule:ListenerRule",
            ResourceKind::TaskDefinition => "aws:ecs/taskDefinition:TaskDefinition",
            ResourceKind::EcsService => "aws:ecs/service:Service",
            ResourceKind::AutoscalingTarget => "aws:appautoscaling/target:Target",
            ResourceKind::AutoscalingPolicy => "aws:appautoscaling/policy:Policy",
        }
    }

    /// Whether the provider accepts a `tags` property on this kind
    pub fn is_taggable(self) -> bool {
        !matches!(
            self,
            ResourceKind::RouteTableAssociation
                | ResourceKind::KmsAlias
                | ResourceKind::IamRolePolicy
                | ResourceKind::IamRolePolicyAttachment
                | ResourceKind::RandomPassword
                | ResourceKind::SecretVersion
                | ResourceKind::ListenerRule
                | ResourceKind::AutoscalingPolicy
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_token())
    }
}

/// Ordered property map of a resource.
pub type Properties = IndexMap<String, Input>;

/// A fully declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    /// Unique logical name
    pub name: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Owning stack
    pub stack: StackKind,
    /// Desired attributes
    pub properties: Properties,
    /// Explicit ordering dependencies beyond property references
    pub depends_on: Vec<String>,
}

impl ResourceSpec {
    /// Every reference embedded in the properties, deduplicated, in first-seen order
    pub fn references(&self) -> Vec<&Reference> {
        let mut seen = Vec::new();
        for value in self.properties.values() {
            for reference in value.references() {
                if !seen.contains(&reference) {
                    seen.push(reference);
                }
            }
        }
        seen
    }
}

/// Identifier-bearing handle returned when a resource is declared.
///
/// Handles are cheap to clone and only produce deferred references; the
/// actual identifiers are assigned by the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    name: String,
    kind: ResourceKind,
}

impl ResourceHandle {
    pub(crate) fn new(name: String, kind: ResourceKind) -> Self {
        Self { name, kind }
    }

    /// Logical name of the resource
    pub fn logical_name(&self) -> &str {
        &self.name
    }

    /// Resource kind
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Reference to an arbitrary output attribute
    pub fn output(&self, attribute: &str) -> Reference {
        Reference::new(&self.name, attribute)
    }

    /// Provider identifier
    pub fn id(&self) -> Reference {
        self.output("id")
    }

    /// Amazon resource name
    pub fn arn(&self) -> Reference {
        self.output("arn")
    }
}
