//! VPC, subnets, gateways, routing and VPC endpoints.

use indexmap::IndexMap;

use super::StackContext;
use crate::aws::ec2::{rules_input, Route, RouteTarget, RuleSource, SecurityGroupRule};
use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::graph::{Blueprint, Input, Reference, ResourceHandle, ResourceKind, StackKind};
use crate::provider::Provider;
use crate::tags::keys;

/// Interface endpoints giving private subnets access to the image registry
const INTERFACE_ENDPOINT_SERVICES: [&str; 2] = ["ecr.api", "ecr.dkr"];

/// Network stack outputs.
#[derive(Debug, Clone)]
pub struct NetworkStack {
    pub vpc: ResourceHandle,
    pub internet_gateway: ResourceHandle,
    pub public_subnets: Vec<ResourceHandle>,
    pub private_subnets: Vec<ResourceHandle>,
    pub nat_eip: ResourceHandle,
    pub nat_gateway: ResourceHandle,
    pub public_route_table: ResourceHandle,
    pub private_route_table: ResourceHandle,
    pub vpc_endpoint_security_group: ResourceHandle,
    /// Keyed by service (`s3`, `ecr.api`, `ecr.dkr`)
    pub vpc_endpoints: IndexMap<String, ResourceHandle>,
}

impl NetworkStack {
    pub fn new(
        blueprint: &mut Blueprint,
        config: &StackConfig,
        provider: &dyn Provider,
    ) -> Result<Self> {
        let mut ctx = StackContext::begin(blueprint, config, provider, StackKind::Network)?;

        let vpc = create_vpc(&mut ctx)?;
        let internet_gateway = create_internet_gateway(&mut ctx, &vpc)?;
        let public_subnets = create_public_subnets(&mut ctx, &vpc)?;
        let private_subnets = create_private_subnets(&mut ctx, &vpc)?;
        let (nat_eip, nat_gateway) =
            create_nat_gateway(&mut ctx, &public_subnets, &internet_gateway)?;
        let public_route_table =
            create_public_route_table(&mut ctx, &vpc, &internet_gateway, &public_subnets)?;
        let private_route_table =
            create_private_route_table(&mut ctx, &vpc, &nat_gateway, &private_subnets)?;
        let vpc_endpoint_security_group = create_vpc_endpoint_security_group(&mut ctx, &vpc)?;
        let vpc_endpoints = create_vpc_endpoints(
            &mut ctx,
            &vpc,
            &private_route_table,
            &private_subnets,
            &vpc_endpoint_security_group,
        )?;

        ctx.finish()?;

        Ok(Self {
            vpc,
            internet_gateway,
            public_subnets,
            private_subnets,
            nat_eip,
            nat_gateway,
            public_route_table,
            private_route_table,
            vpc_endpoint_security_group,
            vpc_endpoints,
        })
    }

    pub fn private_subnet_ids(&self) -> Vec<Reference> {
        self.private_subnets.iter().map(ResourceHandle::id).collect()
    }

    pub fn public_subnet_ids(&self) -> Vec<Reference> {
        self.public_subnets.iter().map(ResourceHandle::id).collect()
    }
}

fn create_vpc(ctx: &mut StackContext<'_>) -> Result<ResourceHandle> {
    ctx.create("VPC", |ctx| {
        let cidr = ctx.config().vpc_cidr;
        ctx.resource(ResourceKind::Vpc, "vpc")
            .prop("cidrBlock", cidr)
            .prop("enableDnsHostnames", true)
            .prop("enableDnsSupport", true)
            .name_tag()
            .declare()
    })
}

fn create_internet_gateway(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
) -> Result<ResourceHandle> {
    ctx.create("IGW", |ctx| {
        ctx.resource(ResourceKind::InternetGateway, "igw")
            .prop("vpcId", vpc.id())
            .name_tag()
            .declare()
    })
}

/// The first `az_count` zones reported by the provider
fn zones(ctx: &StackContext<'_>) -> Result<Vec<String>> {
    let wanted = ctx.config().az_count;
    let zones = ctx.provider().availability_zones()?;
    if zones.len() < wanted {
        return Err(Error::provider_lookup(
            "availability_zones",
            format!("{} zones requested, only {} available", wanted, zones.len()),
        ));
    }
    Ok(zones.into_iter().take(wanted).collect())
}

#[derive(Clone, Copy)]
enum Tier {
    Public,
    Private,
}

fn create_subnets(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
    tier: Tier,
) -> Result<Vec<ResourceHandle>> {
    let (label, offset, public) = match tier {
        Tier::Public => ("Public", 0, true),
        Tier::Private => ("Private", 1, false),
    };
    let vpc_cidr = ctx.config().vpc_cidr;

    let mut subnets = Vec::new();
    for (i, az) in zones(ctx)?.into_iter().enumerate() {
        let cidr = vpc_cidr.subnet24(i as u32 * 2 + offset)?;
        let suffix = format!("{}-{}", label.to_lowercase(), az);
        let subnet = ctx
            .resource(ResourceKind::Subnet, &suffix)
            .prop("vpcId", vpc.id())
            .prop("cidrBlock", cidr)
            .prop("availabilityZone", az.as_str())
            .prop_opt("mapPublicIpOnLaunch", public.then_some(true))
            .name_tag()
            .tag(keys::TYPE, label)
            .declare()?;
        subnets.push(subnet);
    }
    Ok(subnets)
}

fn create_public_subnets(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
) -> Result<Vec<ResourceHandle>> {
    ctx.create("PublicSubnet", |ctx| create_subnets(ctx, vpc, Tier::Public))
}

fn create_private_subnets(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
) -> Result<Vec<ResourceHandle>> {
    ctx.create("PrivateSubnet", |ctx| create_subnets(ctx, vpc, Tier::Private))
}

fn create_nat_gateway(
    ctx: &mut StackContext<'_>,
    public_subnets: &[ResourceHandle],
    internet_gateway: &ResourceHandle,
) -> Result<(ResourceHandle, ResourceHandle)> {
    ctx.create("NAT", |ctx| {
        let first_public = public_subnets
            .first()
            .ok_or_else(|| Error::invalid_attribute("subnetId", "no public subnet declared"))?;

        let eip = ctx
            .resource(ResourceKind::Eip, "nat-eip")
            .prop("domain", "vpc")
            .name_tag()
            .declare()?;

        let nat = ctx
            .resource(ResourceKind::NatGateway, "nat")
            .prop("allocationId", eip.id())
            .prop("subnetId", first_public.id())
            .name_tag()
            .depends_on(internet_gateway)
            .declare()?;

        Ok((eip, nat))
    })
}

fn create_route_table(
    ctx: &mut StackContext<'_>,
    prefix: &str,
    vpc: &ResourceHandle,
    route: Route,
    subnets: &[ResourceHandle],
) -> Result<ResourceHandle> {
    let route_table = ctx
        .resource(ResourceKind::RouteTable, &format!("{}-rt", prefix))
        .prop("vpcId", vpc.id())
        .prop("routes", vec![route.to_input()])
        .name_tag()
        .declare()?;

    for (i, subnet) in subnets.iter().enumerate() {
        ctx.resource(
            ResourceKind::RouteTableAssociation,
            &format!("{}-rt-assoc-{}", prefix, i),
        )
        .prop("subnetId", subnet.id())
        .prop("routeTableId", route_table.id())
        .declare()?;
    }

    Ok(route_table)
}

fn create_public_route_table(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
    internet_gateway: &ResourceHandle,
    public_subnets: &[ResourceHandle],
) -> Result<ResourceHandle> {
    ctx.create("PublicRouteTable", |ctx| {
        let route = Route::default_via(RouteTarget::InternetGateway(internet_gateway.id()));
        create_route_table(ctx, "public", vpc, route, public_subnets)
    })
}

fn create_private_route_table(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
    nat_gateway: &ResourceHandle,
    private_subnets: &[ResourceHandle],
) -> Result<ResourceHandle> {
    ctx.create("PrivateRouteTable", |ctx| {
        let route = Route::default_via(RouteTarget::NatGateway(nat_gateway.id()));
        create_route_table(ctx, "private", vpc, route, private_subnets)
    })
}

fn create_vpc_endpoint_security_group(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
) -> Result<ResourceHandle> {
    ctx.create("VPCSecurityGroup", |ctx| {
        let ingress = rules_input(&[SecurityGroupRule::tcp(
            443,
            RuleSource::Cidr(vec![Input::from(vpc.output("cidrBlock"))]),
        )])?;
        ctx.resource(ResourceKind::SecurityGroup, "vpce-sg")
            .prop("vpcId", vpc.id())
            .prop("description", "Security group for VPC endpoints")
            .prop("ingress", ingress)
            .name_tag()
            .declare()
    })
}

fn create_vpc_endpoints(
    ctx: &mut StackContext<'_>,
    vpc: &ResourceHandle,
    private_route_table: &ResourceHandle,
    private_subnets: &[ResourceHandle],
    endpoint_security_group: &ResourceHandle,
) -> Result<IndexMap<String, ResourceHandle>> {
    ctx.create("VPCEndpoints", |ctx| {
        let region = ctx.provider().region()?;
        let service_name = |service: &str| format!("com.amazonaws.{}.{}", region, service);
        let mut endpoints = IndexMap::new();

        let s3 = ctx
            .resource(ResourceKind::VpcEndpoint, "s3-endpoint")
            .prop("vpcId", vpc.id())
            .prop("serviceName", service_name("s3"))
            .prop("vpcEndpointType", "Gateway")
            .prop("routeTableIds", vec![private_route_table.id()])
            .name_tag()
            .declare()?;
        endpoints.insert("s3".to_string(), s3);

        let subnet_ids: Vec<Reference> = private_subnets.iter().map(ResourceHandle::id).collect();
        for service in INTERFACE_ENDPOINT_SERVICES {
            let endpoint = ctx
                .resource(ResourceKind::VpcEndpoint, &format!("{}-endpoint", service))
                .prop("vpcId", vpc.id())
                .prop("serviceName", service_name(service))
                .prop("vpcEndpointType", "Interface")
                .prop("subnetIds", subnet_ids.clone())
                .prop("securityGroupIds", vec![endpoint_security_group.id()])
                .prop("privateDnsEnabled", true)
                .name_tag()
                .declare()?;
            endpoints.insert(service.to_string(), endpoint);
        }

        Ok(endpoints)
    })
}
