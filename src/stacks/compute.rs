//! ECS cluster and the application load balancer in front of it.

use indexmap::IndexMap;

use super::data::DataStack;
use super::network::NetworkStack;
use super::security::SecurityStack;
use super::{LoggingComponent, StackContext};
use crate::aws::elb::{path_pattern_condition, HealthCheck, ListenerAction};
use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::graph::{Blueprint, Input, Reference, ResourceHandle, ResourceKind, StackKind};
use crate::provider::Provider;

const LISTENER_PORT: u16 = 80;
const HEALTH_CHECK_PATH: &str = "/health";

/// Load balancer routing of one component.
#[derive(Debug, Clone)]
pub struct ServiceRoute {
    pub target_group: ResourceHandle,
    pub listener_rule: ResourceHandle,
}

/// Compute stack outputs.
#[derive(Debug, Clone)]
pub struct ComputeStack {
    pub cluster: ResourceHandle,
    pub load_balancer: ResourceHandle,
    pub listener: ResourceHandle,
    pub routes: IndexMap<LoggingComponent, ServiceRoute>,
}

impl ComputeStack {
    /// `_data` is only taken to order the stacks
    pub fn new(
        blueprint: &mut Blueprint,
        config: &StackConfig,
        provider: &dyn Provider,
        network: &NetworkStack,
        security: &SecurityStack,
        _data: &DataStack,
    ) -> Result<Self> {
        let mut ctx = StackContext::begin(blueprint, config, provider, StackKind::Compute)?;

        let cluster = create_ecs_cluster(&mut ctx)?;
        let load_balancer = create_application_load_balancer(&mut ctx, network, security)?;

        let mut target_groups = Vec::new();
        for component in LoggingComponent::ALL {
            target_groups.push((component, create_target_group(&mut ctx, network, component)?));
        }

        let listener = create_listener(&mut ctx, &load_balancer)?;

        let mut routes = IndexMap::new();
        for (component, target_group) in target_groups {
            let listener_rule = create_listener_rule(&mut ctx, &listener, &target_group, component)?;
            routes.insert(
                component,
                ServiceRoute {
                    target_group,
                    listener_rule,
                },
            );
        }

        ctx.finish()?;

        Ok(Self {
            cluster,
            load_balancer,
            listener,
            routes,
        })
    }

    pub fn cluster_name(&self) -> Reference {
        self.cluster.output("name")
    }

    /// Routing of `component`
    pub fn route(&self, component: LoggingComponent) -> Result<&ServiceRoute> {
        self.routes.get(&component).ok_or_else(|| Error::UnresolvedReference {
            resource: component.name().to_string(),
            reference: format!("{}-tg", component),
        })
    }
}

fn create_ecs_cluster(ctx: &mut StackContext<'_>) -> Result<ResourceHandle> {
    ctx.create("ECS-cluster", |ctx| {
        let settings = Input::map([
            ("name", Input::from("containerInsights")),
            ("value", Input::from("enabled")),
        ]);
        ctx.resource(ResourceKind::EcsCluster, "ecs-cluster")
            .prop("settings", vec![settings])
            .declare()
    })
}

fn create_application_load_balancer(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
    security: &SecurityStack,
) -> Result<ResourceHandle> {
    ctx.create("ALB", |ctx| {
        let protected = ctx.config().environment == "prod";
        ctx.resource(ResourceKind::LoadBalancer, "app-lb")
            .prop("internal", false)
            .prop("loadBalancerType", "application")
            .prop("securityGroups", vec![security.alb_security_group.id()])
            .prop("subnets", network.public_subnet_ids())
            .prop("enableDeletionProtection", protected)
            .declare()
    })
}

fn create_target_group(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
    component: LoggingComponent,
) -> Result<ResourceHandle> {
    ctx.create("TargetGroup", |ctx| {
        let health_check = HealthCheck::http(HEALTH_CHECK_PATH).to_input()?;
        ctx.resource(ResourceKind::TargetGroup, &format!("{}-tg", component))
            .prop("port", component.port())
            .prop("protocol", "HTTP")
            .prop("vpcId", network.vpc.id())
            .prop("targetType", "ip")
            .prop("healthCheck", health_check)
            .declare()
    })
}

fn create_listener(
    ctx: &mut StackContext<'_>,
    load_balancer: &ResourceHandle,
) -> Result<ResourceHandle> {
    ctx.create("ALB-listener", |ctx| {
        ctx.resource(ResourceKind::Listener, "app-listener")
            .prop("loadBalancerArn", load_balancer.arn())
            .prop("port", LISTENER_PORT)
            .prop("protocol", "HTTP")
            .prop("defaultActions", vec![ListenerAction::not_found().to_input()])
            .declare()
    })
}

fn create_listener_rule(
    ctx: &mut StackContext<'_>,
    listener: &ResourceHandle,
    target_group: &ResourceHandle,
    component: LoggingComponent,
) -> Result<ResourceHandle> {
    ctx.create("ALB listener rule", |ctx| {
        ctx.resource(ResourceKind::ListenerRule, &format!("{}-rule", component))
            .prop("listenerArn", listener.arn())
            .prop("conditions", vec![path_pattern_condition(component.path_pattern())])
            .prop(
                "actions",
                vec![ListenerAction::forward_to(target_group.arn()).to_input()],
            )
            .prop("priority", component.listener_priority())
            .declare()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn build() -> (Blueprint, ComputeStack) {
        let config = test_support::config();
        let provider = test_support::provider(&config);
        let mut blueprint = Blueprint::new(config.common_tags());
        let network = NetworkStack::new(&mut blueprint, &config, &provider).unwrap();
        let security = SecurityStack::new(&mut blueprint, &config, &provider, &network).unwrap();
        let data = DataStack::new(&mut blueprint, &config, &provider, &network, &security).unwrap();
        let compute =
            ComputeStack::new(&mut blueprint, &config, &provider, &network, &security, &data)
                .unwrap();
        (blueprint, compute)
    }

    #[test]
    fn test_target_groups_per_component() {
        let (blueprint, compute) = build();
        let manifest = blueprint.manifest("elk", "dev");
        for component in LoggingComponent::ALL {
            let route = compute.route(component).unwrap();
            let tg = manifest.resource(route.target_group.logical_name()).unwrap();
            assert_eq!(tg.properties["port"], json!(component.port()));
            assert_eq!(tg.properties["targetType"], json!("ip"));
            assert_eq!(tg.properties["healthCheck"]["path"], json!("/health"));
        }
        assert_eq!(
            compute.route(LoggingComponent::Logstash).unwrap().target_group.logical_name(),
            "elk-logstash-tg"
        );
    }

    #[test]
    fn test_listener_defaults_to_not_found() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");
        let listener = manifest.resource("elk-app-listener").unwrap();
        assert_eq!(listener.properties["port"], json!(80));
        assert_eq!(
            listener.properties["defaultActions"][0]["fixedResponse"]["statusCode"],
            json!("404")
        );
    }

    #[test]
    fn test_listener_rules() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");
        let rule = manifest.resource("elk-kibana-rule").unwrap();
        assert_eq!(rule.properties["priority"], json!(30));
        assert_eq!(
            rule.properties["conditions"],
            json!([{"pathPattern": {"values": ["/kibana*"]}}])
        );
        assert_eq!(
            rule.properties["actions"][0]["forward"]["targetGroups"][0]["arn"],
            json!("${elk-kibana-tg.arn}")
        );
        assert!(rule.properties.get("tags").is_none());
    }

    #[test]
    fn test_cluster_and_load_balancer() {
        let (blueprint, compute) = build();
        assert_eq!(compute.cluster_name().to_string(), "${elk-ecs-cluster.name}");

        let manifest = blueprint.manifest("elk", "dev");
        let cluster = manifest.resource("elk-ecs-cluster").unwrap();
        assert_eq!(
            cluster.properties["settings"],
            json!([{"name": "containerInsights", "value": "enabled"}])
        );

        let alb = manifest.resource("elk-app-lb").unwrap();
        assert_eq!(alb.properties["internal"], json!(false));
        assert_eq!(alb.properties["securityGroups"], json!(["${elk-alb-sg.id}"]));
        assert_eq!(
            alb.properties["subnets"],
            json!(["${elk-public-us-east-1a.id}", "${elk-public-us-east-1b.id}"])
        );
    }
}
