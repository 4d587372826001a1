//! Task definitions, services and autoscaling of the logging components.

use indexmap::IndexMap;

use super::compute::{ComputeStack, ServiceRoute};
use super::network::NetworkStack;
use super::security::SecurityStack;
use super::{LoggingComponent, StackContext};
use crate::aws::ecs::{container_definitions_input, TargetTracking, FARGATE};
use crate::config::StackConfig;
use crate::error::Result;
use crate::graph::{Blueprint, Input, ResourceHandle, ResourceKind, StackKind};
use crate::provider::Provider;

const MIN_CAPACITY: u32 = 1;
const MAX_CAPACITY: u32 = 5;
const SCALABLE_DIMENSION: &str = "ecs:service:DesiredCount";

/// Resources of one deployed component.
#[derive(Debug, Clone)]
pub struct LoggingService {
    pub task_definition: ResourceHandle,
    pub service: ResourceHandle,
    pub scaling_target: ResourceHandle,
    pub scaling_policies: Vec<ResourceHandle>,
}

/// Monitoring stack outputs.
#[derive(Debug, Clone)]
pub struct MonitoringStack {
    pub services: IndexMap<LoggingComponent, LoggingService>,
}

impl MonitoringStack {
    pub fn new(
        blueprint: &mut Blueprint,
        config: &StackConfig,
        provider: &dyn Provider,
        network: &NetworkStack,
        security: &SecurityStack,
        compute: &ComputeStack,
    ) -> Result<Self> {
        let mut ctx = StackContext::begin(blueprint, config, provider, StackKind::Monitoring)?;

        let mut deployed = Vec::new();
        for component in LoggingComponent::ALL {
            let task_definition = create_task_definition(&mut ctx, security, component)?;
            let service = create_service(
                &mut ctx,
                network,
                security,
                compute,
                &task_definition,
                component,
            )?;
            deployed.push((component, task_definition, service));
        }

        let mut services = IndexMap::new();
        for (component, task_definition, service) in deployed {
            let (scaling_target, scaling_policies) =
                create_auto_scaling(&mut ctx, compute, &service, component)?;
            services.insert(
                component,
                LoggingService {
                    task_definition,
                    service,
                    scaling_target,
                    scaling_policies,
                },
            );
        }

        ctx.finish()?;

        Ok(Self { services })
    }
}

fn create_task_definition(
    ctx: &mut StackContext<'_>,
    security: &SecurityStack,
    component: LoggingComponent,
) -> Result<ResourceHandle> {
    ctx.create(&format!("{}-task", component), |ctx| {
        let containers = container_definitions_input(&[component.container()])?;
        ctx.resource(ResourceKind::TaskDefinition, &format!("{}-task", component))
            .prop("family", component.name())
            .prop("networkMode", "awsvpc")
            .prop("containerDefinitions", containers)
            .prop("requiresCompatibilities", vec![Input::from(FARGATE)])
            .prop("executionRoleArn", security.ecs_execution_role.arn())
            .prop("taskRoleArn", security.ecs_task_role.arn())
            .prop("memory", component.task_memory().to_string())
            .prop("cpu", component.task_cpu().to_string())
            .declare()
    })
}

fn create_service(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
    security: &SecurityStack,
    compute: &ComputeStack,
    task_definition: &ResourceHandle,
    component: LoggingComponent,
) -> Result<ResourceHandle> {
    ctx.create(&format!("{}-service", component), |ctx| {
        let ServiceRoute {
            target_group,
            listener_rule,
        } = compute.route(component)?;

        let network_configuration = Input::map([
            ("assignPublicIp", Input::from(false)),
            ("subnets", Input::from(network.private_subnet_ids())),
            (
                "securityGroups",
                Input::from(vec![security.ecs_security_group.id()]),
            ),
        ]);
        let load_balancer = Input::map([
            ("targetGroupArn", Input::from(target_group.arn())),
            ("containerName", Input::from(component.name())),
            ("containerPort", Input::from(component.port())),
        ]);

        ctx.resource(ResourceKind::EcsService, &format!("{}-service", component))
            .prop("cluster", compute.cluster.id())
            .prop("taskDefinition", task_definition.arn())
            .prop("desiredCount", component.desired_count())
            .prop("launchType", FARGATE)
            .prop("networkConfiguration", network_configuration)
            .prop("loadBalancers", vec![load_balancer])
            .depends_on(listener_rule)
            .declare()
    })
}

fn create_auto_scaling(
    ctx: &mut StackContext<'_>,
    compute: &ComputeStack,
    service: &ResourceHandle,
    component: LoggingComponent,
) -> Result<(ResourceHandle, Vec<ResourceHandle>)> {
    ctx.create("auto-scaling", |ctx| {
        let resource_id = Input::concat([
            Input::from("service/"),
            Input::from(compute.cluster_name()),
            Input::from("/"),
            Input::from(service.output("name")),
        ]);

        let target = ctx
            .resource(ResourceKind::AutoscalingTarget, &format!("{}-as-target", component))
            .prop("maxCapacity", MAX_CAPACITY)
            .prop("minCapacity", MIN_CAPACITY)
            .prop("resourceId", resource_id)
            .prop("scalableDimension", SCALABLE_DIMENSION)
            .prop("serviceNamespace", "ecs")
            .declare()?;

        let mut policies = Vec::new();
        for tracking in [TargetTracking::cpu(), TargetTracking::memory()] {
            let policy = ctx
                .resource(
                    ResourceKind::AutoscalingPolicy,
                    &format!("{}-{}-scaling", component, tracking.metric.short_name()),
                )
                .prop("policyType", "TargetTrackingScaling")
                .prop("resourceId", target.output("resourceId"))
                .prop("scalableDimension", target.output("scalableDimension"))
                .prop("serviceNamespace", target.output("serviceNamespace"))
                .prop("targetTrackingScalingPolicyConfiguration", tracking.to_input())
                .declare()?;
            policies.push(policy);
        }

        Ok((target, policies))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::data::DataStack;
    use crate::stacks::test_support;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn build() -> (Blueprint, MonitoringStack) {
        let config = test_support::config();
        let provider = test_support::provider(&config);
        let mut blueprint = Blueprint::new(config.common_tags());
        let network = NetworkStack::new(&mut blueprint, &config, &provider).unwrap();
        let security = SecurityStack::new(&mut blueprint, &config, &provider, &network).unwrap();
        let data = DataStack::new(&mut blueprint, &config, &provider, &network, &security).unwrap();
        let compute =
            ComputeStack::new(&mut blueprint, &config, &provider, &network, &security, &data)
                .unwrap();
        let monitoring = MonitoringStack::new(
            &mut blueprint,
            &config,
            &provider,
            &network,
            &security,
            &compute,
        )
        .unwrap();
        (blueprint, monitoring)
    }

    #[test]
    fn test_task_sizes() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");
        let expected = [
            ("elk-elasticsearch-task", "1024", "2048"),
            ("elk-logstash-task", "256", "512"),
            ("elk-kibana-task", "1024", "2048"),
        ];
        for (name, cpu, memory) in expected {
            let task = manifest.resource(name).unwrap();
            assert_eq!(task.properties["cpu"], json!(cpu), "{name}");
            assert_eq!(task.properties["memory"], json!(memory), "{name}");
            assert_eq!(task.properties["requiresCompatibilities"], json!(["FARGATE"]));
        }
    }

    #[test]
    fn test_container_definitions_are_json_strings() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");
        let task = manifest.resource("elk-elasticsearch-task").unwrap();
        let containers: Value =
            serde_json::from_str(task.properties["containerDefinitions"].as_str().unwrap())
                .unwrap();
        assert_eq!(
            containers[0]["image"],
            json!("docker.elastic.co/elasticsearch/elasticsearch:8.10.0")
        );
        assert_eq!(
            containers[0]["environment"][0],
            json!({"name": "discovery.type", "value": "single-node"})
        );
    }

    #[test]
    fn test_services() {
        let (blueprint, monitoring) = build();
        assert_eq!(monitoring.services.len(), 3);

        let manifest = blueprint.manifest("elk", "dev");
        let kibana = manifest.resource("elk-kibana-service").unwrap();
        assert_eq!(kibana.properties["desiredCount"], json!(1));
        assert_eq!(kibana.properties["cluster"], json!("${elk-ecs-cluster.id}"));
        assert_eq!(
            kibana.properties["networkConfiguration"]["assignPublicIp"],
            json!(false)
        );
        assert_eq!(
            kibana.properties["loadBalancers"],
            json!([{
                "targetGroupArn": "${elk-kibana-tg.arn}",
                "containerName": "kibana",
                "containerPort": 5601,
            }])
        );
        assert_eq!(kibana.depends_on, vec!["elk-kibana-rule"]);

        let logstash = manifest.resource("elk-logstash-service").unwrap();
        assert_eq!(logstash.properties["desiredCount"], json!(2));
    }

    #[test]
    fn test_autoscaling() {
        let (blueprint, monitoring) = build();
        let logstash = &monitoring.services[&LoggingComponent::Logstash];
        assert_eq!(logstash.scaling_policies.len(), 2);

        let manifest = blueprint.manifest("elk", "dev");
        let target = manifest.resource("elk-logstash-as-target").unwrap();
        assert_eq!(
            target.properties["resourceId"],
            json!("service/${elk-ecs-cluster.name}/${elk-logstash-service.name}")
        );
        assert_eq!(target.properties["minCapacity"], json!(1));
        assert_eq!(target.properties["maxCapacity"], json!(5));

        let cpu = manifest.resource("elk-logstash-cpu-scaling").unwrap();
        let config = &cpu.properties["targetTrackingScalingPolicyConfiguration"];
        assert_eq!(config["targetValue"], json!(70.0));
        assert_eq!(config["scaleInCooldown"], json!(60));

        let memory = manifest.resource("elk-logstash-memory-scaling").unwrap();
        assert_eq!(
            memory.properties["targetTrackingScalingPolicyConfiguration"]["targetValue"],
            json!(80.0)
        );
        assert_eq!(
            memory.properties["resourceId"],
            json!("${elk-logstash-as-target.resourceId}")
        );
    }

    #[test]
    fn test_services_declared_before_autoscaling() {
        let (blueprint, _) = build();
        let names: Vec<&str> = blueprint
            .specs()
            .filter(|s| s.stack == StackKind::Monitoring)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(&names[..4], &[
            "elk-elasticsearch-task",
            "elk-elasticsearch-service",
            "elk-logstash-task",
            "elk-logstash-service",
        ]);
        assert_eq!(names.len(), 15);
    }
}
