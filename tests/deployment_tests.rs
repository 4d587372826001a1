//! End-to-end declaration tests: build every stack from configuration and
//! check the properties that must hold for any deployment.

mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use elk_infra::config::Config;
use elk_infra::graph::{Blueprint, ResourceKind, StackKind};
use elk_infra::provider::StaticProvider;
use elk_infra::stacks::network::NetworkStack;
use elk_infra::stacks::security::SecurityStack;
use elk_infra::stacks::{Deployment, StackContext};
use elk_infra::tags::keys;
use elk_infra::Error;

use common::{config, stack_config};

#[test]
fn test_rebuild_produces_identical_manifest() {
    let config = stack_config();
    let first = Deployment::build(&config).unwrap().manifest();
    let second = Deployment::build(&config).unwrap().manifest();

    assert_eq!(first, second);
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_every_name_is_prefixed_with_project() {
    let deployment = Deployment::build(&stack_config()).unwrap();
    for spec in deployment.blueprint().specs() {
        assert!(spec.name.starts_with("elk-"), "{}", spec.name);
    }
}

#[test]
fn test_taggable_resources_carry_common_tags() {
    let deployment = Deployment::build(&stack_config()).unwrap();
    let common = deployment.blueprint().common_tags();
    assert_eq!(common.get(keys::PROJECT), Some("elk"));
    assert_eq!(common.get(keys::MANAGED_BY), Some("elk-infra"));

    let mut tagged = 0;
    for spec in deployment.blueprint().specs() {
        let tags = spec.properties.get("tags").map(|t| t.render());
        if !spec.kind.is_taggable() {
            assert!(tags.is_none(), "{} must not be tagged", spec.name);
            continue;
        }
        let tags = tags.unwrap_or_else(|| panic!("{} has no tags", spec.name));
        for (key, value) in common.iter() {
            assert_eq!(tags[key], json!(value), "{} tag {}", spec.name, key);
        }
        tagged += 1;
    }
    assert!(tagged > 20);
}

#[test]
fn test_graph_is_acyclic_with_forward_edges() {
    let deployment = Deployment::build(&stack_config()).unwrap();
    let blueprint = deployment.blueprint();
    let graph = blueprint.graph();

    assert!(!graph.has_cycles());
    assert_eq!(graph.node_count(), blueprint.len());

    let position = |name: &str| blueprint.specs().position(|s| s.name == name).unwrap();
    for dep in graph.dependencies() {
        assert!(
            position(&dep.from) < position(&dep.to),
            "{} -> {}",
            dep.from,
            dep.to
        );
    }
}

#[test]
fn test_stacks_are_declared_in_dependency_order() {
    let deployment = Deployment::build(&stack_config()).unwrap();
    assert_eq!(deployment.blueprint().completed_stacks(), &StackKind::ALL[..]);

    let stacks: Vec<StackKind> = deployment.blueprint().specs().map(|s| s.stack).collect();
    let mut sorted = stacks.clone();
    sorted.sort();
    assert_eq!(stacks, sorted);
}

#[test]
fn test_stack_cannot_use_another_blueprints_upstream() {
    let config = stack_config();
    let provider = StaticProvider::from_config(&config);

    let mut first = Blueprint::new(config.common_tags());
    let network = NetworkStack::new(&mut first, &config, &provider).unwrap();

    let mut second = Blueprint::new(config.common_tags());
    let err = SecurityStack::new(&mut second, &config, &provider, &network).unwrap_err();
    match &err {
        Error::StackOrdering { stack, dependency } => {
            assert_eq!(stack, "security");
            assert_eq!(dependency, "network");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_stack_cannot_be_declared_twice() {
    let config = stack_config();
    let provider = StaticProvider::from_config(&config);
    let mut blueprint = Blueprint::new(config.common_tags());
    NetworkStack::new(&mut blueprint, &config, &provider).unwrap();

    let err = NetworkStack::new(&mut blueprint, &config, &provider).unwrap_err();
    assert!(matches!(err, Error::StackRedeclared(_)));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_duplicate_resource_fails_with_declaration_code() {
    let config = stack_config();
    let provider = StaticProvider::from_config(&config);
    let mut blueprint = Blueprint::new(config.common_tags());
    NetworkStack::new(&mut blueprint, &config, &provider).unwrap();

    let mut ctx = StackContext::begin(&mut blueprint, &config, &provider, StackKind::Security).unwrap();
    let err = ctx
        .create("VPC", |ctx| ctx.resource(ResourceKind::Vpc, "vpc").declare())
        .unwrap_err();
    assert!(matches!(err.root_cause(), Error::DuplicateResource(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_zone_lookup_failure_keeps_provider_code() {
    let config = stack_config();
    let provider = StaticProvider::new("eu-west-1", config.availability_zones.clone(), None);
    let err = Deployment::build_with_provider(&config, &provider).unwrap_err();
    assert!(matches!(err, Error::ResourceCreation { .. }));
    assert!(matches!(err.root_cause(), Error::ProviderLookup { .. }));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_exported_outputs() {
    let deployment = Deployment::build(&stack_config()).unwrap();
    let manifest = deployment.manifest();

    assert_eq!(manifest.outputs["vpc_id"], json!("${elk-vpc.id}"));
    assert_eq!(
        manifest.outputs["private_subnet_ids"],
        json!(["${elk-private-us-east-1a.id}", "${elk-private-us-east-1b.id}"])
    );
    assert_eq!(
        manifest.outputs["public_subnet_ids"],
        json!(["${elk-public-us-east-1a.id}", "${elk-public-us-east-1b.id}"])
    );
    assert_eq!(manifest.outputs["ecs_cluster_name"], json!("${elk-ecs-cluster.name}"));
    assert_eq!(manifest.outputs["rds_endpoint"], json!("${elk-postgresql.endpoint}"));
}

#[test]
fn test_three_zones() {
    let config = Config {
        az_count: Some(3),
        ..config()
    }
    .validate()
    .unwrap();
    assert_eq!(
        config.availability_zones,
        vec!["us-east-1a", "us-east-1b", "us-east-1c"]
    );

    let deployment = Deployment::build(&config).unwrap();
    assert_eq!(deployment.network.public_subnets.len(), 3);
    assert_eq!(deployment.network.private_subnets.len(), 3);

    let manifest = deployment.manifest();
    let cidr = |name: &str| manifest.resource(name).unwrap().properties["cidrBlock"].clone();
    assert_eq!(cidr("elk-public-us-east-1c"), json!("10.0.4.0/24"));
    assert_eq!(cidr("elk-private-us-east-1c"), json!("10.0.5.0/24"));
}

#[test]
fn test_prod_protects_database_and_load_balancer() {
    let config = Config {
        environment: Some("prod".to_string()),
        ..config()
    }
    .validate()
    .unwrap();
    let manifest = Deployment::build(&config).unwrap().manifest();

    assert_eq!(
        manifest.resource("elk-postgresql").unwrap().properties["deletionProtection"],
        json!(true)
    );
    assert_eq!(
        manifest.resource("elk-app-lb").unwrap().properties["enableDeletionProtection"],
        json!(true)
    );
    assert_eq!(
        manifest.resource("elk-vpc").unwrap().properties["tags"]["Environment"],
        json!("prod")
    );
}

#[test]
fn test_unknown_account_is_looked_up_by_engine() {
    let config = Config {
        account_id: None,
        ..config()
    }
    .validate()
    .unwrap();
    let manifest = Deployment::build(&config).unwrap().manifest();

    let policy = &manifest.resource("elk-kms-key").unwrap().properties["policy"];
    assert!(policy.get("fn::toJSON").is_some(), "{policy}");
    assert!(policy
        .to_string()
        .contains("aws:index/getCallerIdentity:getCallerIdentity"));
}

#[test]
fn test_known_account_renders_policy_string() {
    let manifest = Deployment::build(&stack_config()).unwrap().manifest();
    let policy = &manifest.resource("elk-kms-key").unwrap().properties["policy"];
    let document: Value = serde_json::from_str(policy.as_str().unwrap()).unwrap();
    assert_eq!(
        document["Statement"][0]["Principal"]["AWS"],
        json!("arn:aws:iam::123456789012:root")
    );
}

#[test]
fn test_database_password_is_never_literal() {
    let manifest = Deployment::build(&stack_config()).unwrap().manifest();
    let db = manifest.resource("elk-postgresql").unwrap();
    assert_eq!(
        db.properties["password"],
        json!({"fn::secret": "${elk-db-password.result}"})
    );
}
