//! Encryption key, security groups, IAM roles and database credentials.

use super::network::NetworkStack;
use super::{LoggingComponent, StackContext};
use crate::aws::ec2::{rules_input, RuleSource, SecurityGroupRule};
use crate::aws::iam::{
    PolicyDocument, Principal, Statement, ECS_TASKS_SERVICE, ECS_TASK_EXECUTION_POLICY_ARN,
};
use crate::config::StackConfig;
use crate::error::Result;
use crate::graph::{Blueprint, Input, ResourceHandle, ResourceKind, StackKind};
use crate::provider::Provider;

/// Master user of the database
pub const DB_USERNAME: &str = "dbadmin";

const DB_PASSWORD_LENGTH: u32 = 32;
const KMS_DELETION_WINDOW_DAYS: u32 = 7;
const POSTGRES_PORT: u16 = 5432;

/// Security stack outputs.
#[derive(Debug, Clone)]
pub struct SecurityStack {
    pub kms_key: ResourceHandle,
    pub kms_alias: ResourceHandle,
    pub alb_security_group: ResourceHandle,
    pub ecs_security_group: ResourceHandle,
    pub rds_security_group: ResourceHandle,
    pub ecs_task_role: ResourceHandle,
    pub ecs_execution_role: ResourceHandle,
    pub db_password: ResourceHandle,
    pub db_secret: ResourceHandle,
    pub db_secret_version: ResourceHandle,
}

impl SecurityStack {
    pub fn new(
        blueprint: &mut Blueprint,
        config: &StackConfig,
        provider: &dyn Provider,
        network: &NetworkStack,
    ) -> Result<Self> {
        let mut ctx = StackContext::begin(blueprint, config, provider, StackKind::Security)?;

        let (kms_key, kms_alias) = create_kms_key(&mut ctx)?;
        let alb_security_group = create_alb_security_group(&mut ctx, network)?;
        let ecs_security_group = create_ecs_security_group(&mut ctx, network)?;
        let rds_security_group = create_rds_security_group(&mut ctx, network, &ecs_security_group)?;
        let ecs_task_role = create_ecs_task_role(&mut ctx)?;
        let ecs_execution_role = create_ecs_execution_role(&mut ctx)?;
        let (db_password, db_secret, db_secret_version) = create_db_secret(&mut ctx, &kms_key)?;

        ctx.finish()?;

        Ok(Self {
            kms_key,
            kms_alias,
            alb_security_group,
            ecs_security_group,
            rds_security_group,
            ecs_task_role,
            ecs_execution_role,
            db_password,
            db_secret,
            db_secret_version,
        })
    }

    /// The generated database password, marked secret
    pub fn db_password_input(&self) -> Input {
        Input::secret(Input::from(self.db_password.output("result")))
    }
}

fn create_kms_key(ctx: &mut StackContext<'_>) -> Result<(ResourceHandle, ResourceHandle)> {
    ctx.create("KMS-Key", |ctx| {
        let account_id = ctx.provider().account_id()?;
        let policy = PolicyDocument::new().statement(
            Statement::allow(["kms:*"])
                .sid("Enable IAM User Permissions")
                .principal(Principal::account_root(account_id))
                .resource("*"),
        );
        let description = format!("KMS key for {}", ctx.config().project);
        let alias = format!("alias/{}", ctx.name("key"));

        let key = ctx
            .resource(ResourceKind::KmsKey, "kms-key")
            .prop("description", description)
            .prop("deletionWindowInDays", KMS_DELETION_WINDOW_DAYS)
            .prop("enableKeyRotation", true)
            .prop("policy", policy.to_json_input())
            .declare()?;

        let alias = ctx
            .resource(ResourceKind::KmsAlias, "kms-alias")
            .prop("name", alias)
            .prop("targetKeyId", key.id())
            .declare()?;

        Ok((key, alias))
    })
}

fn create_security_group(
    ctx: &mut StackContext<'_>,
    suffix: &str,
    network: &NetworkStack,
    description: &str,
    ingress: &[SecurityGroupRule],
    egress: &[SecurityGroupRule],
) -> Result<ResourceHandle> {
    let mut builder = ctx
        .resource(ResourceKind::SecurityGroup, suffix)
        .prop("vpcId", network.vpc.id())
        .prop("description", description)
        .prop("ingress", rules_input(ingress)?);
    if !egress.is_empty() {
        builder = builder.prop("egress", rules_input(egress)?);
    }
    builder.name_tag().declare()
}

fn create_alb_security_group(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
) -> Result<ResourceHandle> {
    ctx.create("ALB-SG", |ctx| {
        create_security_group(
            ctx,
            "alb-sg",
            network,
            "Security group for Application Load Balancer",
            &[
                SecurityGroupRule::tcp(80, RuleSource::anywhere()).describe("HTTP"),
                SecurityGroupRule::tcp(443, RuleSource::anywhere()).describe("HTTPS"),
            ],
            &[SecurityGroupRule::allow_all_outbound()],
        )
    })
}

fn create_ecs_security_group(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
) -> Result<ResourceHandle> {
    ctx.create("ECS-SG", |ctx| {
        let mut ingress: Vec<SecurityGroupRule> = [
            LoggingComponent::Elasticsearch,
            LoggingComponent::Kibana,
            LoggingComponent::Logstash,
        ]
        .into_iter()
        .map(|component| {
            let name = component.name();
            let title = format!("{}{}", name[..1].to_uppercase(), &name[1..]);
            SecurityGroupRule::tcp(component.port(), RuleSource::anywhere())
                .describe(format!("Allow {} port", title))
        })
        .collect();
        ingress.push(SecurityGroupRule::tcp(80, RuleSource::anywhere()).describe("Allow HTTP traffic"));
        ingress.push(
            SecurityGroupRule::tcp(443, RuleSource::anywhere()).describe("Allow HTTPS traffic"),
        );

        create_security_group(
            ctx,
            "ecs-sg",
            network,
            "Security group for ECS tasks",
            &ingress,
            &[SecurityGroupRule::allow_all_outbound()],
        )
    })
}

fn create_rds_security_group(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
    ecs_security_group: &ResourceHandle,
) -> Result<ResourceHandle> {
    ctx.create("RDS-SG", |ctx| {
        create_security_group(
            ctx,
            "rds-sg",
            network,
            "Security group for RDS instance",
            &[SecurityGroupRule::tcp(POSTGRES_PORT, RuleSource::group(ecs_security_group.id()))
                .describe("Allow PostgreSQL access from ECS tasks")],
            &[],
        )
    })
}

fn ecs_assume_role_policy() -> Input {
    PolicyDocument::new()
        .statement(Statement::assume_role(ECS_TASKS_SERVICE))
        .to_json_input()
}

fn create_ecs_task_role(ctx: &mut StackContext<'_>) -> Result<ResourceHandle> {
    ctx.create("ECS-task-role", |ctx| {
        let role = ctx
            .resource(ResourceKind::IamRole, "ecs-task-role")
            .prop("assumeRolePolicy", ecs_assume_role_policy())
            .declare()?;

        let log_policy = PolicyDocument::new().statement(
            Statement::allow(["logs:CreateLogStream", "logs:PutLogEvents"])
                .resource("arn:aws:logs:*:*:*"),
        );
        ctx.resource(ResourceKind::IamRolePolicy, "ecs-task-policy")
            .prop("role", role.id())
            .prop("policy", log_policy.to_json_input())
            .declare()?;

        Ok(role)
    })
}

fn create_ecs_execution_role(ctx: &mut StackContext<'_>) -> Result<ResourceHandle> {
    ctx.create("ECS-execution-role", |ctx| {
        let role = ctx
            .resource(ResourceKind::IamRole, "ecs-execution-role")
            .prop("assumeRolePolicy", ecs_assume_role_policy())
            .declare()?;

        ctx.resource(ResourceKind::IamRolePolicyAttachment, "ecs-execution-policy")
            .prop("role", role.id())
            .prop("policyArn", ECS_TASK_EXECUTION_POLICY_ARN)
            .declare()?;

        Ok(role)
    })
}

fn create_db_secret(
    ctx: &mut StackContext<'_>,
    kms_key: &ResourceHandle,
) -> Result<(ResourceHandle, ResourceHandle, ResourceHandle)> {
    ctx.create("DB-secret", |ctx| {
        let password = ctx
            .resource(ResourceKind::RandomPassword, "db-password")
            .prop("length", DB_PASSWORD_LENGTH)
            .prop("special", false)
            .declare()?;

        let secret = ctx
            .resource(ResourceKind::Secret, "db-secret")
            .prop("description", "RDS database credentials")
            .prop("kmsKeyId", kms_key.id())
            .declare()?;

        let credentials = Input::map([
            ("username", Input::from(DB_USERNAME)),
            ("password", Input::from(password.output("result"))),
        ]);
        let version = ctx
            .resource(ResourceKind::SecretVersion, "db-secret-version")
            .prop("secretId", secret.id())
            .prop("secretString", Input::secret(Input::to_json(credentials)))
            .declare()?;

        Ok((password, secret, version))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::stacks::test_support;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn build_with(provider: &StaticProvider) -> (Blueprint, SecurityStack) {
        let config = test_support::config();
        let mut blueprint = Blueprint::new(config.common_tags());
        let network = NetworkStack::new(&mut blueprint, &config, provider).unwrap();
        let security = SecurityStack::new(&mut blueprint, &config, provider, &network).unwrap();
        (blueprint, security)
    }

    fn build() -> (Blueprint, SecurityStack) {
        let config = test_support::config();
        build_with(&test_support::provider(&config))
    }

    #[test]
    fn test_kms_key_policy_grants_account_root() {
        let (blueprint, security) = build();
        assert_eq!(security.kms_key.logical_name(), "elk-kms-key");

        let manifest = blueprint.manifest("elk", "dev");
        let key = manifest.resource("elk-kms-key").unwrap();
        assert_eq!(key.properties["deletionWindowInDays"], json!(7));
        assert_eq!(key.properties["enableKeyRotation"], json!(true));
        assert!(key.properties["tags"].get("Name").is_none());

        let policy: Value = serde_json::from_str(key.properties["policy"].as_str().unwrap()).unwrap();
        assert_eq!(
            policy["Statement"][0]["Principal"]["AWS"],
            json!("arn:aws:iam::123456789012:root")
        );
        assert_eq!(policy["Statement"][0]["Action"], json!("kms:*"));

        let alias = manifest.resource("elk-kms-alias").unwrap();
        assert_eq!(alias.properties["name"], json!("alias/elk-key"));
        assert_eq!(alias.properties["targetKeyId"], json!("${elk-kms-key.id}"));
    }

    #[test]
    fn test_kms_policy_defers_unknown_account() {
        let provider = StaticProvider::new(
            "us-east-1",
            vec!["us-east-1a".into(), "us-east-1b".into()],
            None,
        );
        let (blueprint, _) = build_with(&provider);
        let manifest = blueprint.manifest("elk", "dev");
        let policy = &manifest.resource("elk-kms-key").unwrap().properties["policy"];
        assert!(policy.get("fn::toJSON").is_some());
    }

    #[test]
    fn test_ecs_security_group_ports() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");
        let sg = manifest.resource("elk-ecs-sg").unwrap();
        let ports: Vec<u64> = sg.properties["ingress"]
            .as_array()
            .unwrap()
            .iter()
            .map(|rule| rule["fromPort"].as_u64().unwrap())
            .collect();
        assert_eq!(ports, vec![9200, 5601, 5044, 80, 443]);
        assert_eq!(
            sg.properties["ingress"][0]["description"],
            json!("Allow Elasticsearch port")
        );
        assert_eq!(sg.properties["egress"][0]["protocol"], json!("-1"));
    }

    #[test]
    fn test_rds_security_group_only_admits_ecs() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");
        let sg = manifest.resource("elk-rds-sg").unwrap();
        assert_eq!(
            sg.properties["ingress"],
            json!([{
                "protocol": "tcp",
                "fromPort": 5432,
                "toPort": 5432,
                "securityGroups": ["${elk-ecs-sg.id}"],
                "description": "Allow PostgreSQL access from ECS tasks",
            }])
        );
        assert!(sg.properties.get("egress").is_none());
    }

    #[test]
    fn test_roles_and_policies() {
        let (blueprint, _) = build();
        let manifest = blueprint.manifest("elk", "dev");

        let attachment = manifest.resource("elk-ecs-execution-policy").unwrap();
        assert_eq!(attachment.properties["role"], json!("${elk-ecs-execution-role.id}"));
        assert_eq!(
            attachment.properties["policyArn"],
            json!(ECS_TASK_EXECUTION_POLICY_ARN)
        );

        let inline = manifest.resource("elk-ecs-task-policy").unwrap();
        let policy: Value =
            serde_json::from_str(inline.properties["policy"].as_str().unwrap()).unwrap();
        assert_eq!(
            policy["Statement"][0]["Action"],
            json!(["logs:CreateLogStream", "logs:PutLogEvents"])
        );
    }

    #[test]
    fn test_secret_string_is_secret_json() {
        let (blueprint, security) = build();
        let manifest = blueprint.manifest("elk", "dev");

        let password = manifest.resource("elk-db-password").unwrap();
        assert_eq!(password.properties["length"], json!(32));
        assert_eq!(password.properties["special"], json!(false));

        let version = manifest.resource("elk-db-secret-version").unwrap();
        assert_eq!(
            version.properties["secretString"],
            json!({"fn::secret": {"fn::toJSON": {
                "username": "dbadmin",
                "password": "${elk-db-password.result}",
            }}})
        );
        assert_eq!(
            security.db_password_input().render(),
            json!({"fn::secret": "${elk-db-password.result}"})
        );
    }
}
