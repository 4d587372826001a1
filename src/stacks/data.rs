//! Managed PostgreSQL instance.

use super::network::NetworkStack;
use super::security::{SecurityStack, DB_USERNAME};
use super::StackContext;
use crate::config::StackConfig;
use crate::error::Result;
use crate::graph::{Blueprint, Input, Reference, ResourceHandle, ResourceKind, StackKind};
use crate::provider::Provider;

const ENGINE_VERSION: &str = "14.12";
const PARAMETER_GROUP_FAMILY: &str = "postgres14";
const BACKUP_RETENTION_DAYS: u32 = 7;
const BACKUP_WINDOW: &str = "03:00-04:00";
const MAINTENANCE_WINDOW: &str = "Mon:04:00-Mon:05:00";

/// `(name, value, apply method)` of the custom database parameters
const DB_PARAMETERS: [(&str, &str, &str); 3] = [
    ("max_connections", "100", "pending-reboot"),
    ("shared_buffers", "16384", "pending-reboot"),
    ("log_statement", "all", "immediate"),
];

/// Data stack outputs.
#[derive(Debug, Clone)]
pub struct DataStack {
    pub db_subnet_group: ResourceHandle,
    pub db_parameter_group: ResourceHandle,
    pub db_instance: ResourceHandle,
}

impl DataStack {
    pub fn new(
        blueprint: &mut Blueprint,
        config: &StackConfig,
        provider: &dyn Provider,
        network: &NetworkStack,
        security: &SecurityStack,
    ) -> Result<Self> {
        let mut ctx = StackContext::begin(blueprint, config, provider, StackKind::Data)?;

        let db_subnet_group = create_db_subnet_group(&mut ctx, network)?;
        let db_parameter_group = create_db_parameter_group(&mut ctx)?;
        let db_instance =
            create_db_instance(&mut ctx, security, &db_subnet_group, &db_parameter_group)?;

        ctx.finish()?;

        Ok(Self {
            db_subnet_group,
            db_parameter_group,
            db_instance,
        })
    }

    /// Connection endpoint (`host:port`) of the database
    pub fn endpoint(&self) -> Reference {
        self.db_instance.output("endpoint")
    }
}

fn create_db_subnet_group(
    ctx: &mut StackContext<'_>,
    network: &NetworkStack,
) -> Result<ResourceHandle> {
    ctx.create("RDS-subnet-group", |ctx| {
        ctx.resource(ResourceKind::DbSubnetGroup, "db-subnet-group")
            .prop("subnetIds", network.private_subnet_ids())
            .name_tag()
            .declare()
    })
}

fn create_db_parameter_group(ctx: &mut StackContext<'_>) -> Result<ResourceHandle> {
    ctx.create("RDS-parameter-group", |ctx| {
        let parameters = Input::list(DB_PARAMETERS.iter().map(|(name, value, apply)| {
            Input::map([
                ("name", Input::from(*name)),
                ("value", Input::from(*value)),
                ("applyMethod", Input::from(*apply)),
            ])
        }));
        ctx.resource(ResourceKind::DbParameterGroup, "db-parameter-group")
            .prop("family", PARAMETER_GROUP_FAMILY)
            .prop("description", "Custom parameter group for PostgreSQL 14")
            .prop("parameters", parameters)
            .name_tag()
            .declare()
    })
}

fn create_db_instance(
    ctx: &mut StackContext<'_>,
    security: &SecurityStack,
    subnet_group: &ResourceHandle,
    parameter_group: &ResourceHandle,
) -> Result<ResourceHandle> {
    ctx.create("DB instance", |ctx| {
        let config = ctx.config();
        let storage = config.rds_allocated_storage;
        let instance_class = config.rds_instance_class.clone();
        let db_name = config.db_name();
        let protected = config.environment == "prod";
        let final_snapshot = ctx.name("final-snapshot");

        ctx.resource(ResourceKind::DbInstance, "postgresql")
            .prop("allocatedStorage", storage)
            .prop("storageType", "gp2")
            .prop("engine", "postgres")
            .prop("engineVersion", ENGINE_VERSION)
            .prop("instanceClass", instance_class)
            .prop("dbName", db_name)
            .prop("parameterGroupName", parameter_group.output("name"))
            .prop("dbSubnetGroupName", subnet_group.output("name"))
            .prop("vpcSecurityGroupIds", vec![security.rds_security_group.id()])
            .prop("storageEncrypted", true)
            .prop("kmsKeyId", security.kms_key.arn())
            .prop("username", DB_USERNAME)
            .prop("password", security.db_password_input())
            .prop("multiAz", true)
            .prop("publiclyAccessible", false)
            .prop("backupRetentionPeriod", BACKUP_RETENTION_DAYS)
            .prop("backupWindow", BACKUP_WINDOW)
            .prop("maintenanceWindow", MAINTENANCE_WINDOW)
            .prop("autoMinorVersionUpgrade", true)
            .prop("deletionProtection", protected)
            .prop("skipFinalSnapshot", false)
            .prop("finalSnapshotIdentifier", final_snapshot)
            .name_tag()
            .depends_on(&security.db_secret_version)
            .declare()
    })
}
