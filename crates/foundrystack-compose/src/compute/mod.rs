//! Compute strategies.
//!
//! Both strategies produce a [`ComputeUnit`] with the same shape, so storage
//! and ingress wiring never need to know which one ran.

mod ec2;
mod fargate;

use serde_json::{Value, json};

use foundrystack_common::config::StackConfiguration;
use foundrystack_common::error::Result;
use foundrystack_common::types::{ComputeKind, LogicalId};

use crate::container::ContainerSpec;
use crate::intrinsic;
use crate::shared::SharedHandles;
use crate::storage::StorageBackend;
use crate::template::{Resource, Template};
use crate::wiring::connectivity::SecurityGroupRef;
use crate::wiring::permissions::Permissions;

/// Inputs shared by both strategies.
#[derive(Debug, Clone, Copy)]
pub struct ComputeContext<'a> {
    /// Resolved configuration.
    pub config: &'a StackConfiguration,
    /// Handles imported from the shared stack.
    pub shared: &'a SharedHandles,
    /// Cluster the service runs in.
    pub cluster: &'a LogicalId,
    /// Persistent-volume backend.
    pub storage: &'a StorageBackend,
    /// Application container.
    pub container: &'a ContainerSpec,
    /// Log group receiving container output.
    pub log_group: &'a LogicalId,
}

/// One task definition, one service, and the principals running them.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeUnit {
    /// Strategy that produced the unit.
    pub kind: ComputeKind,
    /// Task definition.
    pub task_definition: LogicalId,
    /// Service (desired count 1).
    pub service: LogicalId,
    /// Role assumed by the running task.
    pub task_role: LogicalId,
    /// Role used to pull the image and ship logs.
    pub execution_role: LogicalId,
    /// Security group of the running task or instance.
    pub security_group: SecurityGroupRef,
    /// Instance role, for instance-backed strategies.
    pub instance_role: Option<LogicalId>,
    /// Capacity fleet, for instance-backed strategies.
    pub capacity: Option<LogicalId>,
}

impl ComputeUnit {
    /// Principals that need access to a mounted file share.
    #[must_use]
    pub fn share_principals(&self) -> Vec<&LogicalId> {
        std::iter::once(&self.task_role)
            .chain(self.instance_role.as_ref())
            .collect()
    }
}

/// Adds the compute unit for the configured strategy.
///
/// # Errors
///
/// Returns an error if a resource cannot be added to the template.
pub fn provision(
    ctx: &ComputeContext<'_>,
    template: &mut Template,
    permissions: &mut Permissions,
) -> Result<ComputeUnit> {
    tracing::info!(compute = %ctx.config.compute, "composing compute unit");
    match ctx.config.compute {
        ComputeKind::Ec2 => ec2::provision(ctx, template, permissions),
        ComputeKind::Fargate => fargate::provision(ctx, template),
    }
}

struct TaskRoles {
    execution: LogicalId,
    task: LogicalId,
}

fn task_roles(template: &mut Template) -> Result<TaskRoles> {
    let execution = template.add(
        "TaskExecutionRole",
        Resource::new("AWS::IAM::Role").with_properties(json!({
            "AssumeRolePolicyDocument": assume_role("ecs-tasks.amazonaws.com"),
            "ManagedPolicyArns": [
                intrinsic::managed_policy("service-role/AmazonECSTaskExecutionRolePolicy"),
            ],
        })),
    )?;
    let task = template.add(
        "TaskRole",
        Resource::new("AWS::IAM::Role").with_properties(json!({
            "AssumeRolePolicyDocument": assume_role("ecs-tasks.amazonaws.com"),
        })),
    )?;
    Ok(TaskRoles { execution, task })
}

fn assume_role(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

fn security_group(
    template: &mut Template,
    id: &str,
    description: &str,
    ctx: &ComputeContext<'_>,
) -> Result<SecurityGroupRef> {
    let group = template.add(
        id,
        Resource::new("AWS::EC2::SecurityGroup").with_properties(json!({
            "GroupDescription": description,
            "VpcId": ctx.shared.network.vpc_id.import(),
            "SecurityGroupEgress": [{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }],
        })),
    )?;
    Ok(SecurityGroupRef::local(&group))
}

/// Task-definition properties common to both strategies.
fn task_definition_base(ctx: &ComputeContext<'_>, roles: &TaskRoles) -> Value {
    json!({
        "Family": "FoundryTask",
        "ContainerDefinitions": [ctx.container.to_definition(ctx.storage, ctx.log_group)],
        "Volumes": [ctx.storage.volume],
        "TaskRoleArn": intrinsic::get_att(&roles.task, "Arn"),
        "ExecutionRoleArn": intrinsic::get_att(&roles.execution, "Arn"),
    })
}

/// Merges the entries of `extra` into the object `base`.
fn merged(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (&mut base, extra) {
        base_map.extend(extra_map);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_overrides_and_extends() {
        let value = merged(json!({ "a": 1, "b": 2 }), json!({ "b": 3, "c": 4 }));
        assert_eq!(value, json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn share_principals_include_instance_role_when_present() {
        let unit = ComputeUnit {
            kind: ComputeKind::Ec2,
            task_definition: LogicalId::new("TaskDefinition"),
            service: LogicalId::new("EcsService"),
            task_role: LogicalId::new("TaskRole"),
            execution_role: LogicalId::new("TaskExecutionRole"),
            security_group: SecurityGroupRef::local(&LogicalId::new("InstanceSecurityGroup")),
            instance_role: Some(LogicalId::new("InstanceRole")),
            capacity: None,
        };
        let names: Vec<&str> = unit.share_principals().iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["TaskRole", "InstanceRole"]);
    }
}
