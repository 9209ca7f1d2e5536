//! Serverless compute. No instance, so no bootstrap, no remote sessions
//! and no address association.

use serde_json::json;

use foundrystack_common::constants::{DESIRED_COUNT, SERVICE_NAME};
use foundrystack_common::error::Result;
use foundrystack_common::types::ComputeKind;

use super::{ComputeContext, ComputeUnit, merged, security_group, task_definition_base, task_roles};
use crate::intrinsic;
use crate::template::{Resource, Template};

pub(super) fn provision(ctx: &ComputeContext<'_>, template: &mut Template) -> Result<ComputeUnit> {
    let security_group = security_group(
        template,
        "ServiceSecurityGroup",
        "Foundry serverless task",
        ctx,
    )?;

    let roles = task_roles(template)?;
    let task_definition = template.add(
        "TaskDefinition",
        Resource::new("AWS::ECS::TaskDefinition").with_properties(merged(
            task_definition_base(ctx, &roles),
            json!({
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "Cpu": "256",
                "Memory": "512",
                "RuntimePlatform": {
                    "OperatingSystemFamily": "LINUX",
                    "CpuArchitecture": "ARM64",
                },
            }),
        )),
    )?;

    let mut service = Resource::new("AWS::ECS::Service").with_properties(json!({
        "Cluster": intrinsic::reference(ctx.cluster),
        "TaskDefinition": intrinsic::reference(&task_definition),
        "ServiceName": SERVICE_NAME,
        "DesiredCount": DESIRED_COUNT,
        "LaunchType": "FARGATE",
        "PlatformVersion": "LATEST",
        "NetworkConfiguration": {
            "AwsvpcConfiguration": {
                "AssignPublicIp": "ENABLED",
                "Subnets": ctx.shared.network.public_subnet_ids(),
                "SecurityGroups": [security_group.group_id.clone()],
            },
        },
        "DeploymentConfiguration": { "MinimumHealthyPercent": 0, "MaximumPercent": 100 },
    }));
    for target in &ctx.storage.mount_targets {
        service = service.depends_on(target);
    }
    let service = template.add("EcsService", service)?;

    Ok(ComputeUnit {
        kind: ComputeKind::Fargate,
        task_definition,
        service,
        task_role: roles.task,
        execution_role: roles.execution,
        security_group,
        instance_role: None,
        capacity: None,
    })
}
