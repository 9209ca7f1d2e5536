//! Instance-backed compute: a fleet of exactly one instance.
//!
//! The instance is bootstrapped by `cfn-init` from the fleet's metadata and
//! reports the outcome with `cfn-signal`. A failing bootstrap fails the
//! deployment; nothing here retries.

use serde_json::{Map, Value, json};

use foundrystack_common::constants::{
    BOOTSTRAP_CONFIG_PATH, DESIRED_COUNT, ECS_AMI_PARAMETER, INIT_SCRIPT_PATH, INSTANCE_TYPE,
    SERVICE_NAME,
};
use foundrystack_common::error::Result;
use foundrystack_common::types::{ComputeKind, LogicalId};

use super::{ComputeContext, ComputeUnit, merged, security_group, task_definition_base, task_roles};
use crate::intrinsic;
use crate::template::{Resource, Template};
use crate::wiring::permissions::Permissions;

const BUNDLED_INIT_SCRIPT: &str = include_str!("../../assets/config.sh");
const FLEET_ID: &str = "AutoScalingGroup";
const SIGNAL_TIMEOUT: &str = "PT15M";

pub(super) fn provision(
    ctx: &ComputeContext<'_>,
    template: &mut Template,
    permissions: &mut Permissions,
) -> Result<ComputeUnit> {
    let security_group = security_group(
        template,
        "InstanceSecurityGroup",
        "Foundry host instance",
        ctx,
    )?;

    let instance_role = template.add(
        "InstanceRole",
        Resource::new("AWS::IAM::Role").with_properties(json!({
            "AssumeRolePolicyDocument": super::assume_role("ec2.amazonaws.com"),
            "ManagedPolicyArns": [
                intrinsic::managed_policy("service-role/AmazonEC2ContainerServiceforEC2Role"),
                intrinsic::managed_policy("AmazonSSMManagedInstanceCore"),
            ],
        })),
    )?;
    let instance_profile = template.add(
        "InstanceProfile",
        Resource::new("AWS::IAM::InstanceProfile").with_properties(json!({
            "Roles": [intrinsic::reference(&instance_role)],
        })),
    )?;

    let mut launch_data = json!({
        "ImageId": intrinsic::ssm_parameter(ECS_AMI_PARAMETER),
        "InstanceType": INSTANCE_TYPE,
        "IamInstanceProfile": { "Arn": intrinsic::get_att(&instance_profile, "Arn") },
        "SecurityGroupIds": [security_group.group_id.clone()],
        "UserData": intrinsic::base64(intrinsic::sub(user_data(ctx.cluster))),
        "MetadataOptions": { "HttpTokens": "required", "HttpPutResponseHopLimit": 2 },
    });
    if !ctx.storage.instance.block_devices.is_empty() {
        launch_data = merged(
            launch_data,
            json!({ "BlockDeviceMappings": ctx.storage.instance.block_devices }),
        );
    }
    let launch_template = template.add(
        "LaunchTemplate",
        Resource::new("AWS::EC2::LaunchTemplate")
            .with_properties(json!({ "LaunchTemplateData": launch_data }))
            .depends_on(&instance_role),
    )?;

    let fleet = template.add(
        FLEET_ID,
        Resource::new("AWS::AutoScaling::AutoScalingGroup")
            .with_properties(json!({
                "MinSize": "1",
                "MaxSize": "1",
                "DesiredCapacity": "1",
                "LaunchTemplate": {
                    "LaunchTemplateId": intrinsic::reference(&launch_template),
                    "Version": intrinsic::get_att(&launch_template, "LatestVersionNumber"),
                },
                "VPCZoneIdentifier": ctx.shared.network.public_subnet_ids(),
                "Tags": [{ "Key": "Name", "Value": "FoundryHost", "PropagateAtLaunch": true }],
            }))
            .with_creation_policy(json!({
                "ResourceSignal": { "Count": 1, "Timeout": SIGNAL_TIMEOUT },
            }))
            .with_metadata(bootstrap_metadata(ctx)),
    )?;

    permissions.grant(
        &instance_role,
        ["ssm:StartSession"],
        vec![intrinsic::sub(
            "arn:${AWS::Partition}:ssm:${AWS::Region}:${AWS::AccountId}:document/AWS-StartSSHSession",
        )],
    );
    permissions.grant(
        &instance_role,
        ["ec2:AssociateAddress"],
        vec![intrinsic::sub(
            "arn:${AWS::Partition}:ec2:${AWS::Region}:${AWS::AccountId}:*",
        )],
    );

    let capacity_provider = template.add(
        "AsgCapacityProvider",
        Resource::new("AWS::ECS::CapacityProvider").with_properties(json!({
            "AutoScalingGroupProvider": {
                "AutoScalingGroupArn": intrinsic::reference(&fleet),
                "ManagedScaling": { "Status": "ENABLED", "TargetCapacity": 100 },
                "ManagedTerminationProtection": "DISABLED",
            },
        })),
    )?;
    let association = template.add(
        "ClusterCapacityProviders",
        Resource::new("AWS::ECS::ClusterCapacityProviderAssociations").with_properties(json!({
            "Cluster": intrinsic::reference(ctx.cluster),
            "CapacityProviders": [intrinsic::reference(&capacity_provider)],
            "DefaultCapacityProviderStrategy": [{
                "CapacityProvider": intrinsic::reference(&capacity_provider),
                "Weight": 1,
            }],
        })),
    )?;

    let roles = task_roles(template)?;
    let task_definition = template.add(
        "TaskDefinition",
        Resource::new("AWS::ECS::TaskDefinition").with_properties(merged(
            task_definition_base(ctx, &roles),
            json!({
                "NetworkMode": "bridge",
                "RequiresCompatibilities": ["EC2"],
            }),
        )),
    )?;

    let mut service = Resource::new("AWS::ECS::Service")
        .with_properties(json!({
            "Cluster": intrinsic::reference(ctx.cluster),
            "TaskDefinition": intrinsic::reference(&task_definition),
            "ServiceName": SERVICE_NAME,
            "DesiredCount": DESIRED_COUNT,
            "CapacityProviderStrategy": [{
                "CapacityProvider": intrinsic::reference(&capacity_provider),
                "Weight": 1,
            }],
            // Host ports are fixed, so the old task must stop first.
            "DeploymentConfiguration": { "MinimumHealthyPercent": 0, "MaximumPercent": 100 },
        }))
        .depends_on(&association);
    for target in &ctx.storage.mount_targets {
        service = service.depends_on(target);
    }
    let service = template.add("EcsService", service)?;

    Ok(ComputeUnit {
        kind: ComputeKind::Ec2,
        task_definition,
        service,
        task_role: roles.task,
        execution_role: roles.execution,
        security_group,
        instance_role: Some(instance_role),
        capacity: Some(fleet),
    })
}

fn user_data(cluster: &LogicalId) -> String {
    let locator = format!("--region ${{AWS::Region}} --stack ${{AWS::StackName}} --resource {FLEET_ID}");
    [
        "#!/bin/bash".to_owned(),
        format!("echo ECS_CLUSTER=${{{cluster}}} >> /etc/ecs/ecs.config"),
        "yum install -y aws-cfn-bootstrap".to_owned(),
        format!("/opt/aws/bin/cfn-init -v {locator} -c default"),
        format!("/opt/aws/bin/cfn-signal -e $? {locator}"),
        "cat /var/log/cfn-init.log >&2".to_owned(),
    ]
    .join("\n")
}

fn bootstrap_metadata(ctx: &ComputeContext<'_>) -> Value {
    let mut config = Map::new();
    let _ = config.insert("IP".into(), ctx.shared.address.public_ip.import());
    let _ = config.insert(
        "EIP_ALLOCATION_ID".into(),
        ctx.shared.address.allocation_id.import(),
    );
    if let Some(key) = &ctx.config.public_ssh_key {
        let _ = config.insert("PUBLIC_SSH_KEY".into(), Value::String(key.clone()));
    }
    if let Some(tls) = &ctx.config.tls {
        let _ = config.insert(
            "SSL_CERTIFICATE_ZIP_URL".into(),
            Value::String(tls.certificate_zip_url.clone()),
        );
    }
    if let Some(id) = ctx.storage.file_system_id() {
        let _ = config.insert("EFS_ID".into(), id.clone());
    }

    let script = ctx
        .config
        .init_script
        .as_deref()
        .unwrap_or(BUNDLED_INIT_SCRIPT);

    let mut commands = Map::new();
    for command in &ctx.storage.instance.commands {
        let _ = commands.insert(command.name.clone(), json!({ "command": command.command }));
    }
    let _ = commands.insert(
        "10_chmod_init_script".into(),
        json!({ "command": format!("chmod +x {INIT_SCRIPT_PATH}") }),
    );
    let _ = commands.insert(
        "20_run_init_script".into(),
        json!({ "command": INIT_SCRIPT_PATH }),
    );

    json!({
        "AWS::CloudFormation::Init": {
            "configSets": { "default": ["config"] },
            "config": {
                "files": {
                    BOOTSTRAP_CONFIG_PATH: {
                        "content": config,
                        "mode": "000644",
                        "owner": "root",
                        "group": "root",
                    },
                    INIT_SCRIPT_PATH: {
                        "content": script,
                        "mode": "000755",
                        "owner": "root",
                        "group": "root",
                    },
                },
                "commands": commands,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_data_signals_init_exit_code() {
        let data = user_data(&LogicalId::new("EcsCluster"));
        assert!(data.starts_with("#!/bin/bash"));
        assert!(data.contains("ECS_CLUSTER=${EcsCluster}"));
        assert!(data.contains("cfn-signal -e $? --region ${AWS::Region}"));
        assert!(data.contains("--resource AutoScalingGroup"));
    }

    #[test]
    fn bundled_script_reads_bootstrap_config() {
        assert!(BUNDLED_INIT_SCRIPT.starts_with("#!/bin/bash"));
        assert!(BUNDLED_INIT_SCRIPT.contains(BOOTSTRAP_CONFIG_PATH));
    }
}
