//! End-to-end composition tests across the supported configurations.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use foundrystack_common::config::{OptionsFile, RawInputs};
use foundrystack_common::constants::{APP_STACK_NAME, SHARED_STACK_NAME};
use foundrystack_common::types::{LogicalId, PortMapping};
use foundrystack_compose::container;
use foundrystack_compose::resolver::resolve;
use foundrystack_compose::stack::Stack;
use foundrystack_compose::template::Template;
use foundrystack_compose::{CloudAssembly, TemplateFormat, compose};

fn composed(raw: &RawInputs) -> CloudAssembly {
    let config = resolve(raw).expect("configuration should resolve");
    compose(&config).expect("composition should succeed")
}

fn app(assembly: &CloudAssembly) -> &Stack {
    assembly.stack(APP_STACK_NAME).expect("application stack")
}

fn shared(assembly: &CloudAssembly) -> &Stack {
    assembly.stack(SHARED_STACK_NAME).expect("shared stack")
}

fn task_definition(template: &Template) -> LogicalId {
    template.resources_of_type("AWS::ECS::TaskDefinition")[0].0.clone()
}

fn ports(template: &Template) -> Vec<PortMapping> {
    container::port_mappings(template, &task_definition(template))
}

fn container_env(template: &Template) -> BTreeSet<String> {
    let task = template
        .resource(&task_definition(template))
        .expect("task definition");
    task.property("ContainerDefinitions").expect("containers")[0]["Environment"]
        .as_array()
        .expect("environment")
        .iter()
        .filter_map(|entry| entry["Name"].as_str().map(str::to_owned))
        .collect()
}

fn granted_actions(template: &Template, principal: &str) -> BTreeSet<String> {
    let Some(policy) = template.resource(&LogicalId::new(format!("{principal}DefaultPolicy")))
    else {
        return BTreeSet::new();
    };
    let mut actions = BTreeSet::new();
    for statement in policy.properties["PolicyDocument"]["Statement"]
        .as_array()
        .expect("statements")
    {
        match &statement["Action"] {
            Value::String(action) => {
                let _ = actions.insert(action.clone());
            }
            Value::Array(many) => {
                actions.extend(many.iter().filter_map(Value::as_str).map(str::to_owned));
            }
            _ => {}
        }
    }
    actions
}

fn all_granted_actions(template: &Template) -> BTreeSet<String> {
    template
        .resources_of_type("AWS::IAM::Policy")
        .iter()
        .flat_map(|(id, _)| {
            let principal = id.as_str().trim_end_matches("DefaultPolicy").to_owned();
            granted_actions(template, &principal)
        })
        .collect()
}

fn bootstrap(template: &Template) -> (Map<String, Value>, Vec<String>) {
    let fleet = template.resources_of_type("AWS::AutoScaling::AutoScalingGroup")[0].1;
    let init = &fleet.metadata.as_ref().expect("bootstrap metadata")["AWS::CloudFormation::Init"]
        ["config"];
    let config = init["files"]["/etc/config.json"]["content"]
        .as_object()
        .expect("config.json content")
        .clone();
    let commands = init["commands"]
        .as_object()
        .expect("commands")
        .keys()
        .cloned()
        .collect();
    (config, commands)
}

fn public_ingress_ports(template: &Template) -> BTreeSet<u64> {
    template
        .resources_of_type("AWS::EC2::SecurityGroupIngress")
        .into_iter()
        .filter(|(_, r)| r.property("CidrIp") == Some(&Value::from("0.0.0.0/0")))
        .filter_map(|(_, r)| r.property("FromPort").and_then(Value::as_u64))
        .collect()
}

fn raw(pairs: &[(&str, &str)]) -> RawInputs {
    let mut raw = RawInputs::default();
    for (key, value) in pairs {
        let value = Some((*value).to_owned());
        match *key {
            "compute" => raw.compute = value,
            "storage" => raw.storage = value,
            "ingress" => raw.ingress = value,
            "efs_id" => raw.efs_id = value,
            "snapshot" => raw.ebs_snapshot_id = value,
            "tls" => raw.ssl_certificate_zip_url = value,
            "cert" => raw.ssl_cert = value,
            "key" => raw.ssl_key = value,
            "ssh" => raw.public_ssh_key = value,
            other => panic!("unknown input {other}"),
        }
    }
    raw
}

fn every_valid_configuration() -> Vec<RawInputs> {
    let tls = [
        ("tls", "https://example.com/certs.zip"),
        ("cert", "/data/certs/fullchain.pem"),
        ("key", "/data/certs/privkey.pem"),
    ];
    let mut configs = Vec::new();
    for compute in ["ec2", "fargate"] {
        configs.push(raw(&[("compute", compute)]));
        configs.push(raw(&[("compute", compute), ("efs_id", "fs-0123456789abcdef0")]));
        configs.push(raw(&[("compute", compute), ("ingress", "load-balancer")]));
    }
    let mut with_tls = vec![("compute", "ec2")];
    with_tls.extend(tls);
    configs.push(raw(&with_tls));
    configs.push(raw(&[("compute", "ec2"), ("snapshot", "snap-0abc")]));
    configs.push(raw(&[("compute", "ec2"), ("storage", "block-volume")]));
    configs.push(raw(&[("compute", "ec2"), ("storage", "host-path")]));
    configs
}

#[test]
fn every_configuration_has_one_compute_unit_and_one_storage_backend() {
    for inputs in every_valid_configuration() {
        let assembly = composed(&inputs);
        let template = &app(&assembly).template;
        assert_eq!(template.count_of_type("AWS::ECS::Service"), 1, "{inputs:?}");
        assert_eq!(template.count_of_type("AWS::ECS::TaskDefinition"), 1, "{inputs:?}");

        let task = template
            .resource(&task_definition(template))
            .expect("task definition");
        let volumes = task.property("Volumes").and_then(Value::as_array).expect("volumes");
        assert_eq!(volumes.len(), 1, "{inputs:?}");
        assert!(template.count_of_type("AWS::EFS::FileSystem") <= 1);
    }
}

#[test]
fn application_always_depends_on_shared_stack() {
    for inputs in every_valid_configuration() {
        let assembly = composed(&inputs);
        assert!(app(&assembly).dependencies().contains(SHARED_STACK_NAME));
        assert_eq!(assembly.stacks()[0].name, SHARED_STACK_NAME);
        assert!(!app(&assembly).template.imports().is_empty());
    }
}

#[test]
fn tls_maps_443_and_passes_certificates() {
    let assembly = composed(&raw(&[
        ("tls", "https://example.com/certs.zip"),
        ("cert", "/data/certs/fullchain.pem"),
        ("key", "/data/certs/privkey.pem"),
    ]));
    let template = &app(&assembly).template;
    assert!(ports(template).contains(&PortMapping::new(30000, 443)));
    let env = container_env(template);
    assert!(env.contains("FOUNDRY_SSL_CERT"));
    assert!(env.contains("FOUNDRY_SSL_KEY"));
}

#[test]
fn without_tls_there_is_no_443_and_no_certificates() {
    let assembly = composed(&RawInputs::default());
    let template = &app(&assembly).template;
    assert!(ports(template).iter().all(|m| m.host_port != 443));
    let env = container_env(template);
    assert!(!env.contains("FOUNDRY_SSL_CERT"));
    assert!(!env.contains("FOUNDRY_SSL_KEY"));
}

#[test]
fn ec2_instance_holds_session_and_address_grants() {
    let assembly = composed(&raw(&[("compute", "ec2")]));
    let actions = granted_actions(&app(&assembly).template, "InstanceRole");
    assert!(actions.contains("ssm:StartSession"));
    assert!(actions.contains("ec2:AssociateAddress"));
}

#[test]
fn fargate_holds_neither_session_nor_address_grants() {
    let assembly = composed(&raw(&[("compute", "fargate")]));
    let template = &app(&assembly).template;
    assert!(template.resource(&LogicalId::new("InstanceRole")).is_none());
    let actions = all_granted_actions(template);
    assert!(!actions.contains("ssm:StartSession"));
    assert!(!actions.contains("ec2:AssociateAddress"));
}

#[test]
fn existing_share_creates_no_file_system() {
    let assembly = composed(&raw(&[("efs_id", "fs-0123456789abcdef0")]));
    let template = &app(&assembly).template;
    assert_eq!(template.count_of_type("AWS::EFS::FileSystem"), 0);
    assert_eq!(template.count_of_type("AWS::EFS::MountTarget"), 0);

    let task = template
        .resource(&task_definition(template))
        .expect("task definition");
    let volume = &task.property("Volumes").expect("volumes")[0];
    assert_eq!(
        volume["EFSVolumeConfiguration"]["FilesystemId"],
        "fs-0123456789abcdef0"
    );
}

#[test]
fn new_share_has_one_mount_target_per_isolated_subnet() {
    let assembly = composed(&RawInputs::default());
    let isolated = shared(&assembly)
        .template
        .resources_of_type("AWS::EC2::Subnet")
        .iter()
        .filter(|(id, _)| id.as_str().starts_with("Isolated"))
        .count();
    let template = &app(&assembly).template;
    assert_eq!(template.count_of_type("AWS::EFS::FileSystem"), 1);
    assert_eq!(template.count_of_type("AWS::EFS::MountTarget"), isolated);
    assert!(isolated >= 1);
}

#[test]
fn share_is_reachable_from_compute_over_nfs() {
    let assembly = composed(&raw(&[("compute", "fargate")]));
    let template = &app(&assembly).template;
    let nfs: Vec<_> = template
        .resources_of_type("AWS::EC2::SecurityGroupIngress")
        .into_iter()
        .filter(|(_, r)| r.property("FromPort") == Some(&Value::from(2049)))
        .collect();
    assert_eq!(nfs.len(), 1);
    assert_eq!(template.count_of_type("AWS::EC2::SecurityGroupEgress"), 1);

    let actions = granted_actions(template, "TaskRole");
    assert!(actions.contains("elasticfilesystem:ClientRootAccess"));
}

#[test]
fn ec2_default_scenario() {
    let assembly = composed(&raw(&[("compute", "ec2")]));
    let template = &app(&assembly).template;

    let fleets = template.resources_of_type("AWS::AutoScaling::AutoScalingGroup");
    assert_eq!(fleets.len(), 1);
    let fleet = fleets[0].1;
    assert_eq!(fleet.property("MinSize"), Some(&Value::from("1")));
    assert_eq!(fleet.property("MaxSize"), Some(&Value::from("1")));
    assert_eq!(fleet.property("DesiredCapacity"), Some(&Value::from("1")));
    assert!(fleet.creation_policy.is_some());

    assert_eq!(template.count_of_type("AWS::EFS::FileSystem"), 1);
    assert!(template.count_of_type("AWS::EFS::MountTarget") >= 1);
    assert_eq!(ports(template), vec![PortMapping::new(30000, 80)]);

    let expected: BTreeSet<String> = [
        "ssm:StartSession",
        "ec2:AssociateAddress",
        "elasticfilesystem:ClientMount",
        "elasticfilesystem:ClientWrite",
        "elasticfilesystem:ClientRootAccess",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    assert_eq!(granted_actions(template, "InstanceRole"), expected);
}

#[test]
fn fargate_scenario() {
    let assembly = composed(&raw(&[("compute", "fargate")]));
    let template = &app(&assembly).template;

    let service = template.resources_of_type("AWS::ECS::Service")[0].1;
    assert_eq!(service.property("LaunchType"), Some(&Value::from("FARGATE")));
    assert_eq!(template.count_of_type("AWS::AutoScaling::AutoScalingGroup"), 0);
    assert_eq!(template.count_of_type("AWS::EC2::LaunchTemplate"), 0);
    assert_eq!(template.count_of_type("AWS::IAM::InstanceProfile"), 0);
    assert!(template.resources().all(|(_, r)| r.metadata.is_none()));
    assert!(template.output("PublicIp").is_none());
    assert!(template.output("LoadBalancerDns").is_some());
}

#[test]
fn task_network_mode_accepts_its_port_mappings() {
    for inputs in every_valid_configuration() {
        let assembly = composed(&inputs);
        let template = &app(&assembly).template;
        let task = template
            .resource(&task_definition(template))
            .expect("task definition");
        if task.property("NetworkMode") == Some(&Value::from("awsvpc")) {
            let mappings = ports(template);
            assert!(!mappings.is_empty(), "{inputs:?}");
            assert!(
                mappings.iter().all(|m| m.host_port == m.container_port),
                "{inputs:?}: {mappings:?}"
            );
        }
    }
}

#[test]
fn load_balancer_spans_two_availability_zones() {
    for compute in ["ec2", "fargate"] {
        let assembly = composed(&raw(&[("compute", compute), ("ingress", "load-balancer")]));
        let template = &app(&assembly).template;
        let balancer = template.resources_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")[0].1;
        let subnets: Vec<&str> = balancer
            .property("Subnets")
            .and_then(Value::as_array)
            .expect("subnets")
            .iter()
            .filter_map(|subnet| subnet["Fn::ImportValue"].as_str())
            .collect();
        assert_eq!(
            subnets,
            vec!["SharedStack:PublicSubnet1Id", "SharedStack:PublicSubnet2Id"],
            "{compute}"
        );

        let exports = shared(&assembly).template.exports();
        assert!(subnets.iter().all(|name| exports.contains(*name)));
        let zones: BTreeSet<String> = shared(&assembly)
            .template
            .resources_of_type("AWS::EC2::Subnet")
            .iter()
            .map(|(_, subnet)| subnet.properties["AvailabilityZone"].to_string())
            .collect();
        assert_eq!(zones.len(), 2);
    }
}

#[test]
fn host_port_network_stays_in_one_zone() {
    let assembly = composed(&RawInputs::default());
    let template = &shared(&assembly).template;
    assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 2);
    assert!(template.output("PublicSubnet2Id").is_none());
}

#[test]
fn fleet_and_service_wait_for_their_policies() {
    let assembly = composed(&raw(&[("compute", "ec2")]));
    let template = &app(&assembly).template;
    let fleet = template.resources_of_type("AWS::AutoScaling::AutoScalingGroup")[0].1;
    assert!(
        fleet
            .depends_on
            .contains(&LogicalId::new("InstanceRoleDefaultPolicy"))
    );
    let service = template.resources_of_type("AWS::ECS::Service")[0].1;
    assert!(
        service
            .depends_on
            .contains(&LogicalId::new("TaskRoleDefaultPolicy"))
    );

    let assembly = composed(&raw(&[("compute", "fargate")]));
    let template = &app(&assembly).template;
    let service = template.resources_of_type("AWS::ECS::Service")[0].1;
    assert!(
        service
            .depends_on
            .contains(&LogicalId::new("TaskRoleDefaultPolicy"))
    );
}

#[test]
fn bootstrap_config_carries_only_the_values_that_are_set() {
    let assembly = composed(&raw(&[
        ("compute", "ec2"),
        ("efs_id", "fs-0123456789abcdef0"),
        ("tls", "https://example.com/certs.zip"),
        ("ssh", "ssh-ed25519 AAAA admin"),
    ]));
    let (config, _) = bootstrap(&app(&assembly).template);
    assert_eq!(
        config["IP"]["Fn::ImportValue"],
        "SharedStack:EipPublicIp"
    );
    assert_eq!(config["PUBLIC_SSH_KEY"], "ssh-ed25519 AAAA admin");
    assert_eq!(config["SSL_CERTIFICATE_ZIP_URL"], "https://example.com/certs.zip");
    assert_eq!(config["EFS_ID"], "fs-0123456789abcdef0");

    let assembly = composed(&raw(&[("compute", "ec2"), ("storage", "host-path")]));
    let (config, _) = bootstrap(&app(&assembly).template);
    assert!(config.contains_key("IP"));
    for absent in ["PUBLIC_SSH_KEY", "SSL_CERTIFICATE_ZIP_URL", "EFS_ID"] {
        assert!(!config.contains_key(absent), "{absent} should be omitted");
    }
}

#[test]
fn new_share_id_reaches_the_bootstrap_config() {
    let assembly = composed(&raw(&[("compute", "ec2")]));
    let (config, _) = bootstrap(&app(&assembly).template);
    assert_eq!(config["EFS_ID"]["Ref"], "EfsFileSystem");
}

#[test]
fn block_volume_is_prepared_before_the_init_script_runs() {
    let assembly = composed(&raw(&[("compute", "ec2"), ("storage", "block-volume")]));
    let (_, commands) = bootstrap(&app(&assembly).template);

    // cfn-init runs commands in lexical order of their keys.
    let mut ordered = commands;
    ordered.sort();
    let position = |name: &str| {
        ordered
            .iter()
            .position(|c| c == name)
            .unwrap_or_else(|| panic!("missing command {name}: {ordered:?}"))
    };
    let init = position("20_run_init_script");
    for step in ["00_format_data_volume", "01_mount_data_volume", "02_persist_data_volume"] {
        assert!(position(step) < init, "{step} must run before the init script");
    }
    assert!(position("00_format_data_volume") < position("01_mount_data_volume"));
    assert!(position("01_mount_data_volume") < position("02_persist_data_volume"));

    let assembly = composed(&raw(&[("compute", "ec2")]));
    let (_, commands) = bootstrap(&app(&assembly).template);
    assert!(commands.iter().all(|c| !c.ends_with("_data_volume")));
}

#[test]
fn https_is_open_to_the_internet_only_with_tls() {
    let assembly = composed(&raw(&[
        ("compute", "ec2"),
        ("tls", "https://example.com/certs.zip"),
    ]));
    assert_eq!(
        public_ingress_ports(&app(&assembly).template),
        BTreeSet::from([80, 443])
    );

    let assembly = composed(&raw(&[("compute", "ec2")]));
    assert_eq!(
        public_ingress_ports(&app(&assembly).template),
        BTreeSet::from([80])
    );
}

#[test]
fn snapshot_scenario_restores_a_retained_block_volume() {
    let assembly = composed(&raw(&[("compute", "ec2"), ("snapshot", "snap-0abc")]));
    let template = &app(&assembly).template;

    let launch = template.resources_of_type("AWS::EC2::LaunchTemplate")[0].1;
    let mapping = &launch.properties["LaunchTemplateData"]["BlockDeviceMappings"][0];
    assert_eq!(mapping["Ebs"]["SnapshotId"], "snap-0abc");
    assert_eq!(mapping["Ebs"]["DeleteOnTermination"], false);
    assert_eq!(template.count_of_type("AWS::EFS::FileSystem"), 0);
}

#[test]
fn load_balancer_ingress_registers_the_service() {
    let assembly = composed(&raw(&[("ingress", "load-balancer")]));
    let template = &app(&assembly).template;

    let target_group = template.resources_of_type("AWS::ElasticLoadBalancingV2::TargetGroup")[0].1;
    assert_eq!(target_group.property("Port"), Some(&Value::from(30000)));
    assert_eq!(target_group.property("HealthCheckPath"), Some(&Value::from("/")));
    assert_eq!(
        target_group.property("UnhealthyThresholdCount"),
        Some(&Value::from(3))
    );
    assert_eq!(target_group.properties["Matcher"]["HttpCode"], "200,302");
    assert_eq!(ports(template), vec![PortMapping::new(30000, 30000)]);

    let service = template.resources_of_type("AWS::ECS::Service")[0].1;
    assert_eq!(service.properties["LoadBalancers"][0]["ContainerPort"], 30000);
    assert!(template.output("LoadBalancerDns").is_some());
}

#[test]
fn contradictory_inputs_are_rejected() {
    let cases = [
        raw(&[("efs_id", "fs-1"), ("snapshot", "snap-1")]),
        raw(&[("efs_id", "fs-1"), ("storage", "host-path")]),
        raw(&[("snapshot", "snap-1"), ("storage", "shared-fs")]),
        raw(&[("compute", "fargate"), ("storage", "block-volume")]),
        raw(&[("ingress", "load-balancer"), ("tls", "https://example.com/c.zip")]),
        raw(&[("compute", "fargate"), ("ingress", "host-port")]),
        raw(&[("compute", "fargate"), ("tls", "https://example.com/c.zip")]),
    ];
    for inputs in cases {
        let err = resolve(&inputs).expect_err("contradiction should be rejected");
        assert!(err.to_string().contains("conflict"), "{inputs:?}: {err}");
    }
}

#[test]
fn options_file_enables_the_asset_bucket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("options.json");
    std::fs::write(&path, "{}").expect("write options");

    let inputs = RawInputs {
        options_file: OptionsFile::detect(&path),
        ..RawInputs::default()
    };
    let assembly = composed(&inputs);
    assert_eq!(
        shared(&assembly).template.count_of_type("AWS::S3::Bucket"),
        1
    );
    let template = &app(&assembly).template;
    assert!(container_env(template).contains("FOUNDRY_AWS_CONFIG"));
    assert!(granted_actions(template, "TaskRole").contains("s3:PutObject"));
}

#[test]
fn missing_options_file_leaves_no_bucket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let inputs = RawInputs {
        options_file: OptionsFile::detect(dir.path().join("options.json")),
        ..RawInputs::default()
    };
    let assembly = composed(&inputs);
    assert_eq!(
        shared(&assembly).template.count_of_type("AWS::S3::Bucket"),
        0
    );
    assert!(!container_env(&app(&assembly).template).contains("FOUNDRY_AWS_CONFIG"));
}

#[test]
fn recomposition_is_stable() {
    for inputs in every_valid_configuration() {
        let first = composed(&inputs);
        let second = composed(&inputs);
        for (a, b) in first.stacks().iter().zip(second.stacks()) {
            assert_eq!(
                a.template.to_json().expect("json"),
                b.template.to_json().expect("json")
            );
        }
    }
}

#[test]
fn assembly_is_written_to_disk_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assembly = composed(&raw(&[("compute", "fargate")]));
    let written = assembly
        .write_to(dir.path(), TemplateFormat::Json)
        .expect("write assembly");
    assert_eq!(written.len(), 3);

    let manifest: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("manifest.json")).expect("read manifest"),
    )
    .expect("parse manifest");
    assert_eq!(manifest["stacks"][0]["name"], SHARED_STACK_NAME);
    assert_eq!(manifest["stacks"][1]["name"], APP_STACK_NAME);
    assert_eq!(manifest["stacks"][1]["dependencies"][0], SHARED_STACK_NAME);

    let app_template: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(format!("{APP_STACK_NAME}.template.json")))
            .expect("read template"),
    )
    .expect("parse template");
    assert_eq!(app_template["AWSTemplateFormatVersion"], "2010-09-09");
}
