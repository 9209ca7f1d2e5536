//! Persistent-volume backends.
//!
//! Each [`StorageKind`] variant yields a [`StorageBackend`]: the task volume
//! the container mounts at `/data`, plus whatever the variant needs from the
//! rest of the graph (a file share to grant access to, block devices and
//! boot commands for the instance). Provisioning itself is left to the
//! engine; this module only selects and parameterizes.

use serde_json::{Value, json};

use foundrystack_common::config::StorageKind;
use foundrystack_common::constants::{
    BLOCK_DEVICE_NAME, BLOCK_MOUNT_PATH, BLOCK_VOLUME_SIZE_GIB, DATA_MOUNT_PATH, DATA_VOLUME_NAME,
    HOST_DATA_PATH,
};
use foundrystack_common::error::Result;
use foundrystack_common::types::LogicalId;

use crate::intrinsic;
use crate::resolver::storage_label;
use crate::shared::NetworkTopology;
use crate::template::{Resource, Template};
use crate::wiring::connectivity::SecurityGroupRef;

const SHARE_ACTIONS: [&str; 3] = [
    "elasticfilesystem:ClientMount",
    "elasticfilesystem:ClientWrite",
    "elasticfilesystem:ClientRootAccess",
];

/// Handles to a managed file share.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedFsHandle {
    /// File system id.
    pub file_system_id: Value,
    /// File system ARN, the scope of access grants.
    pub file_system_arn: Value,
    /// Security group guarding the mount targets.
    pub security_group: SecurityGroupRef,
}

impl SharedFsHandle {
    /// Actions needed to mount and write as root.
    #[must_use]
    pub fn access_actions() -> Vec<String> {
        SHARE_ACTIONS.iter().map(|a| (*a).to_owned()).collect()
    }
}

/// A named command run once on first boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapCommand {
    /// Command key. Commands run in key order.
    pub name: String,
    /// Shell command line.
    pub command: String,
}

/// What the backend needs from the compute instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceRequirements {
    /// Block-device mappings for the launch template.
    pub block_devices: Vec<Value>,
    /// Boot commands, run before the init script.
    pub commands: Vec<BootstrapCommand>,
}

/// A resolved persistent-volume backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageBackend {
    /// Variant this backend was built from.
    pub kind: StorageKind,
    /// Task-definition volume descriptor.
    pub volume: Value,
    /// File share handles, for share-based variants.
    pub share: Option<SharedFsHandle>,
    /// Instance-side requirements, for instance-local variants.
    pub instance: InstanceRequirements,
    /// Mount targets created by this backend.
    pub mount_targets: Vec<LogicalId>,
}

impl StorageBackend {
    /// Container mount point of the volume. Always `/data`.
    #[must_use]
    pub fn mount_point(&self) -> Value {
        json!({
            "SourceVolume": DATA_VOLUME_NAME,
            "ContainerPath": DATA_MOUNT_PATH,
            "ReadOnly": false,
        })
    }

    /// File-system id as written into the instance bootstrap file.
    #[must_use]
    pub fn file_system_id(&self) -> Option<&Value> {
        self.share.as_ref().map(|s| &s.file_system_id)
    }
}

/// Builds the backend for `kind`, adding any resources it owns to `template`.
///
/// # Errors
///
/// Returns an error if a resource cannot be added to the template.
pub fn provision(
    kind: &StorageKind,
    template: &mut Template,
    network: &NetworkTopology,
) -> Result<StorageBackend> {
    tracing::info!(storage = storage_label(kind), "composing storage backend");
    match kind {
        StorageKind::NewSharedFs => new_shared_fs(template, network),
        StorageKind::ExistingSharedFs { file_system_id } => {
            Ok(existing_shared_fs(file_system_id, network))
        }
        StorageKind::BlockVolume { snapshot_id } => Ok(block_volume(snapshot_id.as_deref())),
        StorageKind::HostPath => Ok(host_path()),
    }
}

fn new_shared_fs(template: &mut Template, network: &NetworkTopology) -> Result<StorageBackend> {
    let group = template.add(
        "EfsSecurityGroup",
        Resource::new("AWS::EC2::SecurityGroup").with_properties(json!({
            "GroupDescription": "Mount targets of the Foundry data file system",
            "VpcId": network.vpc_id.import(),
            "SecurityGroupEgress": [{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }],
        })),
    )?;

    let file_system = template.add(
        "EfsFileSystem",
        Resource::new("AWS::EFS::FileSystem")
            .with_properties(json!({
                "Encrypted": true,
                "PerformanceMode": "generalPurpose",
                "ThroughputMode": "bursting",
                "LifecyclePolicies": [{ "TransitionToIA": "AFTER_7_DAYS" }],
                "FileSystemPolicy": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "AWS": "*" },
                        "Action": SHARE_ACTIONS,
                        "Condition": {
                            "Bool": { "elasticfilesystem:AccessedViaMountTarget": "true" },
                        },
                    }],
                },
                "FileSystemTags": [{ "Key": "Name", "Value": "FoundryData" }],
            }))
            .retain(),
    )?;

    let security_group = SecurityGroupRef::local(&group);
    let mut mount_targets = Vec::new();
    for (index, subnet) in network.isolated_subnets.iter().enumerate() {
        let target = template.add(
            format!("EfsMountTarget{}", index + 1),
            Resource::new("AWS::EFS::MountTarget").with_properties(json!({
                "FileSystemId": intrinsic::reference(&file_system),
                "SubnetId": subnet.import(),
                "SecurityGroups": [security_group.group_id.clone()],
            })),
        )?;
        mount_targets.push(target);
    }

    Ok(StorageBackend {
        kind: StorageKind::NewSharedFs,
        volume: shared_fs_volume(intrinsic::reference(&file_system)),
        share: Some(SharedFsHandle {
            file_system_id: intrinsic::reference(&file_system),
            file_system_arn: intrinsic::get_att(&file_system, "Arn"),
            security_group,
        }),
        instance: InstanceRequirements::default(),
        mount_targets,
    })
}

fn existing_shared_fs(file_system_id: &str, network: &NetworkTopology) -> StorageBackend {
    let id = Value::String(file_system_id.to_owned());
    StorageBackend {
        kind: StorageKind::ExistingSharedFs {
            file_system_id: file_system_id.to_owned(),
        },
        volume: shared_fs_volume(id.clone()),
        share: Some(SharedFsHandle {
            file_system_id: id,
            file_system_arn: intrinsic::sub(format!(
                "arn:${{AWS::Partition}}:elasticfilesystem:${{AWS::Region}}:${{AWS::AccountId}}:file-system/{file_system_id}"
            )),
            security_group: SecurityGroupRef::new(
                "VpcDefault",
                network.default_security_group.import(),
            ),
        }),
        instance: InstanceRequirements::default(),
        mount_targets: Vec::new(),
    }
}

fn block_volume(snapshot_id: Option<&str>) -> StorageBackend {
    let mut ebs = json!({
        "DeleteOnTermination": false,
        "VolumeType": "gp3",
    });
    if let Value::Object(map) = &mut ebs {
        if let Some(snapshot) = snapshot_id {
            let _ = map.insert("SnapshotId".into(), Value::String(snapshot.to_owned()));
        } else {
            let _ = map.insert("VolumeSize".into(), json!(BLOCK_VOLUME_SIZE_GIB));
            let _ = map.insert("Encrypted".into(), Value::Bool(true));
        }
    }

    let commands = vec![
        BootstrapCommand {
            name: "00_format_data_volume".into(),
            command: format!("blkid {BLOCK_DEVICE_NAME} || mkfs -t xfs {BLOCK_DEVICE_NAME}"),
        },
        BootstrapCommand {
            name: "01_mount_data_volume".into(),
            command: format!(
                "mkdir -p {BLOCK_MOUNT_PATH} && (mountpoint -q {BLOCK_MOUNT_PATH} || mount {BLOCK_DEVICE_NAME} {BLOCK_MOUNT_PATH})"
            ),
        },
        BootstrapCommand {
            name: "02_persist_data_volume".into(),
            command: format!(
                "grep -q '^{BLOCK_DEVICE_NAME} ' /etc/fstab || echo '{BLOCK_DEVICE_NAME} {BLOCK_MOUNT_PATH} xfs defaults,nofail 0 2' >> /etc/fstab"
            ),
        },
    ];

    StorageBackend {
        kind: StorageKind::BlockVolume {
            snapshot_id: snapshot_id.map(str::to_owned),
        },
        volume: host_volume(BLOCK_MOUNT_PATH),
        share: None,
        instance: InstanceRequirements {
            block_devices: vec![json!({ "DeviceName": BLOCK_DEVICE_NAME, "Ebs": ebs })],
            commands,
        },
        mount_targets: Vec::new(),
    }
}

fn host_path() -> StorageBackend {
    StorageBackend {
        kind: StorageKind::HostPath,
        volume: host_volume(HOST_DATA_PATH),
        share: None,
        instance: InstanceRequirements::default(),
        mount_targets: Vec::new(),
    }
}

fn shared_fs_volume(file_system_id: Value) -> Value {
    json!({
        "Name": DATA_VOLUME_NAME,
        "EFSVolumeConfiguration": {
            "FilesystemId": file_system_id,
            "TransitEncryption": "ENABLED",
            "AuthorizationConfig": { "IAM": "ENABLED" },
        },
    })
}

fn host_volume(path: &str) -> Value {
    json!({
        "Name": DATA_VOLUME_NAME,
        "Host": { "SourcePath": path },
    })
}
