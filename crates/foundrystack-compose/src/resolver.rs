//! Configuration resolution.
//!
//! Turns [`RawInputs`] into the immutable [`StackConfiguration`] that every
//! other part of the composer reads. Strategy selection happens here, once;
//! nothing downstream inspects raw strings again.

use foundrystack_common::config::{
    ContainerSettings, DeployEnvironment, RawInputs, StackConfiguration, StorageKind, TlsSettings,
};
use foundrystack_common::constants::{DEFAULT_CORS_ORIGIN, DEFAULT_IMAGE, DEFAULT_TIMEZONE};
use foundrystack_common::error::{FoundryStackError, Result};
use foundrystack_common::types::{ComputeKind, IngressKind, StorageSelection};

/// Resolves raw inputs into a stack configuration.
///
/// # Resolution order
///
/// 1. Compute: explicit value, else EC2.
/// 2. Storage: an existing share id wins, then an explicit storage
///    selection, then a snapshot id (block volume), else a new share.
/// 3. Ingress: explicit value, else host-port mapping on EC2 and a load
///    balancer on Fargate. Tasks in `awsvpc` mode cannot remap the
///    container port onto 80/443, so Fargate never binds host ports.
/// 4. TLS: enabled iff a certificate archive URL is given.
/// 5. Object store: enabled iff the local options file was detected.
///
/// # Errors
///
/// Returns an error if a value cannot be parsed or if two inputs
/// contradict each other.
pub fn resolve(raw: &RawInputs) -> Result<StackConfiguration> {
    let compute = non_empty(raw.compute.as_ref())
        .map(str::parse::<ComputeKind>)
        .transpose()?
        .unwrap_or_default();
    let selection = non_empty(raw.storage.as_ref())
        .map(str::parse::<StorageSelection>)
        .transpose()?;
    let ingress = non_empty(raw.ingress.as_ref())
        .map(str::parse::<IngressKind>)
        .transpose()?
        .unwrap_or(match compute {
            ComputeKind::Ec2 => IngressKind::HostPort,
            ComputeKind::Fargate => IngressKind::LoadBalancer,
        });

    if compute == ComputeKind::Fargate && ingress == IngressKind::HostPort {
        return Err(FoundryStackError::conflict("host-port ingress", "fargate compute"));
    }

    let storage = resolve_storage(
        selection,
        non_empty(raw.efs_id.as_ref()),
        non_empty(raw.ebs_snapshot_id.as_ref()),
    )?;

    if storage.is_instance_local() && compute == ComputeKind::Fargate {
        return Err(FoundryStackError::conflict(
            format!("{} storage", storage_label(&storage)),
            "fargate compute",
        ));
    }

    let tls = non_empty(raw.ssl_certificate_zip_url.as_ref()).map(|url| TlsSettings {
        certificate_zip_url: url.to_owned(),
        cert: owned(raw.ssl_cert.as_ref()),
        key: owned(raw.ssl_key.as_ref()),
    });

    if tls.is_some() && ingress == IngressKind::LoadBalancer {
        let second = match compute {
            ComputeKind::Ec2 => "load-balancer ingress",
            ComputeKind::Fargate => "fargate compute",
        };
        return Err(FoundryStackError::conflict("SSL_CERTIFICATE_ZIP_URL", second));
    }

    let config = StackConfiguration {
        compute,
        storage,
        ingress,
        tls,
        persist_s3_assets: raw.options_file.is_present(),
        allowed_origins: parse_origins(raw.allowed_s3_origins.as_ref()),
        public_ssh_key: owned(raw.public_ssh_key.as_ref()),
        init_script: owned(raw.init_script.as_ref()),
        container: ContainerSettings {
            image: owned(raw.image.as_ref()).unwrap_or_else(|| DEFAULT_IMAGE.to_owned()),
            release_url: owned(raw.release_url.as_ref()),
            username: owned(raw.username.as_ref()),
            password: owned(raw.password.as_ref()),
            admin_key: owned(raw.admin_key.as_ref()),
            timezone: owned(raw.timezone.as_ref())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_owned()),
        },
        environment: DeployEnvironment {
            account: owned(raw.account.as_ref()),
            region: owned(raw.region.as_ref()),
        },
    };

    tracing::info!(
        compute = %config.compute,
        storage = storage_label(&config.storage),
        ingress = %config.ingress,
        tls = config.tls_enabled(),
        persist_s3_assets = config.persist_s3_assets,
        "resolved stack configuration"
    );

    Ok(config)
}

fn resolve_storage(
    selection: Option<StorageSelection>,
    efs_id: Option<&str>,
    snapshot_id: Option<&str>,
) -> Result<StorageKind> {
    if efs_id.is_some() && snapshot_id.is_some() {
        return Err(FoundryStackError::conflict("EFS_ID", "EBS_SNAPSHOT_ID"));
    }

    match (selection, efs_id, snapshot_id) {
        (Some(StorageSelection::SharedFs) | None, Some(id), _) => {
            Ok(StorageKind::ExistingSharedFs {
                file_system_id: id.to_owned(),
            })
        }
        (Some(other), Some(_), _) => Err(FoundryStackError::conflict(
            "EFS_ID",
            format!("{other} storage"),
        )),
        (Some(StorageSelection::BlockVolume) | None, None, Some(snapshot)) => {
            Ok(StorageKind::BlockVolume {
                snapshot_id: Some(snapshot.to_owned()),
            })
        }
        (Some(other), None, Some(_)) => Err(FoundryStackError::conflict(
            "EBS_SNAPSHOT_ID",
            format!("{other} storage"),
        )),
        (Some(StorageSelection::BlockVolume), None, None) => {
            Ok(StorageKind::BlockVolume { snapshot_id: None })
        }
        (Some(StorageSelection::HostPath), None, None) => Ok(StorageKind::HostPath),
        (Some(StorageSelection::SharedFs) | None, None, None) => Ok(StorageKind::NewSharedFs),
    }
}

/// Short name of a storage backend for logs and messages.
#[must_use]
pub const fn storage_label(kind: &StorageKind) -> &'static str {
    match kind {
        StorageKind::NewSharedFs => "new-shared-fs",
        StorageKind::ExistingSharedFs { .. } => "existing-shared-fs",
        StorageKind::BlockVolume { .. } => "block-volume",
        StorageKind::HostPath => "host-path",
    }
}

fn parse_origins(raw: Option<&String>) -> Vec<String> {
    let origins: Vec<String> = non_empty(raw)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    if origins.is_empty() {
        vec![DEFAULT_CORS_ORIGIN.to_owned()]
    } else {
        origins
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn owned(value: Option<&String>) -> Option<String> {
    non_empty(value).map(str::to_owned)
}
