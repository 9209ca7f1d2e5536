//! Configuration models: the raw inputs collected at the edge and the
//! resolved, immutable [`StackConfiguration`] the composer consumes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{ComputeKind, IngressKind};

/// Presence of the local object-store options file.
///
/// Resolved once when inputs are collected and threaded through as a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsFile {
    /// Location that was checked.
    pub path: Option<PathBuf>,
    /// Whether a file existed at `path` when it was checked.
    pub present: bool,
}

impl OptionsFile {
    /// Checks `path` once and records the result.
    #[must_use]
    pub fn detect(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            present: path.is_file(),
            path: Some(path.to_path_buf()),
        }
    }

    /// Returns `true` if the options file was found.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.present
    }
}

/// Unresolved inputs as read from flags and the environment.
///
/// Every field is optional. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawInputs {
    /// Compute strategy (`ec2` / `fargate`).
    pub compute: Option<String>,
    /// Storage selection (`shared-fs` / `block-volume` / `host-path`).
    pub storage: Option<String>,
    /// Ingress mechanism (`host-port` / `load-balancer`).
    pub ingress: Option<String>,
    /// Identifier of an existing file share (`EFS_ID`).
    pub efs_id: Option<String>,
    /// Snapshot to restore the block volume from (`EBS_SNAPSHOT_ID`).
    pub ebs_snapshot_id: Option<String>,
    /// Certificate archive location (`SSL_CERTIFICATE_ZIP_URL`).
    pub ssl_certificate_zip_url: Option<String>,
    /// Certificate path passed to the container (`FOUNDRY_SSL_CERT`).
    pub ssl_cert: Option<String>,
    /// Key path passed to the container (`FOUNDRY_SSL_KEY`).
    pub ssl_key: Option<String>,
    /// Key installed for remote access on the instance (`PUBLIC_SSH_KEY`).
    pub public_ssh_key: Option<String>,
    /// Comma-separated CORS origins (`ALLOWED_S3_ORIGINS`).
    pub allowed_s3_origins: Option<String>,
    /// Container timezone (`TIMEZONE`).
    pub timezone: Option<String>,
    /// Container image override.
    pub image: Option<String>,
    /// `FOUNDRY_RELEASE_URL`.
    pub release_url: Option<String>,
    /// `FOUNDRY_USERNAME`.
    pub username: Option<String>,
    /// `FOUNDRY_PASSWORD`.
    pub password: Option<String>,
    /// `FOUNDRY_ADMIN_KEY`.
    pub admin_key: Option<String>,
    /// Target account (`ACCOUNT`).
    pub account: Option<String>,
    /// Target region (`REGION`).
    pub region: Option<String>,
    /// Local options file presence.
    pub options_file: OptionsFile,
    /// Contents of an init script overriding the bundled one.
    pub init_script: Option<String>,
}

/// Resolved persistent-volume backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Provision a new managed file share.
    NewSharedFs,
    /// Attach an existing managed file share.
    ExistingSharedFs {
        /// External identifier of the share.
        file_system_id: String,
    },
    /// Attach a block volume to the instance.
    BlockVolume {
        /// Snapshot the volume is restored from, if any.
        snapshot_id: Option<String>,
    },
    /// Bind a directory of the instance's local disk.
    HostPath,
}

impl StorageKind {
    /// Returns `true` for the managed file share variants.
    #[must_use]
    pub const fn is_shared_fs(&self) -> bool {
        matches!(self, Self::NewSharedFs | Self::ExistingSharedFs { .. })
    }

    /// Returns `true` for variants that live on the compute instance.
    #[must_use]
    pub const fn is_instance_local(&self) -> bool {
        matches!(self, Self::BlockVolume { .. } | Self::HostPath)
    }
}

/// TLS material handed to the instance and the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Location of the certificate archive fetched at boot.
    pub certificate_zip_url: String,
    /// Certificate path inside the container.
    pub cert: Option<String>,
    /// Key path inside the container.
    pub key: Option<String>,
}

/// Application settings passed to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Image reference.
    pub image: String,
    /// Release download pointer.
    pub release_url: Option<String>,
    /// Account username.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Administrator key.
    pub admin_key: Option<String>,
    /// Timezone.
    pub timezone: String,
}

/// Account and region targeted by every stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployEnvironment {
    /// Target account id.
    pub account: Option<String>,
    /// Target region.
    pub region: Option<String>,
}

impl DeployEnvironment {
    /// Renders the environment the way deployment manifests name it.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

/// Immutable result of configuration resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfiguration {
    /// Compute strategy.
    pub compute: ComputeKind,
    /// Storage backend.
    pub storage: StorageKind,
    /// Ingress mechanism.
    pub ingress: IngressKind,
    /// TLS settings, present iff TLS is enabled.
    pub tls: Option<TlsSettings>,
    /// Whether the shared unit provides an object store for assets.
    pub persist_s3_assets: bool,
    /// CORS origins of the object store.
    pub allowed_origins: Vec<String>,
    /// Key installed on the instance for remote access.
    pub public_ssh_key: Option<String>,
    /// Init script override.
    pub init_script: Option<String>,
    /// Container settings.
    pub container: ContainerSettings,
    /// Target environment.
    pub environment: DeployEnvironment,
}

impl StackConfiguration {
    /// Returns `true` if TLS is enabled.
    #[must_use]
    pub const fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}
