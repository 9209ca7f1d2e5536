//! Cross-cutting permission and connectivity rules.
//!
//! Runs after both strategies have resolved. Rules and grants accumulate in
//! [`Connections`] and [`Permissions`] and are rendered into the template
//! once composition is complete.

pub mod connectivity;
pub mod ingress;
pub mod permissions;

use serde_json::json;

use foundrystack_common::config::StackConfiguration;
use foundrystack_common::constants::NFS_PORT;
use foundrystack_common::error::Result;

use crate::compute::ComputeUnit;
use crate::intrinsic;
use crate::shared::SharedHandles;
use crate::storage::{SharedFsHandle, StorageBackend};
use crate::template::Template;

use self::connectivity::Connections;
use self::permissions::Permissions;

/// Actions of a read/write grant on the asset bucket.
pub const BUCKET_READ_WRITE_ACTIONS: [&str; 10] = [
    "s3:GetObject*",
    "s3:GetBucket*",
    "s3:List*",
    "s3:DeleteObject*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];

/// Inputs to the wiring pass.
#[derive(Debug, Clone, Copy)]
pub struct WiringContext<'a> {
    /// Resolved configuration.
    pub config: &'a StackConfiguration,
    /// Handles imported from the shared stack.
    pub shared: &'a SharedHandles,
    /// Resolved compute unit.
    pub compute: &'a ComputeUnit,
    /// Resolved storage backend.
    pub storage: &'a StorageBackend,
}

/// Applies storage access, asset access and ingress.
///
/// # Errors
///
/// Returns an error if the template cannot be patched.
pub fn apply(
    ctx: &WiringContext<'_>,
    template: &mut Template,
    permissions: &mut Permissions,
    connections: &mut Connections,
) -> Result<()> {
    if let Some(share) = &ctx.storage.share {
        wire_share(ctx.compute, share, permissions, connections);
    }

    if let Some(store) = &ctx.shared.object_store {
        let arn = store.bucket_arn.import();
        permissions.grant(
            &ctx.compute.task_role,
            BUCKET_READ_WRITE_ACTIONS,
            vec![
                arn.clone(),
                intrinsic::sub_with("${Arn}/*", json!({ "Arn": arn })),
            ],
        );
    }

    ingress::apply(ctx.config, ctx.shared, ctx.compute, template, connections)
}

fn wire_share(
    compute: &ComputeUnit,
    share: &SharedFsHandle,
    permissions: &mut Permissions,
    connections: &mut Connections,
) {
    connections.allow_between(
        &share.security_group,
        &compute.security_group,
        NFS_PORT,
        "File share access from compute",
    );
    for principal in compute.share_principals() {
        permissions.grant(
            principal,
            SharedFsHandle::access_actions(),
            vec![share.file_system_arn.clone()],
        );
    }
}
