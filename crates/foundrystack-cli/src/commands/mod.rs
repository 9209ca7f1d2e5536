//! CLI command definitions and dispatch.

pub mod plan;
pub mod synth;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use foundrystack_common::config::{OptionsFile, RawInputs};
use foundrystack_common::constants::{BIN_NAME, DEFAULT_OPTIONS_FILE};

/// Composes the Foundry server deployment into infrastructure templates.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Deployment switches, shared by every subcommand.
    #[command(flatten)]
    pub inputs: InputArgs,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the stack templates and manifest to the output directory.
    Synth(synth::SynthArgs),
    /// Display the stacks and resources that would be synthesized.
    Plan(plan::PlanArgs),
}

/// Flags and environment variables selecting the deployment shape.
#[derive(Args, Debug, Default)]
pub struct InputArgs {
    /// Compute model: `ec2` or `fargate`.
    #[arg(long, global = true, env = "COMPUTE_KIND")]
    pub compute: Option<String>,

    /// Storage backend: `shared-fs`, `block-volume` or `host-path`.
    #[arg(long, global = true, env = "STORAGE_KIND")]
    pub storage: Option<String>,

    /// Public ingress: `host-port` or `load-balancer`.
    #[arg(long, global = true, env = "INGRESS_KIND")]
    pub ingress: Option<String>,

    /// Existing file share to mount instead of creating one.
    #[arg(long, global = true, env = "EFS_ID")]
    pub efs_id: Option<String>,

    /// Snapshot to restore the block volume from.
    #[arg(long, global = true, env = "EBS_SNAPSHOT_ID")]
    pub ebs_snapshot_id: Option<String>,

    /// Archive with TLS certificates; enables HTTPS.
    #[arg(long, global = true, env = "SSL_CERTIFICATE_ZIP_URL")]
    pub ssl_certificate_zip_url: Option<String>,

    /// Certificate path inside the container.
    #[arg(long, global = true, env = "FOUNDRY_SSL_CERT")]
    pub ssl_cert: Option<String>,

    /// Private key path inside the container.
    #[arg(long, global = true, env = "FOUNDRY_SSL_KEY")]
    pub ssl_key: Option<String>,

    /// Public key installed for SSH on the host.
    #[arg(long, global = true, env = "PUBLIC_SSH_KEY")]
    pub public_ssh_key: Option<String>,

    /// Comma-separated CORS origins of the asset bucket.
    #[arg(long, global = true, env = "ALLOWED_S3_ORIGINS")]
    pub allowed_s3_origins: Option<String>,

    /// Container timezone.
    #[arg(long, global = true, env = "TIMEZONE")]
    pub timezone: Option<String>,

    /// Release download URL.
    #[arg(long, global = true, env = "FOUNDRY_RELEASE_URL")]
    pub release_url: Option<String>,

    /// Account username.
    #[arg(long, global = true, env = "FOUNDRY_USERNAME")]
    pub username: Option<String>,

    /// Account password.
    #[arg(long, global = true, env = "FOUNDRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Administrator key.
    #[arg(long, global = true, env = "FOUNDRY_ADMIN_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    /// Target account.
    #[arg(long, global = true, env = "ACCOUNT")]
    pub account: Option<String>,

    /// Target region.
    #[arg(long, global = true, env = "REGION")]
    pub region: Option<String>,

    /// Local options file; the asset bucket is provisioned when it exists.
    #[arg(long, global = true, default_value = DEFAULT_OPTIONS_FILE)]
    pub options_file: PathBuf,

    /// Replacement for the bundled first-boot script.
    #[arg(long, global = true)]
    pub init_script: Option<PathBuf>,

    /// Container image.
    #[arg(long, global = true, env = "FOUNDRY_IMAGE")]
    pub image: Option<String>,
}

impl InputArgs {
    /// Collects the raw inputs, detecting the options file once.
    ///
    /// # Errors
    ///
    /// Returns an error if the init script cannot be read.
    pub fn raw_inputs(&self) -> anyhow::Result<RawInputs> {
        let init_script = self
            .init_script
            .as_ref()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading init script {}", path.display()))
            })
            .transpose()?;

        Ok(RawInputs {
            compute: self.compute.clone(),
            storage: self.storage.clone(),
            ingress: self.ingress.clone(),
            efs_id: self.efs_id.clone(),
            ebs_snapshot_id: self.ebs_snapshot_id.clone(),
            ssl_certificate_zip_url: self.ssl_certificate_zip_url.clone(),
            ssl_cert: self.ssl_cert.clone(),
            ssl_key: self.ssl_key.clone(),
            public_ssh_key: self.public_ssh_key.clone(),
            allowed_s3_origins: self.allowed_s3_origins.clone(),
            timezone: self.timezone.clone(),
            image: self.image.clone(),
            release_url: self.release_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            admin_key: self.admin_key.clone(),
            account: self.account.clone(),
            region: self.region.clone(),
            options_file: OptionsFile::detect(&self.options_file),
            init_script,
        })
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let raw = cli.inputs.raw_inputs()?;
    match cli.command {
        Command::Synth(args) => synth::execute(&raw, &args),
        Command::Plan(args) => plan::execute(&raw, &args),
    }
}
