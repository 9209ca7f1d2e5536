//! `fstack synth`: write the cloud assembly to disk.

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use foundrystack_common::config::RawInputs;
use foundrystack_common::constants::DEFAULT_OUTPUT_DIR;
use foundrystack_compose::TemplateFormat;

/// Template serialization format.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl From<Format> for TemplateFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => Self::Json,
            Format::Yaml => Self::Yaml,
        }
    }
}

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Directory receiving the templates and manifest.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Template format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,
}

/// Executes the `synth` command.
///
/// Resolves the configuration, composes both stacks and writes one
/// template per stack plus `manifest.json`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, composition fails, or
/// the output cannot be written.
pub fn execute(raw: &RawInputs, args: &SynthArgs) -> anyhow::Result<()> {
    let config = foundrystack_compose::resolver::resolve(raw)?;
    let assembly = foundrystack_compose::compose(&config)?;
    let written = assembly.write_to(&args.output, args.format.into())?;

    tracing::info!(output = %args.output.display(), files = written.len(), "assembly written");
    for path in &written {
        println!("  {}", path.display());
    }
    println!();
    println!(
        "  {} stack(s) synthesized into {}",
        assembly.stacks().len(),
        args.output.display()
    );
    Ok(())
}
