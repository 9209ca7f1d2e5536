//! The composed output handed to the provisioning engine.
//!
//! An assembly is the ordered list of stacks. On disk it is one template
//! file per stack plus `manifest.json`, which records every stack's target
//! environment and its dependency edges in deployment order.

use std::path::{Path, PathBuf};

use serde::Serialize;

use foundrystack_common::error::{FoundryStackError, Result};

use crate::stack::Stack;

const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: &str = "1.0";

/// Serialization format of template files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl TemplateFormat {
    /// File extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Manifest entry for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Stack name.
    pub name: String,
    /// `aws://account/region`.
    pub environment: String,
    /// Template file, relative to the assembly directory.
    pub template_file: String,
    /// Stacks that must be applied first.
    pub dependencies: Vec<String>,
    /// Resource count.
    pub resource_count: usize,
}

/// Assembly manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Manifest format version.
    pub version: &'static str,
    /// Stacks in deployment order.
    pub stacks: Vec<ManifestEntry>,
}

/// Ordered stacks ready for deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    stacks: Vec<Stack>,
}

impl CloudAssembly {
    /// Wraps stacks that are already in deployment order.
    #[must_use]
    pub(crate) const fn from_ordered(stacks: Vec<Stack>) -> Self {
        Self { stacks }
    }

    /// Stacks in deployment order.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Looks up a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Builds the manifest for a given template format.
    #[must_use]
    pub fn manifest(&self, format: TemplateFormat) -> Manifest {
        Manifest {
            version: MANIFEST_VERSION,
            stacks: self
                .stacks
                .iter()
                .map(|stack| ManifestEntry {
                    name: stack.name.clone(),
                    environment: stack.environment.describe(),
                    template_file: stack.template_file(format.extension()),
                    dependencies: stack.dependencies().iter().cloned().collect(),
                    resource_count: stack.template.len(),
                })
                .collect(),
        }
    }

    /// Writes every template and the manifest into `dir`, creating it if
    /// needed. Returns the written paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be written, or if
    /// serialization fails.
    pub fn write_to(&self, dir: &Path, format: TemplateFormat) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| FoundryStackError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut written = Vec::with_capacity(self.stacks.len() + 1);
        for stack in &self.stacks {
            let path = dir.join(stack.template_file(format.extension()));
            let body = match format {
                TemplateFormat::Json => serde_json::to_string_pretty(&stack.template)?,
                TemplateFormat::Yaml => serde_yaml::to_string(&stack.template)?,
            };
            write_file(&path, &body)?;
            tracing::info!(stack = %stack.name, path = %path.display(), "template written");
            written.push(path);
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        write_file(
            &manifest_path,
            &serde_json::to_string_pretty(&self.manifest(format))?,
        )?;
        written.push(manifest_path);
        Ok(written)
    }
}

fn write_file(path: &Path, body: &str) -> Result<()> {
    std::fs::write(path, body).map_err(|e| FoundryStackError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
