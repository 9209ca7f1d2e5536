//! Deployable units.

use std::collections::BTreeSet;

use foundrystack_common::config::DeployEnvironment;

use crate::template::Template;

/// One independently deployed collection of resources.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    /// Stack name, unique within the assembly.
    pub name: String,
    /// Target account and region.
    pub environment: DeployEnvironment,
    /// Composed resources.
    pub template: Template,
    dependencies: BTreeSet<String>,
}

impl Stack {
    /// Creates a stack with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: DeployEnvironment, template: Template) -> Self {
        Self {
            name: name.into(),
            environment,
            template,
            dependencies: BTreeSet::new(),
        }
    }

    /// Declares that this stack must be applied after `other`.
    pub fn add_dependency(&mut self, other: &str) {
        if other != self.name {
            let _ = self.dependencies.insert(other.to_owned());
        }
    }

    /// Names of the stacks this one depends on.
    #[must_use]
    pub const fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// File name of the rendered template.
    #[must_use]
    pub fn template_file(&self, extension: &str) -> String {
        format!("{}.template.{extension}", self.name)
    }
}
