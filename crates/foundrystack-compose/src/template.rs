//! Resource graph model.
//!
//! A [`Template`] is the composed graph of one deployable unit: resources
//! keyed by stable logical ids, the edges between them expressed as
//! intrinsic references or explicit `DependsOn`, and the outputs the unit
//! exports. It serializes to a CloudFormation document.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};

use foundrystack_common::error::{FoundryStackError, Result};
use foundrystack_common::types::LogicalId;

use crate::intrinsic;

const FORMAT_VERSION: &str = "2010-09-09";

/// What happens to a resource when it is removed from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    /// Keep the physical resource.
    Retain,
    /// Snapshot the resource before deleting it.
    Snapshot,
    /// Delete the physical resource.
    Delete,
}

/// A single resource node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Resource type, e.g. `AWS::ECS::Service`.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Resource properties.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    /// Explicit ordering edges.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<LogicalId>,
    /// Policy applied on removal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    /// Policy applied on replacement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
    /// Completion signal requirements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_policy: Option<Value>,
    /// Resource metadata (instance bootstrap configuration lives here).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Resource {
    /// Creates a resource of the given type with no properties.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            update_replace_policy: None,
            creation_policy: None,
            metadata: None,
        }
    }

    /// Replaces the properties with the entries of a JSON object.
    ///
    /// Non-object values are ignored.
    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties = map;
        }
        self
    }

    /// Adds an explicit dependency on another resource.
    #[must_use]
    pub fn depends_on(mut self, id: &LogicalId) -> Self {
        let _ = self.depends_on.insert(id.clone());
        self
    }

    /// Keeps the physical resource on removal and replacement.
    #[must_use]
    pub const fn retain(mut self) -> Self {
        self.deletion_policy = Some(DeletionPolicy::Retain);
        self.update_replace_policy = Some(DeletionPolicy::Retain);
        self
    }

    /// Sets the creation policy.
    #[must_use]
    pub fn with_creation_policy(mut self, policy: Value) -> Self {
        self.creation_policy = Some(policy);
        self
    }

    /// Sets the metadata block.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns a property by name.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Sets a property, replacing any previous value.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.properties.insert(key.into(), value);
    }

    /// Appends to an array property, creating it if absent.
    pub fn push_property(&mut self, key: &str, value: Value) {
        match self.properties.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => self.set_property(key, Value::Array(vec![value])),
        }
    }
}

/// Export attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    /// Region-unique export name.
    pub name: String,
}

/// A value published by a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Output value.
    pub value: Value,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Export, when the value is consumed by another stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    /// Creates an output with a description.
    #[must_use]
    pub fn new(value: Value, description: impl Into<String>) -> Self {
        Self {
            value,
            description: Some(description.into()),
            export: None,
        }
    }

    /// Publishes the output under an export name.
    #[must_use]
    pub fn exported_as(mut self, name: impl Into<String>) -> Self {
        self.export = Some(Export { name: name.into() });
        self
    }
}

/// The composed resource graph of one deployable unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    resources: BTreeMap<LogicalId, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    /// Creates an empty template.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: Some(description.into()),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Adds a resource under a logical id and returns the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already taken.
    pub fn add(&mut self, id: impl Into<LogicalId>, resource: Resource) -> Result<LogicalId> {
        let id = id.into();
        if self.resources.contains_key(&id) {
            return Err(FoundryStackError::Config {
                message: format!("duplicate logical id \"{id}\""),
            });
        }
        tracing::debug!(id = %id, resource_type = %resource.resource_type, "resource added");
        let _ = self.resources.insert(id.clone(), resource);
        Ok(id)
    }

    /// Returns a resource by id.
    #[must_use]
    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Returns a mutable resource by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown.
    pub fn resource_mut(&mut self, id: &LogicalId) -> Result<&mut Resource> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| FoundryStackError::NotFound {
                kind: "resource",
                id: id.to_string(),
            })
    }

    /// Iterates over all resources in logical-id order.
    pub fn resources(&self) -> impl Iterator<Item = (&LogicalId, &Resource)> {
        self.resources.iter()
    }

    /// Returns all resources of one type.
    #[must_use]
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&LogicalId, &Resource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .collect()
    }

    /// Counts resources of one type.
    #[must_use]
    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .count()
    }

    /// Number of resources in the template.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if the template holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Adds an output.
    pub fn add_output(&mut self, name: impl Into<String>, output: Output) {
        let _ = self.outputs.insert(name.into(), output);
    }

    /// Returns an output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    /// Iterates over outputs in name order.
    pub fn outputs(&self) -> impl Iterator<Item = (&String, &Output)> {
        self.outputs.iter()
    }

    /// Export names published by this template.
    #[must_use]
    pub fn exports(&self) -> BTreeSet<String> {
        self.outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.clone()))
            .collect()
    }

    /// Export names consumed by this template.
    #[must_use]
    pub fn imports(&self) -> BTreeSet<String> {
        let mut imports = BTreeSet::new();
        for resource in self.resources.values() {
            for value in resource.properties.values() {
                intrinsic::collect_imports(value, &mut imports);
            }
            if let Some(metadata) = &resource.metadata {
                intrinsic::collect_imports(metadata, &mut imports);
            }
        }
        for output in self.outputs.values() {
            intrinsic::collect_imports(&output.value, &mut imports);
        }
        imports
    }

    /// Checks that every `Ref`, `Fn::GetAtt`, `Fn::Sub` interpolation and
    /// `DependsOn` targets a resource of this template. Properties,
    /// metadata and outputs are all walked.
    ///
    /// # Errors
    ///
    /// Returns [`FoundryStackError::NotFound`] for the first dangling edge.
    pub fn validate_references(&self) -> Result<()> {
        for (id, resource) in &self.resources {
            let mut targets = resource.depends_on.clone();
            for value in resource.properties.values() {
                intrinsic::collect_references(value, &mut targets);
            }
            if let Some(metadata) = &resource.metadata {
                intrinsic::collect_references(metadata, &mut targets);
            }
            self.ensure_present(&targets, id.as_str())?;
        }
        for (name, output) in &self.outputs {
            let mut targets = BTreeSet::new();
            intrinsic::collect_references(&output.value, &mut targets);
            self.ensure_present(&targets, &format!("output {name}"))?;
        }
        Ok(())
    }

    fn ensure_present(&self, targets: &BTreeSet<LogicalId>, referrer: &str) -> Result<()> {
        match targets.iter().find(|t| !self.resources.contains_key(*t)) {
            Some(missing) => Err(FoundryStackError::NotFound {
                kind: "resource",
                id: format!("{missing} (referenced by {referrer})"),
            }),
            None => Ok(()),
        }
    }

    /// Serializes the template to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
