//! End-to-end composition.
//!
//! Resolves the shared stack first, injects its handles into the
//! application template, runs the storage and compute strategies, then the
//! wiring pass, and finally hands both stacks to the scheduler.

use std::collections::BTreeMap;

use serde_json::json;

use foundrystack_common::config::StackConfiguration;
use foundrystack_common::constants::{APP_STACK_NAME, SHARED_STACK_NAME};
use foundrystack_common::error::Result;
use foundrystack_common::types::LogicalId;

use crate::assembly::CloudAssembly;
use crate::compute::{self, ComputeContext, ComputeUnit};
use crate::container::ContainerSpec;
use crate::graph;
use crate::intrinsic;
use crate::resolver::storage_label;
use crate::shared::{SharedHandles, SharedResourceProvisioner};
use crate::stack::Stack;
use crate::storage;
use crate::template::{Output, Resource, Template};
use crate::wiring::connectivity::Connections;
use crate::wiring::permissions::Permissions;
use crate::wiring::{self, WiringContext};

const LOG_RETENTION_DAYS: u32 = 7;

/// Composes a configuration into an ordered cloud assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composer {
    shared_stack_name: String,
    app_stack_name: String,
}

impl Default for Composer {
    fn default() -> Self {
        Self {
            shared_stack_name: SHARED_STACK_NAME.to_owned(),
            app_stack_name: APP_STACK_NAME.to_owned(),
        }
    }
}

impl Composer {
    /// Creates a composer with the default stack names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides both stack names.
    #[must_use]
    pub fn with_stack_names(mut self, shared: impl Into<String>, app: impl Into<String>) -> Self {
        self.shared_stack_name = shared.into();
        self.app_stack_name = app.into();
        self
    }

    /// Builds both stacks and orders them.
    ///
    /// # Errors
    ///
    /// Returns an error if a template cannot be assembled, a reference is
    /// dangling, or the stacks cannot be scheduled.
    pub fn compose(&self, config: &StackConfiguration) -> Result<CloudAssembly> {
        tracing::info!(
            compute = %config.compute,
            storage = storage_label(&config.storage),
            ingress = %config.ingress,
            environment = %config.environment.describe(),
            "composing deployment"
        );

        let (shared_stack, shared) =
            SharedResourceProvisioner::new(config, &self.shared_stack_name).provision()?;
        let mut app_stack = Stack::new(
            &self.app_stack_name,
            config.environment.clone(),
            self.application(config, &shared)?,
        );
        app_stack.add_dependency(&shared_stack.name);

        let stacks = graph::schedule(vec![shared_stack, app_stack])?;
        Ok(CloudAssembly::from_ordered(stacks))
    }

    fn application(&self, config: &StackConfiguration, shared: &SharedHandles) -> Result<Template> {
        let mut template = Template::new(format!(
            "Foundry application stack ({})",
            self.app_stack_name
        ));

        let cluster = template.add("EcsCluster", Resource::new("AWS::ECS::Cluster"))?;
        let log_group = template.add(
            "FoundryLogGroup",
            Resource::new("AWS::Logs::LogGroup")
                .with_properties(json!({ "RetentionInDays": LOG_RETENTION_DAYS }))
                .retain(),
        )?;

        let backend = storage::provision(&config.storage, &mut template, &shared.network)?;
        let container = ContainerSpec::from_config(config, shared.object_store.is_some());

        let mut permissions = Permissions::new();
        let mut connections = Connections::new();
        let unit = compute::provision(
            &ComputeContext {
                config,
                shared,
                cluster: &cluster,
                storage: &backend,
                container: &container,
                log_group: &log_group,
            },
            &mut template,
            &mut permissions,
        )?;

        wiring::apply(
            &WiringContext {
                config,
                shared,
                compute: &unit,
                storage: &backend,
            },
            &mut template,
            &mut permissions,
            &mut connections,
        )?;
        let policies = permissions.render(&mut template)?;
        order_after_policies(&mut template, &unit, &policies)?;
        connections.render(&mut template)?;

        template.add_output(
            "ClusterName",
            Output::new(intrinsic::reference(&cluster), "Cluster running Foundry"),
        );
        template.validate_references()?;
        tracing::debug!(resources = template.len(), "application template ready");
        Ok(template)
    }
}

/// The fleet bootstraps with the instance role and the service starts tasks
/// with the task role; neither may come up before its role's policy exists.
fn order_after_policies(
    template: &mut Template,
    unit: &ComputeUnit,
    policies: &BTreeMap<LogicalId, LogicalId>,
) -> Result<()> {
    let edges = [
        (unit.capacity.as_ref(), unit.instance_role.as_ref()),
        (Some(&unit.service), Some(&unit.task_role)),
    ];
    for (dependent, role) in edges {
        let (Some(dependent), Some(role)) = (dependent, role) else {
            continue;
        };
        if let Some(policy) = policies.get(role) {
            let _ = template
                .resource_mut(dependent)?
                .depends_on
                .insert(policy.clone());
        }
    }
    Ok(())
}

/// Composes `config` with the default stack names.
///
/// # Errors
///
/// See [`Composer::compose`].
pub fn compose(config: &StackConfiguration) -> Result<CloudAssembly> {
    Composer::default().compose(config)
}

/// Logical id of the service in a composed application template.
#[must_use]
pub fn service_id(template: &Template) -> Option<LogicalId> {
    template
        .resources_of_type("AWS::ECS::Service")
        .first()
        .map(|(id, _)| (*id).clone())
}

#[cfg(test)]
mod tests {
    use foundrystack_common::config::RawInputs;
    use foundrystack_common::types::{ComputeKind, IngressKind};

    use super::*;
    use crate::resolver;

    fn config(raw: &RawInputs) -> StackConfiguration {
        resolver::resolve(raw).expect("resolve")
    }

    #[test]
    fn default_composition_has_two_ordered_stacks() {
        let assembly = compose(&config(&RawInputs::default())).expect("compose");
        let names: Vec<&str> = assembly.stacks().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![SHARED_STACK_NAME, APP_STACK_NAME]);
    }

    #[test]
    fn custom_stack_names_are_honoured() {
        let assembly = Composer::new()
            .with_stack_names("Net", "Game")
            .compose(&config(&RawInputs::default()))
            .expect("compose");
        let game = assembly.stack("Game").expect("app stack");
        assert!(game.dependencies().contains("Net"));
        assert!(
            game.template
                .imports()
                .iter()
                .all(|name| name.starts_with("Net:"))
        );
    }

    #[test]
    fn log_group_is_retained_for_a_week() {
        let assembly = compose(&config(&RawInputs::default())).expect("compose");
        let app = assembly.stack(APP_STACK_NAME).expect("app stack");
        let group = app
            .template
            .resource(&LogicalId::new("FoundryLogGroup"))
            .expect("log group");
        assert_eq!(group.property("RetentionInDays"), Some(&json!(7)));
    }

    #[test]
    fn identical_stack_names_are_rejected() {
        let err = Composer::new()
            .with_stack_names("Foundry", "Foundry")
            .compose(&config(&RawInputs::default()))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate stack name"), "got: {err}");
    }

    #[test]
    fn fargate_is_never_bound_to_host_ports() {
        let mut config = config(&RawInputs::default());
        config.compute = ComputeKind::Fargate;
        config.ingress = IngressKind::HostPort;
        let err = compose(&config).unwrap_err();
        assert!(err.to_string().contains("host-port ingress"), "got: {err}");
    }

    #[test]
    fn service_id_finds_the_service() {
        let assembly = compose(&config(&RawInputs::default())).expect("compose");
        let app = assembly.stack(APP_STACK_NAME).expect("app stack");
        assert_eq!(service_id(&app.template), Some(LogicalId::new("EcsService")));
    }
}
