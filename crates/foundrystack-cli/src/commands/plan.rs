//! `fstack plan`: display the stacks that would be synthesized.

use clap::Args;

use foundrystack_common::config::RawInputs;
use foundrystack_common::types::LogicalId;
use foundrystack_compose::resolver::{self, storage_label};
use foundrystack_compose::{composer, container};

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// Also list every logical id.
    #[arg(long)]
    pub resources: bool,
}

/// Executes the `plan` command.
///
/// Resolves the configuration, composes both stacks, and prints them in
/// deployment order without writing anything.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or composition fails.
pub fn execute(raw: &RawInputs, args: &PlanArgs) -> anyhow::Result<()> {
    let config = resolver::resolve(raw)?;
    let assembly = composer::compose(&config)?;

    let title = format!(
        "Deployment Plan: {} / {} / {}",
        config.compute,
        storage_label(&config.storage),
        config.ingress
    );
    println!("{title}");
    println!("{}", output::rule(&title));
    println!();
    println!("  environment: {}", config.environment.describe());
    println!("  tls: {}", if config.tls_enabled() { "enabled" } else { "disabled" });
    println!(
        "  asset bucket: {}",
        if config.persist_s3_assets { "enabled" } else { "disabled" }
    );
    println!();

    for stack in assembly.stacks() {
        println!("  + {} ({} resources)", stack.name, stack.template.len());
        for dependency in stack.dependencies() {
            println!("      depends on: {dependency}");
        }
        for (resource_type, count) in output::resource_counts(&stack.template) {
            println!("      {count:>3} x {resource_type}");
        }
        if args.resources {
            for (id, resource) in stack.template.resources() {
                println!("          {id}: {}", resource.resource_type);
            }
        }

        if let Some(service) = composer::service_id(&stack.template) {
            let task_definition = stack
                .template
                .resource(&service)
                .and_then(|s| s.property("TaskDefinition"))
                .and_then(|v| v["Ref"].as_str())
                .map(LogicalId::new);
            if let Some(task_definition) = task_definition {
                let ports: Vec<String> = container::port_mappings(&stack.template, &task_definition)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("      ports: {}", ports.join(", "));
            }
        }

        let exports = stack.template.exports();
        if !exports.is_empty() {
            println!("      exports: {}", exports.len());
        }
    }

    println!();
    println!("  {} stack(s) will be deployed in this order.", assembly.stacks().len());
    Ok(())
}
