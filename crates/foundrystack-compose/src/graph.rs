//! Stack ordering using `petgraph`.
//!
//! Builds a directed acyclic graph from the declared stack dependencies
//! and resolves the order in which stacks must be applied.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::NodeIndex;

use foundrystack_common::error::{FoundryStackError, Result};

use crate::stack::Stack;

/// A dependency graph of stacks.
#[derive(Debug)]
pub struct StackGraph {
    graph: petgraph::Graph<String, ()>,
}

impl StackGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: petgraph::Graph::new(),
        }
    }

    /// Adds a stack node to the graph.
    pub fn add_stack(&mut self, name: impl Into<String>) -> NodeIndex {
        self.graph.add_node(name.into())
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The edge points from `dependency` to `dependent` so that a
    /// topological sort yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.add_edge(dependency, dependent, ());
    }

    /// Returns stack names in deployment order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => Err(FoundryStackError::CyclicDependency {
                stacks: self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default(),
            }),
        }
    }
}

impl Default for StackGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Orders stacks and checks that every cross-stack import is satisfied.
///
/// A stack may only import exports of stacks it depends on, directly or
/// transitively. Dependencies are explicit; they are never inferred from
/// the imports.
///
/// # Errors
///
/// Returns an error on duplicate stack names, unknown dependencies, cycles,
/// or unsatisfied imports.
pub fn schedule(stacks: Vec<Stack>) -> Result<Vec<Stack>> {
    let mut graph = StackGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    for stack in &stacks {
        if nodes.contains_key(&stack.name) {
            return Err(FoundryStackError::Config {
                message: format!("duplicate stack name '{}'", stack.name),
            });
        }
        let _ = nodes.insert(stack.name.clone(), graph.add_stack(&stack.name));
    }
    for stack in &stacks {
        for dependency in stack.dependencies() {
            let target = nodes.get(dependency).ok_or_else(|| FoundryStackError::NotFound {
                kind: "stack",
                id: format!("{dependency} (dependency of {})", stack.name),
            })?;
            graph.add_dependency(nodes[&stack.name], *target);
        }
    }

    let order = graph.resolve_order()?;
    check_imports(&stacks)?;

    let mut by_name: HashMap<String, Stack> =
        stacks.into_iter().map(|s| (s.name.clone(), s)).collect();
    let ordered: Vec<Stack> = order
        .iter()
        .filter_map(|name| by_name.remove(name))
        .collect();
    tracing::info!(order = ?order, "stacks scheduled");
    Ok(ordered)
}

fn check_imports(stacks: &[Stack]) -> Result<()> {
    let by_name: HashMap<&str, &Stack> = stacks.iter().map(|s| (s.name.as_str(), s)).collect();

    for stack in stacks {
        let available = upstream_exports(stack, &by_name);
        if let Some(missing) = stack
            .template
            .imports()
            .into_iter()
            .find(|name| !available.contains(name))
        {
            return Err(FoundryStackError::NotFound {
                kind: "export",
                id: format!("{missing} (imported by {})", stack.name),
            });
        }
    }
    Ok(())
}

fn upstream_exports(stack: &Stack, by_name: &HashMap<&str, &Stack>) -> BTreeSet<String> {
    let mut exports = BTreeSet::new();
    let mut pending: Vec<&str> = stack.dependencies().iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    while let Some(name) = pending.pop() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(upstream) = by_name.get(name) {
            exports.extend(upstream.template.exports());
            pending.extend(upstream.dependencies().iter().map(String::as_str));
        }
    }
    exports
}

#[cfg(test)]
mod tests {
    use foundrystack_common::config::DeployEnvironment;
    use serde_json::json;

    use super::*;
    use crate::intrinsic;
    use crate::template::{Output, Resource, Template};

    fn exporting(name: &str, export: &str) -> Stack {
        let mut template = Template::new(name);
        let _ = template
            .add("Vpc", Resource::new("AWS::EC2::VPC"))
            .expect("add");
        template.add_output(
            "VpcId",
            Output::new(json!({ "Ref": "Vpc" }), "vpc").exported_as(export),
        );
        Stack::new(name, DeployEnvironment::default(), template)
    }

    fn importing(name: &str, export: &str) -> Stack {
        let mut template = Template::new(name);
        let _ = template
            .add(
                "Group",
                Resource::new("AWS::EC2::SecurityGroup")
                    .with_properties(json!({ "VpcId": intrinsic::import_value(export) })),
            )
            .expect("add");
        Stack::new(name, DeployEnvironment::default(), template)
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = StackGraph::new();
        let order = graph.resolve_order().expect("should resolve");
        assert!(order.is_empty());
    }

    #[test]
    fn dependency_comes_first() {
        let mut graph = StackGraph::new();
        let app = graph.add_stack("App");
        let shared = graph.add_stack("Shared");
        graph.add_dependency(app, shared);

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["Shared", "App"]);
    }

    #[test]
    fn cycle_detection() {
        let mut graph = StackGraph::new();
        let a = graph.add_stack("a");
        let b = graph.add_stack("b");
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        let msg = graph.resolve_order().unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn schedule_orders_declared_dependencies() {
        let shared = exporting("Shared", "Shared:VpcId");
        let mut app = importing("App", "Shared:VpcId");
        app.add_dependency("Shared");

        let ordered = schedule(vec![app, shared]).expect("schedule");
        let names: Vec<&str> = ordered.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Shared", "App"]);
    }

    #[test]
    fn import_without_declared_dependency_is_rejected() {
        let shared = exporting("Shared", "Shared:VpcId");
        let app = importing("App", "Shared:VpcId");

        let msg = schedule(vec![shared, app]).unwrap_err().to_string();
        assert!(msg.contains("Shared:VpcId"), "got: {msg}");
    }

    #[test]
    fn transitive_exports_satisfy_imports() {
        let base = exporting("Base", "Base:VpcId");
        let mut middle = Stack::new("Middle", DeployEnvironment::default(), Template::new("m"));
        middle.add_dependency("Base");
        let mut top = importing("Top", "Base:VpcId");
        top.add_dependency("Middle");

        let ordered = schedule(vec![top, middle, base]).expect("schedule");
        assert_eq!(ordered[0].name, "Base");
        assert_eq!(ordered[2].name, "Top");
    }

    #[test]
    fn duplicate_stack_names_are_rejected() {
        let first = exporting("Shared", "Shared:VpcId");
        let mut second = importing("Shared", "Shared:VpcId");
        second.add_dependency("Shared");
        let err = schedule(vec![first, second]).unwrap_err();
        assert!(matches!(err, FoundryStackError::Config { .. }), "got: {err}");
        assert!(err.to_string().contains("duplicate stack name 'Shared'"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut app = importing("App", "Shared:VpcId");
        app.add_dependency("Missing");
        let msg = schedule(vec![app]).unwrap_err().to_string();
        assert!(msg.contains("Missing"), "got: {msg}");
    }
}
