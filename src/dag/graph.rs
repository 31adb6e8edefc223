// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::GraphValidationError;
use crate::tasks::{Task, TaskName};

/// Task definitions as supplied by the caller.
///
/// A `Dag` is configuration: it is built once and can be executed any number
/// of times. Nothing is checked until [`Dag::validate`].
#[derive(Debug, Clone, Default)]
pub struct Dag {
    tasks: Vec<Arc<dyn Task>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.add_task(Arc::new(task));
        self
    }

    pub fn add_task(&mut self, task: Arc<dyn Task>) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.tasks.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Task>> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check names and dependency references, reject cycles, and build the
    /// adjacency used for scheduling.
    pub fn validate(&self) -> Result<DagGraph, GraphValidationError> {
        if self.tasks.is_empty() {
            return Err(GraphValidationError::EmptyDag);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name()) {
                return Err(GraphValidationError::DuplicateTask(task.name().to_string()));
            }
        }

        for task in &self.tasks {
            for dep in task.dependencies() {
                if dep == task.name() {
                    return Err(GraphValidationError::SelfDependency(task.name().to_string()));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(GraphValidationError::UnknownDependency {
                        task: task.name().to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Edge direction: dependency -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for task in &self.tasks {
            graph.add_node(task.name());
        }
        for task in &self.tasks {
            for dep in task.dependencies() {
                graph.add_edge(dep.as_str(), task.name(), ());
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| GraphValidationError::Cycle(cycle.node_id().to_string()))?
            .into_iter()
            .map(str::to_string)
            .collect();

        Ok(DagGraph::build(&self.tasks, order))
    }
}

/// Immediate deps and dependents of one node.
#[derive(Debug, Clone)]
struct DagNode {
    task: Arc<dyn Task>,
    deps: Vec<TaskName>,
    dependents: Vec<TaskName>,
}

/// A validated, acyclic task graph.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TaskName, DagNode>,
    order: Vec<TaskName>,
}

impl DagGraph {
    fn build(tasks: &[Arc<dyn Task>], order: Vec<TaskName>) -> Self {
        let mut nodes: HashMap<TaskName, DagNode> = tasks
            .iter()
            .map(|t| {
                (
                    t.name().to_string(),
                    DagNode {
                        task: Arc::clone(t),
                        deps: t.dependencies().to_vec(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        // Walk in declaration order so dependents lists are deterministic.
        for task in tasks {
            for dep in task.dependencies() {
                if let Some(node) = nodes.get_mut(dep) {
                    node.dependents.push(task.name().to_string());
                }
            }
        }

        Self { nodes, order }
    }

    /// Task names in a valid execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn task(&self, name: &str) -> Option<&Arc<dyn Task>> {
        self.nodes.get(name).map(|n| &n.task)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every task that transitively depends on `name`.
    pub fn descendants_of(&self, name: &str) -> HashSet<TaskName> {
        let mut out = HashSet::new();
        let mut stack: Vec<&str> = self.dependents_of(name).iter().map(|s| s.as_str()).collect();
        while let Some(n) = stack.pop() {
            if out.insert(n.to_string()) {
                stack.extend(self.dependents_of(n).iter().map(|s| s.as_str()));
            }
        }
        out
    }

    /// Group tasks by depth: layer 0 has no dependencies, layer `k` tasks
    /// depend on something in layer `k - 1`. Tasks within a layer are
    /// independent of each other.
    pub fn execution_layers(&self) -> Vec<Vec<TaskName>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut layers: Vec<Vec<TaskName>> = Vec::new();

        for name in &self.order {
            let d = self
                .dependencies_of(name)
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(name.as_str(), d);
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(name.clone());
        }

        for layer in &mut layers {
            layer.sort();
        }
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{NoopTask, TaskSpec};

    fn noop(name: &str, deps: &[&str]) -> NoopTask {
        NoopTask::new(TaskSpec::new(name).after(deps.iter().copied()))
    }

    fn fan_out_fan_in() -> Dag {
        Dag::new()
            .with_task(noop("start", &[]))
            .with_task(noop("a", &["start"]))
            .with_task(noop("b", &["start"]))
            .with_task(noop("join", &["a", "b"]))
    }

    #[test]
    fn layers_expose_fan_out_and_fan_in() {
        let graph = fan_out_fan_in().validate().unwrap();
        assert_eq!(
            graph.execution_layers(),
            vec![
                vec!["start".to_string()],
                vec!["a".to_string(), "b".to_string()],
                vec!["join".to_string()],
            ]
        );
        assert_eq!(graph.dependents_of("start"), ["a".to_string(), "b".to_string()]);
        assert_eq!(graph.descendants_of("a"), HashSet::from(["join".to_string()]));
    }

    #[test]
    fn cycles_are_rejected() {
        let dag = Dag::new()
            .with_task(noop("a", &["b"]))
            .with_task(noop("b", &["a"]));
        assert!(matches!(dag.validate(), Err(GraphValidationError::Cycle(_))));
    }

    #[test]
    fn bad_references_are_rejected() {
        let dag = Dag::new().with_task(noop("a", &["missing"]));
        assert_eq!(
            dag.validate().unwrap_err(),
            GraphValidationError::UnknownDependency {
                task: "a".into(),
                dependency: "missing".into()
            }
        );

        let dag = Dag::new().with_task(noop("a", &["a"]));
        assert_eq!(dag.validate().unwrap_err(), GraphValidationError::SelfDependency("a".into()));

        let dag = Dag::new().with_task(noop("a", &[])).with_task(noop("a", &[]));
        assert_eq!(dag.validate().unwrap_err(), GraphValidationError::DuplicateTask("a".into()));

        assert_eq!(Dag::new().validate().unwrap_err(), GraphValidationError::EmptyDag);
    }

    #[test]
    fn order_respects_dependencies() {
        let graph = fan_out_fan_in().validate().unwrap();
        let order: Vec<&str> = graph.tasks().collect();
        let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();
        assert!(pos("start") < pos("a"));
        assert!(pos("b") < pos("join"));
    }
}
