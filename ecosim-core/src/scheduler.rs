//! Execution order of components
//!
//! For each phase a dependency graph is built over the configured components, with an edge
//! `A -> B` labelled `v` when `B` requires variable `v` in that phase, `A` populates `v` in the
//! same phase and `v` is not already present in the data store. Each graph is sorted
//! topologically, breaking ties by configuration order, so the same configuration always gives
//! the same schedule.
//!
//! Variables produced in the init phase satisfy update requirements but do not add edges to
//! the update graph, since every init has run before the first update.

use crate::component::{Component, Phase, Role};
use crate::data::Data;
use crate::errors::{EcosimError, EcosimResult};
use crate::variable::VariableRegistry;
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

/// Graph of component names linked by the variables passed between them
pub type DependencyGraph = Graph<String, String>;

/// Component execution order for both phases
#[derive(Debug, Clone)]
pub struct Schedule {
    init_order: Vec<usize>,
    update_order: Vec<usize>,
    init_graph: DependencyGraph,
    update_graph: DependencyGraph,
}

impl Schedule {
    /// Check requirements and compute the execution order for each phase
    ///
    /// The registry must already hold the usage of `components`, and `data` holds the
    /// externally supplied variables.
    pub fn new(
        components: &[Box<dyn Component>],
        registry: &VariableRegistry,
        data: &Data,
    ) -> EcosimResult<Self> {
        check_unique_names(components)?;
        preflight(components, registry, data)?;

        let init_graph = dependency_graph(components, registry, data, Phase::Init);
        let update_graph = dependency_graph(components, registry, data, Phase::Update);
        let init_order = topological_order(&init_graph, Phase::Init)?;
        let update_order = topological_order(&update_graph, Phase::Update)?;

        debug!(
            init = ?names_in_order(&init_graph, &init_order),
            update = ?names_in_order(&update_graph, &update_order),
            "Computed component schedule"
        );

        Ok(Self {
            init_order,
            update_order,
            init_graph,
            update_graph,
        })
    }

    /// Indices into the configured components, in execution order
    pub fn order(&self, phase: Phase) -> &[usize] {
        match phase {
            Phase::Init => &self.init_order,
            Phase::Update => &self.update_order,
        }
    }

    /// Component names in execution order
    pub fn names(&self, phase: Phase) -> Vec<&str> {
        names_in_order(self.graph(phase), self.order(phase))
    }

    pub fn graph(&self, phase: Phase) -> &DependencyGraph {
        match phase {
            Phase::Init => &self.init_graph,
            Phase::Update => &self.update_graph,
        }
    }

    /// Graphviz rendering of the dependency graph for a phase
    pub fn as_dot(&self, phase: Phase) -> String {
        let graph = self.graph(phase);
        format!(
            "{:?}",
            Dot::with_attr_getters(
                graph,
                &[Config::NodeNoLabel, Config::EdgeNoLabel],
                &|_, edge| format!("label = {:?}", edge.weight()),
                &|_, (_, name)| format!("label = {:?}", name),
            )
        )
    }
}

fn names_in_order<'a>(graph: &'a DependencyGraph, order: &[usize]) -> Vec<&'a str> {
    order
        .iter()
        .map(|&i| graph[NodeIndex::new(i)].as_str())
        .collect()
}

fn check_unique_names(components: &[Box<dyn Component>]) -> EcosimResult<()> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut repeated = Vec::new();
    for component in components {
        let count = seen.entry(component.name()).or_insert(0);
        *count += 1;
        if *count == 2 {
            repeated.push(component.name().to_string());
        }
    }
    if repeated.is_empty() {
        Ok(())
    } else {
        Err(EcosimError::Configuration(format!(
            "component names must be unique, found repeated: {}",
            repeated.join(", ")
        )))
    }
}

/// Check that every requirement can be met before anything runs
///
/// An init requirement is met by loaded data or by another component's init. An update
/// requirement is met by loaded data, by any component's init or by another component's
/// update. Every unmet requirement is reported.
pub fn preflight(
    components: &[Box<dyn Component>],
    registry: &VariableRegistry,
    data: &Data,
) -> EcosimResult<()> {
    let mut unmet = Vec::new();

    for component in components {
        let name = component.name();
        for requirement in component.definitions() {
            if requirement.role != Role::Required || data.contains(&requirement.name) {
                continue;
            }
            let other = |phase| {
                registry
                    .populated_by(&requirement.name, phase)
                    .is_some_and(|producer| producer != name)
            };
            let met = match requirement.phase {
                Phase::Init => other(Phase::Init),
                Phase::Update => {
                    registry
                        .populated_by(&requirement.name, Phase::Init)
                        .is_some()
                        || other(Phase::Update)
                }
            };
            if !met {
                unmet.push(format!(
                    "'{}' requires '{}' during {} but it is neither loaded nor populated by another component",
                    name, requirement.name, requirement.phase
                ));
            }
        }
    }

    if unmet.is_empty() {
        Ok(())
    } else {
        Err(EcosimError::UnsatisfiedRequirements(unmet))
    }
}

/// Build the dependency graph for one phase
///
/// Node `i` is the `i`th configured component.
pub fn dependency_graph(
    components: &[Box<dyn Component>],
    registry: &VariableRegistry,
    data: &Data,
    phase: Phase,
) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let nodes: HashMap<&str, NodeIndex> = components
        .iter()
        .map(|c| (c.name(), graph.add_node(c.name().to_string())))
        .collect();

    for component in components {
        let consumer = nodes[component.name()];
        for requirement in component.requirements(phase, Role::Required) {
            if data.contains(&requirement.name) {
                continue;
            }
            let Some(producer) = registry
                .populated_by(&requirement.name, phase)
                .and_then(|name| nodes.get(name))
            else {
                continue;
            };
            if *producer != consumer {
                graph.update_edge(*producer, consumer, requirement.name.clone());
            }
        }
    }
    graph
}

/// Kahn's algorithm, always taking the ready component configured first
fn topological_order(graph: &DependencyGraph, phase: Phase) -> EcosimResult<Vec<usize>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(graph.node_count());

    while let Some(Reverse(next)) = ready.pop() {
        order.push(next);
        for successor in graph.neighbors_directed(NodeIndex::new(next), Direction::Outgoing) {
            let degree = &mut in_degree[successor.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(successor.index()));
            }
        }
    }

    if order.len() == graph.node_count() {
        Ok(order)
    } else {
        Err(cycle_error(graph, phase))
    }
}

/// Describe one cycle: its components in configuration order and a variable passed within it
fn cycle_error(graph: &DependencyGraph, phase: Phase) -> EcosimError {
    let cycle = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .min_by_key(|scc| scc.iter().map(|n| n.index()).min())
        .unwrap_or_default();

    let mut members: Vec<NodeIndex> = cycle;
    members.sort();
    let variable = graph
        .edge_references()
        .find(|e| members.contains(&e.source()) && members.contains(&e.target()))
        .map(|e| e.weight().clone())
        .unwrap_or_default();

    EcosimError::CyclicDependency {
        phase: phase.to_string(),
        components: members.iter().map(|&n| graph[n].clone()).collect(),
        variable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_array::DataArray;
    use crate::example_components::Transfer;
    use crate::grid::Grid;
    use crate::variable::{VariableDefinition, VariableRegistry};

    fn registry(names: &[&str], components: &[Box<dyn Component>]) -> VariableRegistry {
        let mut registry = VariableRegistry::from_definitions(
            names
                .iter()
                .map(|n| VariableDefinition::new(n, "", "", &[])),
        )
        .unwrap();
        registry.register_components(components).unwrap();
        registry
    }

    fn data() -> Data {
        Data::new(Grid::square(100.0, 2, 2).unwrap())
    }

    fn build(
        components: &[Box<dyn Component>],
        names: &[&str],
        data: &Data,
    ) -> EcosimResult<Schedule> {
        Schedule::new(components, &registry(names, components), data)
    }

    #[test]
    fn producer_runs_first() {
        // Configured consumer first to show the order comes from the dependency
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::new("Q", "temperature", "humidity")),
            Box::new(Transfer::named("P").with_output("temperature")),
        ];
        let schedule = build(&components, &["temperature", "humidity"], &data()).unwrap();
        assert_eq!(schedule.names(Phase::Update), vec!["P", "Q"]);
        assert_eq!(schedule.order(Phase::Update), &[1, 0]);

        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::named("P").with_output("temperature")),
            Box::new(Transfer::new("Q", "temperature", "humidity")),
        ];
        let schedule = build(&components, &["temperature", "humidity"], &data()).unwrap();
        assert_eq!(schedule.names(Phase::Update), vec!["P", "Q"]);
    }

    #[test]
    fn independent_components_keep_configured_order() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::named("c").with_output("z")),
            Box::new(Transfer::named("a").with_output("x")),
            Box::new(Transfer::new("d", "x", "w")),
            Box::new(Transfer::named("b").with_output("y")),
        ];
        let schedule = build(&components, &["w", "x", "y", "z"], &data()).unwrap();
        assert_eq!(schedule.names(Phase::Update), vec!["c", "a", "d", "b"]);
        assert_eq!(schedule.names(Phase::Init), vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn cycle_reported() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::new("R", "flux", "temperature")),
            Box::new(Transfer::new("S", "temperature", "flux")),
        ];
        match build(&components, &["flux", "temperature"], &data()).unwrap_err() {
            EcosimError::CyclicDependency {
                phase,
                components,
                variable,
            } => {
                assert_eq!(phase, "update");
                assert_eq!(components, vec!["R", "S"]);
                assert!(variable == "flux" || variable == "temperature");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn loaded_data_breaks_cycle() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::new("R", "flux", "temperature")),
            Box::new(Transfer::new("S", "temperature", "flux")),
        ];
        let mut data = data();
        data.set("flux", DataArray::from_vec("", "cell_id", vec![0.0; 4]))
            .unwrap();
        let schedule = build(&components, &["flux", "temperature"], &data).unwrap();
        assert_eq!(schedule.names(Phase::Update), vec!["R", "S"]);
    }

    #[test]
    fn self_dependency_ignored() {
        let components: Vec<Box<dyn Component>> = vec![Box::new(
            Transfer::new("litter", "carbon", "carbon").with_init_output("carbon"),
        )];
        let schedule = build(&components, &["carbon"], &data()).unwrap();
        assert_eq!(schedule.names(Phase::Update), vec!["litter"]);
        assert_eq!(schedule.graph(Phase::Update).edge_count(), 0);
    }

    #[test]
    fn unmet_requirements_listed_together() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::new("a", "rain", "x").with_init_input("soil")),
            Box::new(Transfer::new("b", "b_own", "b_own")),
            Box::new(Transfer::named("c").with_init_input("x")),
        ];
        let err = build(&components, &["rain", "soil", "x", "b_own"], &data()).unwrap_err();
        match err {
            EcosimError::UnsatisfiedRequirements(unmet) => {
                assert_eq!(unmet.len(), 4);
                assert!(unmet[0].contains("'a' requires 'soil' during init"));
                assert!(unmet[1].contains("'a' requires 'rain' during update"));
                assert!(unmet[2].contains("'b' requires 'b_own' during update"));
                // Update outputs do not satisfy init requirements
                assert!(unmet[3].contains("'c' requires 'x' during init"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn init_outputs_satisfy_update() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::new("growth", "biomass", "litter")),
            Box::new(Transfer::named("plants").with_init_output("biomass")),
        ];
        let schedule = build(&components, &["biomass", "litter"], &data()).unwrap();
        // No update edge from an init producer
        assert_eq!(schedule.graph(Phase::Update).edge_count(), 0);
        assert_eq!(schedule.names(Phase::Update), vec!["growth", "plants"]);
    }

    #[test]
    fn init_phase_ordering() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::named("soil").with_init_input("biomass").with_init_output("carbon")),
            Box::new(Transfer::named("plants").with_init_output("biomass")),
        ];
        let schedule = build(&components, &["biomass", "carbon"], &data()).unwrap();
        assert_eq!(schedule.names(Phase::Init), vec!["plants", "soil"]);
    }

    #[test]
    fn repeated_names_rejected() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::named("a")),
            Box::new(Transfer::named("a")),
        ];
        let err = build(&components, &[], &data()).unwrap_err();
        assert!(err.to_string().contains("repeated: a"));
    }

    #[test]
    fn dot_output() {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(Transfer::named("P").with_output("temperature")),
            Box::new(Transfer::new("Q", "temperature", "humidity")),
        ];
        let schedule = build(&components, &["temperature", "humidity"], &data()).unwrap();
        let dot = schedule.as_dot(Phase::Update);
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("label = \"P\""));
        assert!(dot.contains("label = \"temperature\""));
        assert!(dot.contains("0 -> 1"));
    }
}
