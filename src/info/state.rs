//! Declarative state graphs.
//!
//! A graph is a tree of named states rooted at `/`. Transitions and
//! operations declared on a state are visible from all of its descendants.
//! Initialization and termination triggers drive a provider through the
//! graph when it is commissioned and disposed.

use std::collections::HashSet;

use crate::error::{ControlError, ControlResult};

/// Action fired by an initialization or termination trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Apply the named transition
    Apply(String),
    /// Execute the named operation
    Exec(String),
}

/// Named edge to a target state, optionally invoking a lifecycle method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    pub target: String,
    pub method: Option<String>,
}

impl Transition {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            method: None,
        }
    }

    pub fn invoking(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// Named operation bound to a lifecycle method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub method: String,
}

impl Operation {
    pub fn new(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
        }
    }
}

/// Builder-side description of one state and its children
#[derive(Debug, Clone, Default)]
pub struct State {
    name: String,
    terminal: bool,
    transitions: Vec<Transition>,
    operations: Vec<Operation>,
    initialization: Option<Trigger>,
    termination: Option<Trigger>,
    children: Vec<State>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn on_initialize(mut self, trigger: Trigger) -> Self {
        self.initialization = Some(trigger);
        self
    }

    pub fn on_terminate(mut self, trigger: Trigger) -> Self {
        self.termination = Some(trigger);
        self
    }

    pub fn state(mut self, child: State) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StateNode {
    pub name: String,
    pub path: String,
    pub parent: Option<usize>,
    pub terminal: bool,
    pub transitions: Vec<Transition>,
    pub operations: Vec<Operation>,
    pub initialization: Option<Trigger>,
    pub termination: Option<Trigger>,
}

/// Immutable, validated state graph
///
/// # Examples
///
/// ```rust
/// use ferrous_metro::{State, StateGraph, Transition, Trigger};
///
/// let graph = StateGraph::build(
///     State::new("root")
///         .on_initialize(Trigger::Apply("start".into()))
///         .transition(Transition::new("start", "started"))
///         .state(State::new("started")),
/// )
/// .unwrap();
///
/// assert_eq!(graph.path_of("started"), Some("/started"));
/// ```
#[derive(Debug, Clone)]
pub struct StateGraph {
    nodes: Vec<StateNode>,
}

impl Default for StateGraph {
    fn default() -> Self {
        Self {
            nodes: vec![StateNode {
                name: "root".to_string(),
                path: "/".to_string(),
                parent: None,
                terminal: false,
                transitions: Vec::new(),
                operations: Vec::new(),
                initialization: None,
                termination: None,
            }],
        }
    }
}

impl StateGraph {
    /// Flattens and validates a state tree.
    ///
    /// State names must be unique across the graph and every transition
    /// target must name an existing state.
    pub fn build(root: State) -> ControlResult<StateGraph> {
        let mut nodes = Vec::new();
        flatten(root, None, &mut nodes);

        let mut names = HashSet::new();
        for node in &nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ControlError::IllegalState(format!(
                    "duplicate state name [{}] in state graph",
                    node.name
                )));
            }
        }

        let graph = StateGraph { nodes };
        for node in &graph.nodes {
            for transition in &node.transitions {
                if graph.resolve(&transition.target).is_none() {
                    return Err(ControlError::IllegalState(format!(
                        "transition [{}] in state [{}] targets unknown state [{}]",
                        transition.name, node.path, transition.target
                    )));
                }
            }
        }
        Ok(graph)
    }

    pub(crate) const ROOT: usize = 0;

    pub(crate) fn node(&self, index: usize) -> &StateNode {
        &self.nodes[index]
    }

    /// Resolves a state by absolute path or by name.
    pub(crate) fn resolve(&self, target: &str) -> Option<usize> {
        if target.starts_with('/') {
            self.nodes.iter().position(|n| n.path == target)
        } else {
            self.nodes.iter().position(|n| n.name == target)
        }
    }

    /// Returns the absolute path of the named state.
    pub fn path_of(&self, name: &str) -> Option<&str> {
        self.resolve(name).map(|i| self.nodes[i].path.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn ancestry(&self, index: usize) -> impl Iterator<Item = &StateNode> + '_ {
        let mut next = Some(index);
        std::iter::from_fn(move || {
            let current = next?;
            let node = &self.nodes[current];
            next = node.parent;
            Some(node)
        })
    }

    pub(crate) fn find_transition(&self, index: usize, name: &str) -> Option<&Transition> {
        self.ancestry(index)
            .find_map(|n| n.transitions.iter().find(|t| t.name == name))
    }

    pub(crate) fn find_operation(&self, index: usize, name: &str) -> Option<&Operation> {
        self.ancestry(index)
            .find_map(|n| n.operations.iter().find(|o| o.name == name))
    }

    pub(crate) fn termination_for(&self, index: usize) -> Option<&Trigger> {
        self.ancestry(index).find_map(|n| n.termination.as_ref())
    }

    pub(crate) fn transitions_from(&self, index: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ancestry(index)
            .flat_map(|n| n.transitions.iter())
            .filter(|t| seen.insert(t.name.clone()))
            .map(|t| t.name.clone())
            .collect()
    }

    pub(crate) fn operations_from(&self, index: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ancestry(index)
            .flat_map(|n| n.operations.iter())
            .filter(|o| seen.insert(o.name.clone()))
            .map(|o| o.name.clone())
            .collect()
    }
}

fn flatten(state: State, parent: Option<usize>, nodes: &mut Vec<StateNode>) {
    let path = match parent {
        None => "/".to_string(),
        Some(p) if nodes[p].path == "/" => format!("/{}", state.name),
        Some(p) => format!("{}/{}", nodes[p].path, state.name),
    };
    let index = nodes.len();
    nodes.push(StateNode {
        name: state.name,
        path,
        parent,
        terminal: state.terminal,
        transitions: state.transitions,
        operations: state.operations,
        initialization: state.initialization,
        termination: state.termination,
    });
    for child in state.children {
        flatten(child, Some(index), nodes);
    }
}
