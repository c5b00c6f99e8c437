//! Per-provider state machine.
//!
//! Drives one instance through its type's [`StateGraph`]. Transition and
//! operation lookups walk from the current state up to the root, so a
//! transition declared on `/started` is also available from
//! `/started/busy`. All mutation happens under one re-entrant lock: a
//! lifecycle method may consult the machine's state, but two threads never
//! interleave transitions on the same instance.

use std::cell::Cell;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::{ControlError, ControlResult};
use crate::info::{AnyArc, StateGraph, Trigger, Type};

/// Snapshot of the current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub name: String,
    pub path: String,
    pub terminal: bool,
}

/// A completed state change, as reported to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StateChange {
    pub old: String,
    pub new: String,
}

/// Borrowed view of the instance a machine drives
pub(crate) struct Target<'a> {
    pub instance: &'a AnyArc,
    pub ty: &'a Type,
    pub path: &'a str,
}

pub(crate) struct StateMachine {
    graph: Arc<StateGraph>,
    current: ReentrantMutex<Cell<usize>>,
    disposed: AtomicBool,
}

impl StateMachine {
    pub(crate) fn new(graph: Arc<StateGraph>) -> Self {
        Self {
            graph,
            current: ReentrantMutex::new(Cell::new(StateGraph::ROOT)),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> StateInfo {
        let current = self.current.lock();
        let node = self.graph.node(current.get());
        StateInfo {
            name: node.name.clone(),
            path: node.path.clone(),
            terminal: node.terminal,
        }
    }

    pub(crate) fn transitions(&self) -> Vec<String> {
        let current = self.current.lock();
        self.graph.transitions_from(current.get())
    }

    pub(crate) fn operations(&self) -> Vec<String> {
        let current = self.current.lock();
        self.graph.operations_from(current.get())
    }

    /// Follows initialization triggers from the current state.
    ///
    /// Each state's trigger fires at most once per call, so a graph whose
    /// initialization transitions form a loop settles instead of spinning.
    pub(crate) fn initialize(&self, target: &Target<'_>) -> ControlResult<Vec<StateChange>> {
        self.ensure_live()?;
        let current = self.current.lock();
        self.follow(&current, target, |graph, index| graph.node(index).initialization.clone())
    }

    /// Follows termination triggers, inherited from ancestors when a state declares none.
    pub(crate) fn terminate(&self, target: &Target<'_>) -> ControlResult<Vec<StateChange>> {
        self.ensure_live()?;
        let current = self.current.lock();
        self.follow(&current, target, |graph, index| graph.termination_for(index).cloned())
    }

    pub(crate) fn apply(&self, name: &str, target: &Target<'_>) -> ControlResult<StateChange> {
        self.ensure_live()?;
        let current = self.current.lock();
        self.apply_locked(&current, name, target)
    }

    pub(crate) fn exec(&self, name: &str, target: &Target<'_>) -> ControlResult<()> {
        self.ensure_live()?;
        let current = self.current.lock();
        self.exec_locked(&current, name, target)
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn ensure_live(&self) -> ControlResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ControlError::IllegalState("state machine has been disposed".to_string()));
        }
        Ok(())
    }

    fn follow<F>(&self, current: &Cell<usize>, target: &Target<'_>, trigger_for: F) -> ControlResult<Vec<StateChange>>
    where
        F: Fn(&StateGraph, usize) -> Option<Trigger>,
    {
        let mut visited = HashSet::new();
        let mut changes = Vec::new();
        loop {
            let index = current.get();
            if !visited.insert(index) || self.graph.node(index).terminal {
                break;
            }
            match trigger_for(&self.graph, index) {
                Some(Trigger::Apply(name)) => changes.push(self.apply_locked(current, &name, target)?),
                Some(Trigger::Exec(name)) => self.exec_locked(current, &name, target)?,
                None => break,
            }
        }
        Ok(changes)
    }

    fn apply_locked(&self, current: &Cell<usize>, name: &str, target: &Target<'_>) -> ControlResult<StateChange> {
        let index = current.get();
        let node = self.graph.node(index);
        if node.terminal {
            return Err(ControlError::IllegalState(format!(
                "state [{}] is terminal; transition [{}] rejected",
                node.path, name
            )));
        }
        let transition = self
            .graph
            .find_transition(index, name)
            .ok_or_else(|| ControlError::UnknownTransition {
                name: name.to_string(),
                state: node.path.clone(),
            })?;
        let next = self.graph.resolve(&transition.target).ok_or_else(|| {
            ControlError::IllegalState(format!("transition [{}] targets unknown state [{}]", name, transition.target))
        })?;
        if let Some(method) = &transition.method {
            invoke(method, target)?;
        }
        current.set(next);
        Ok(StateChange {
            old: node.path.clone(),
            new: self.graph.node(next).path.clone(),
        })
    }

    fn exec_locked(&self, current: &Cell<usize>, name: &str, target: &Target<'_>) -> ControlResult<()> {
        let index = current.get();
        let operation = self
            .graph
            .find_operation(index, name)
            .ok_or_else(|| ControlError::UnknownOperation {
                name: name.to_string(),
                state: self.graph.node(index).path.clone(),
            })?;
        invoke(&operation.method, target)
    }
}

fn invoke(method: &str, target: &Target<'_>) -> ControlResult<()> {
    let function = target
        .ty
        .method(method)
        .ok_or_else(|| ControlError::NoSuchMethod(format!("{}#{}", target.ty.classname(), method)))?;
    // a panicking method must not unwind through provider disposal
    match panic::catch_unwind(AssertUnwindSafe(|| function(target.instance))) {
        Ok(result) => result.map_err(|e| ControlError::invocation(target.path, e)),
        Err(payload) => Err(ControlError::panicked(target.path, method, payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{Operation, State, Transition};
    use std::sync::Mutex;

    struct Engine {
        log: Mutex<Vec<&'static str>>,
    }

    fn engine_type() -> Type {
        let graph = StateGraph::build(
            State::new("root")
                .on_initialize(Trigger::Apply("start".into()))
                .transition(Transition::new("start", "started").invoking("start"))
                .state(
                    State::new("started")
                        .on_terminate(Trigger::Apply("stop".into()))
                        .transition(Transition::new("stop", "stopped").invoking("stop"))
                        .operation(Operation::new("ping", "ping")),
                )
                .state(State::new("stopped").terminal()),
        )
        .unwrap();
        Type::builder("acme.Engine")
            .states(graph)
            .method("start", |e: &Engine| {
                e.log.lock().unwrap().push("start");
                Ok(())
            })
            .method("stop", |e: &Engine| {
                e.log.lock().unwrap().push("stop");
                Ok(())
            })
            .method("ping", |e: &Engine| {
                e.log.lock().unwrap().push("ping");
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_initialize_exec_terminate() {
        let ty = engine_type();
        let engine = Arc::new(Engine { log: Mutex::new(Vec::new()) });
        let instance: AnyArc = engine.clone();
        let target = Target {
            instance: &instance,
            ty: &ty,
            path: "/engine",
        };
        let machine = StateMachine::new(ty.state_graph().clone());

        let changes = machine.initialize(&target).unwrap();
        assert_eq!(changes, vec![StateChange { old: "/".into(), new: "/started".into() }]);
        machine.exec("ping", &target).unwrap();

        let changes = machine.terminate(&target).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(machine.state().terminal);
        assert_eq!(*engine.log.lock().unwrap(), vec!["start", "ping", "stop"]);

        assert!(matches!(machine.apply("start", &target), Err(ControlError::IllegalState(_))));
    }

    #[test]
    fn test_unknown_names_rejected() {
        let ty = engine_type();
        let instance: AnyArc = Arc::new(Engine { log: Mutex::new(Vec::new()) });
        let target = Target {
            instance: &instance,
            ty: &ty,
            path: "/engine",
        };
        let machine = StateMachine::new(ty.state_graph().clone());
        assert!(matches!(machine.apply("stop", &target), Err(ControlError::UnknownTransition { .. })));
        assert!(matches!(machine.exec("ping", &target), Err(ControlError::UnknownOperation { .. })));
        assert_eq!(machine.state().path, "/");

        machine.dispose();
        assert!(machine.apply("start", &target).is_err());
    }

    #[test]
    fn test_panicking_method_becomes_invocation_failure() {
        let graph = StateGraph::build(
            State::new("root")
                .transition(Transition::new("stop", "stopped").invoking("stop"))
                .state(State::new("stopped").terminal()),
        )
        .unwrap();
        let ty = Type::builder("acme.Jammed")
            .states(graph)
            .method("stop", |_: &Engine| -> Result<(), crate::error::BoxError> { panic!("gears jammed") })
            .build();
        let instance: AnyArc = Arc::new(Engine { log: Mutex::new(Vec::new()) });
        let target = Target {
            instance: &instance,
            ty: &ty,
            path: "/jammed",
        };
        let machine = StateMachine::new(ty.state_graph().clone());

        match machine.apply("stop", &target) {
            Err(ControlError::Invocation { path, source }) => {
                assert_eq!(path, "/jammed");
                assert!(source.to_string().contains("gears jammed"));
            }
            other => panic!("expected an invocation failure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(machine.state().path, "/");
    }
}
