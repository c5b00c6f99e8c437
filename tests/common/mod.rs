//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ferrous_metro::{
    Arguments, Artifact, ClassLoader, Controller, LifecycleObserver, MemoryRepository, RuntimeConfig, State,
    StateGraph, Transition, Trigger, Type, TypeBuilder,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

pub fn count(journal: &Journal, entry: &str) -> usize {
    journal.lock().unwrap().iter().filter(|e| *e == entry).count()
}

pub fn position(journal: &Journal, entry: &str) -> usize {
    journal
        .lock()
        .unwrap()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("journal has no entry [{}]", entry))
}

static SERIAL: AtomicUsize = AtomicUsize::new(1);

/// Plain component recording its lifecycle into a journal
pub struct Widget {
    pub classname: String,
    pub serial: usize,
    journal: Journal,
}

impl Widget {
    pub fn record(&self, event: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", event, self.classname));
    }
}

/// `root --start--> started --stop--> stopped (terminal)`, driven by the
/// initialization and termination triggers.
pub fn lifecycle_graph() -> StateGraph {
    StateGraph::build(
        State::new("root")
            .on_initialize(Trigger::Apply("start".into()))
            .transition(Transition::new("start", "started").invoking("start"))
            .state(
                State::new("started")
                    .on_terminate(Trigger::Apply("stop".into()))
                    .transition(Transition::new("stop", "stopped").invoking("stop")),
            )
            .state(State::new("stopped").terminal()),
    )
    .unwrap()
}

/// Type building a [`Widget`], journaling `create`, `start` and `stop`.
pub fn widget(classname: &str, journal: &Journal) -> TypeBuilder {
    let recorder = journal.clone();
    let name = classname.to_string();
    Type::builder(classname)
        .constructor(vec![], move |_args: Arguments| {
            recorder.lock().unwrap().push(format!("create:{}", name));
            Ok(Widget {
                classname: name.clone(),
                serial: SERIAL.fetch_add(1, Ordering::SeqCst),
                journal: recorder.clone(),
            })
        })
        .method("start", |w: &Widget| {
            w.record("start");
            Ok(())
        })
        .method("stop", |w: &Widget| {
            w.record("stop");
            Ok(())
        })
        .states(lifecycle_graph())
}

/// Type whose constructor always fails.
pub fn broken(classname: &str, journal: &Journal) -> TypeBuilder {
    let recorder = journal.clone();
    let name = classname.to_string();
    Type::builder(classname).constructor(vec![], move |_args: Arguments| -> Result<Widget, ferrous_metro::BoxError> {
        recorder.lock().unwrap().push(format!("fail:{}", name));
        Err(format!("{} refused to start", name).into())
    })
}

/// Controller over one in-memory artifact visible from the anchor loader
pub struct Fixture {
    artifact: Artifact,
    config: RuntimeConfig,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            artifact: Artifact::new("artifact:app"),
            config: RuntimeConfig::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.artifact = self.artifact.with_type(ty);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Controller {
        let repository = Arc::new(MemoryRepository::new());
        let artifact = repository.add_artifact(self.artifact);
        let mut builder = Controller::builder()
            .repository(repository)
            .anchor(ClassLoader::new("app", None, vec![artifact]))
            .config(self.config);
        for observer in self.observers {
            builder = builder.observer(observer);
        }
        builder.build()
    }
}
