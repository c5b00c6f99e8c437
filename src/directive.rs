//! Immutable component directives.
//!
//! Directives are the declarative input to the runtime: what class to
//! instantiate, which policies apply, how each context entry is solved and
//! which named parts nest inside the component. They are decoded from JSON
//! with serde or assembled with the builder methods below, and never
//! mutated by the runtime.

use serde::{Deserialize, Serialize};

use crate::policy::{ActivationPolicy, CollectionPolicy, LifestylePolicy, Priority};

/// Declarative description of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDirective {
    pub name: String,
    pub classname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifestyle: Option<LifestylePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionPolicy>,
    #[serde(default)]
    pub classpath: Classpath,
    #[serde(default)]
    pub context: Vec<ContextEntry>,
    #[serde(default)]
    pub parts: Vec<PartReference>,
    #[serde(default)]
    pub categories: Vec<CategoryDirective>,
}

impl ComponentDirective {
    pub fn new(name: impl Into<String>, classname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classname: classname.into(),
            activation: None,
            lifestyle: None,
            collection: None,
            classpath: Classpath::default(),
            context: Vec::new(),
            parts: Vec::new(),
            categories: Vec::new(),
        }
    }

    pub fn activation(mut self, policy: ActivationPolicy) -> Self {
        self.activation = Some(policy);
        self
    }

    pub fn lifestyle(mut self, policy: LifestylePolicy) -> Self {
        self.lifestyle = Some(policy);
        self
    }

    pub fn collection(mut self, policy: CollectionPolicy) -> Self {
        self.collection = Some(policy);
        self
    }

    pub fn classpath(mut self, classpath: Classpath) -> Self {
        self.classpath = classpath;
        self
    }

    /// Adds a literal context value.
    pub fn value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entry(key, EntryDirective::Value(ValueDirective::new(value)))
    }

    /// Adds a service lookup context entry.
    pub fn lookup(self, key: impl Into<String>, service: impl Into<String>) -> Self {
        self.entry(key, EntryDirective::Lookup(LookupDirective::new(service)))
    }

    /// Adds a nested component context entry.
    pub fn component(self, key: impl Into<String>, directive: ComponentDirective) -> Self {
        self.entry(key, EntryDirective::Component(Box::new(directive)))
    }

    pub fn entry(mut self, key: impl Into<String>, directive: EntryDirective) -> Self {
        self.context.push(ContextEntry {
            key: key.into(),
            directive,
        });
        self
    }

    pub fn part(mut self, key: impl Into<String>, directive: ComponentDirective) -> Self {
        self.parts.push(PartReference::new(key, directive));
        self
    }

    pub fn category(mut self, name: impl Into<String>, priority: Priority) -> Self {
        self.categories.push(CategoryDirective {
            name: name.into(),
            priority,
        });
        self
    }
}

/// Keyed context entry directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub directive: EntryDirective,
}

/// How a context entry is solved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntryDirective {
    /// Literal expression converted to the entry's target type
    Value(ValueDirective),
    /// Service search delegated to the enclosing component chain
    Lookup(LookupDirective),
    /// Nested component whose live value becomes the entry
    Component(Box<ComponentDirective>),
}

impl EntryDirective {
    pub fn kind(&self) -> &'static str {
        match self {
            EntryDirective::Value(_) => "value",
            EntryDirective::Lookup(_) => "lookup",
            EntryDirective::Component(_) => "component",
        }
    }
}

/// Literal value; `${symbol}` references are expanded before conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub value: String,
}

impl ValueDirective {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            target: None,
            value: value.into(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Service lookup expressed as `classname` or `classname#version`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupDirective {
    pub service: String,
}

impl LookupDirective {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }
}

/// Named child component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartReference {
    pub key: String,
    pub directive: ComponentDirective,
}

impl PartReference {
    pub fn new(key: impl Into<String>, directive: ComponentDirective) -> Self {
        Self {
            key: key.into(),
            directive,
        }
    }
}

/// Logging level for a named sub-category of the component logger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDirective {
    pub name: String,
    pub priority: Priority,
}

/// Artifact URIs grouped by visibility tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classpath {
    #[serde(default)]
    pub system: Vec<String>,
    #[serde(default)]
    pub public: Vec<String>,
    #[serde(default)]
    pub protected: Vec<String>,
    #[serde(default)]
    pub private: Vec<String>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a classpath with a single private artifact.
    pub fn private(uri: impl Into<String>) -> Self {
        Self {
            private: vec![uri.into()],
            ..Self::default()
        }
    }

    pub fn with(mut self, category: Category, uri: impl Into<String>) -> Self {
        self.uris_mut(category).push(uri.into());
        self
    }

    pub fn uris(&self, category: Category) -> &[String] {
        match category {
            Category::System => &self.system,
            Category::Public => &self.public,
            Category::Protected => &self.protected,
            Category::Private => &self.private,
        }
    }

    fn uris_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::System => &mut self.system,
            Category::Public => &mut self.public,
            Category::Protected => &mut self.protected,
            Category::Private => &mut self.private,
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.uris(*c).is_empty())
    }
}

/// Classpath visibility tier, outermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    System,
    Public,
    Protected,
    Private,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::System, Category::Public, Category::Protected, Category::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Public => "public",
            Category::Protected => "protected",
            Category::Private => "private",
        }
    }
}
