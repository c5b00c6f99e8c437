//! Artifacts, repositories and class loader chains.
//!
//! Implementation classes are published as [`Type`]s inside artifacts. A
//! [`Repository`] resolves artifact URIs; a [`ClassLoader`] makes the
//! types of a set of artifacts visible, delegating to its parent first.
//! [`compose`] builds one loader tier per classpath category on top of an
//! anchor loader, skipping URIs an ancestor already provides.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::directive::{Category, Classpath, ComponentDirective};
use crate::error::{ControlError, ControlResult};
use crate::info::Type;

/// A named bundle of component types
#[derive(Debug)]
pub struct Artifact {
    uri: String,
    types: HashMap<String, Arc<Type>>,
}

impl Artifact {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            types: HashMap::new(),
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.types.insert(ty.classname().to_string(), Arc::new(ty));
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn get(&self, classname: &str) -> Option<&Arc<Type>> {
        self.types.get(classname)
    }

    pub fn classnames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Resolves artifact URIs (and optionally directive URIs)
pub trait Repository: Send + Sync {
    fn resolve(&self, uri: &str) -> ControlResult<Arc<Artifact>>;

    /// Directive published under a URI, if the repository knows one.
    fn directive(&self, _uri: &str) -> Option<ComponentDirective> {
        None
    }
}

/// In-process repository
#[derive(Default)]
pub struct MemoryRepository {
    artifacts: RwLock<HashMap<String, Arc<Artifact>>>,
    directives: RwLock<HashMap<String, ComponentDirective>>,
}

impl fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("artifacts", &self.artifacts.read().keys().collect::<Vec<_>>())
            .field("directives", &self.directives.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_artifact(&self, artifact: Artifact) -> Arc<Artifact> {
        let artifact = Arc::new(artifact);
        self.artifacts
            .write()
            .insert(artifact.uri().to_string(), artifact.clone());
        artifact
    }

    pub fn add_directive(&self, uri: impl Into<String>, directive: ComponentDirective) {
        self.directives.write().insert(uri.into(), directive);
    }
}

impl Repository for MemoryRepository {
    fn resolve(&self, uri: &str) -> ControlResult<Arc<Artifact>> {
        self.artifacts
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| ControlError::ArtifactNotFound(uri.to_string()))
    }

    fn directive(&self, uri: &str) -> Option<ComponentDirective> {
        self.directives.read().get(uri).cloned()
    }
}

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONTEXT_LOADER: RefCell<Option<ClassLoader>> = const { RefCell::new(None) };
}

/// One tier of a parent-first class loader chain
#[derive(Clone)]
pub struct ClassLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    id: u64,
    name: String,
    uris: Vec<String>,
    artifacts: Vec<Arc<Artifact>>,
    parent: Option<ClassLoader>,
}

impl fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

impl PartialEq for ClassLoader {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ClassLoader {}

impl ClassLoader {
    /// Empty root loader.
    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name, None, Vec::new())
    }

    pub fn new(name: impl Into<String>, parent: Option<&ClassLoader>, artifacts: Vec<Arc<Artifact>>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                uris: artifacts.iter().map(|a| a.uri().to_string()).collect(),
                artifacts,
                parent: parent.cloned(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&ClassLoader> {
        self.inner.parent.as_ref()
    }

    /// URIs loaded by this tier only.
    pub fn uris(&self) -> &[String] {
        &self.inner.uris
    }

    fn chain(&self) -> impl Iterator<Item = &ClassLoader> + '_ {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent();
            Some(current)
        })
    }

    /// True when this tier or an ancestor already loads `uri`.
    pub fn contains_uri(&self, uri: &str) -> bool {
        self.chain().any(|l| l.inner.uris.iter().any(|u| u == uri))
    }

    /// True when `other` is this loader or one of its ancestors.
    pub fn descends_from(&self, other: &ClassLoader) -> bool {
        self.chain().any(|l| l == other)
    }

    /// Loads a type, consulting the parent chain first.
    pub fn load_class(&self, classname: &str) -> ControlResult<Arc<Type>> {
        self.find_class(classname).ok_or_else(|| ControlError::ClassNotFound {
            classname: classname.to_string(),
            loader: self.identity(),
        })
    }

    fn find_class(&self, classname: &str) -> Option<Arc<Type>> {
        if let Some(found) = self.parent().and_then(|p| p.find_class(classname)) {
            return Some(found);
        }
        self.inner
            .artifacts
            .iter()
            .find_map(|artifact| artifact.get(classname).cloned())
    }

    /// Chain rendered innermost first, for diagnostics.
    pub fn identity(&self) -> String {
        self.chain()
            .map(|l| format!("[{}#{}]", l.inner.name, l.inner.id))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Runs `f` with this loader installed as the thread's context loader.
    pub fn with_context<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore(Option<ClassLoader>);

        impl Drop for Restore {
            fn drop(&mut self) {
                let previous = self.0.take();
                CONTEXT_LOADER.with(|slot| *slot.borrow_mut() = previous);
            }
        }

        let previous = CONTEXT_LOADER.with(|slot| slot.borrow_mut().replace(self.clone()));
        let _restore = Restore(previous);
        f()
    }

    /// The calling thread's context loader, if one is installed.
    pub fn context() -> Option<ClassLoader> {
        CONTEXT_LOADER.with(|slot| slot.borrow().clone())
    }
}

/// Builds a loader chain for `classpath` on top of `anchor`.
///
/// Each non-empty category adds one tier, outermost category first. URIs
/// already visible through the chain are dropped so no artifact is defined
/// twice.
pub fn compose(
    anchor: &ClassLoader,
    classpath: &Classpath,
    repository: &dyn Repository,
    name: &str,
) -> ControlResult<ClassLoader> {
    let mut current = anchor.clone();
    for category in Category::ALL {
        let mut uris: Vec<&String> = Vec::new();
        for uri in classpath.uris(category) {
            if !current.contains_uri(uri) && !uris.contains(&uri) {
                uris.push(uri);
            }
        }
        if uris.is_empty() {
            continue;
        }
        let artifacts = uris
            .into_iter()
            .map(|uri| repository.resolve(uri))
            .collect::<ControlResult<Vec<_>>>()?;
        current = ClassLoader::new(format!("{}:{}", name, category.as_str()), Some(&current), artifacts);
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.add_artifact(Artifact::new("artifact:api").with_type(Type::builder("acme.Api").build()));
        repo.add_artifact(
            Artifact::new("artifact:impl")
                .with_type(Type::builder("acme.Impl").build())
                .with_type(Type::builder("acme.Api").name("shadow").build()),
        );
        repo
    }

    #[test]
    fn test_parent_first_delegation() {
        let repo = repository();
        let classpath = Classpath::new()
            .with(Category::Public, "artifact:api")
            .with(Category::Private, "artifact:impl");
        let loader = compose(&ClassLoader::root("system"), &classpath, &repo, "demo").unwrap();

        assert_eq!(loader.load_class("acme.Api").unwrap().info().name, "api");
        assert!(loader.load_class("acme.Impl").is_ok());
        assert!(matches!(loader.load_class("acme.Missing"), Err(ControlError::ClassNotFound { .. })));
    }

    #[test]
    fn test_composition_skips_ancestor_uris() {
        let repo = repository();
        let root = compose(&ClassLoader::root("system"), &Classpath::private("artifact:api"), &repo, "parent").unwrap();
        let classpath = Classpath::new()
            .with(Category::Public, "artifact:api")
            .with(Category::Private, "artifact:impl");
        let child = compose(&root, &classpath, &repo, "child").unwrap();

        assert_eq!(child.uris(), ["artifact:impl".to_string()]);
        assert_eq!(child.parent(), Some(&root));
        assert!(child.descends_from(&root));
        assert!(child.contains_uri("artifact:api"));

        let same = compose(&root, &Classpath::private("artifact:api"), &repo, "noop").unwrap();
        assert_eq!(same, root);
    }

    #[test]
    fn test_unknown_artifact_fails() {
        let repo = repository();
        let result = compose(&ClassLoader::root("system"), &Classpath::private("artifact:nope"), &repo, "x");
        assert!(matches!(result, Err(ControlError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_context_loader_is_scoped() {
        let loader = ClassLoader::root("ctx");
        assert!(ClassLoader::context().is_none());
        let inside = loader.with_context(|| ClassLoader::context());
        assert_eq!(inside, Some(loader));
        assert!(ClassLoader::context().is_none());
    }
}
