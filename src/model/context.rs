//! Context models: the entry-to-directive map of one component.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::directive::EntryDirective;
use crate::info::EntryDescriptor;

/// Mutable map from context keys to their directives
///
/// Any change marks the model dirty; the owning handler re-validates a
/// dirty model before producing its next provider.
#[derive(Debug)]
pub struct ContextModel {
    descriptors: Vec<EntryDescriptor>,
    directives: RwLock<HashMap<String, EntryDirective>>,
    dirty: AtomicBool,
}

impl ContextModel {
    pub(crate) fn new(descriptors: Vec<EntryDescriptor>, directives: HashMap<String, EntryDirective>) -> Self {
        Self {
            descriptors,
            directives: RwLock::new(directives),
            dirty: AtomicBool::new(false),
        }
    }

    /// Entries declared by the component type.
    pub fn descriptors(&self) -> &[EntryDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, key: &str) -> Option<&EntryDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn entry_directive(&self, key: &str) -> Option<EntryDirective> {
        self.directives.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.key.clone()).collect()
    }

    /// Replaces (or with `None` removes) the directive for `key`.
    ///
    /// Returns the previous directive.
    pub(crate) fn set_entry_directive(&self, key: &str, directive: Option<EntryDirective>) -> Option<EntryDirective> {
        let previous = {
            let mut directives = self.directives.write();
            match directive {
                Some(directive) => directives.insert(key.to_string(), directive),
                None => directives.remove(key),
            }
        };
        self.dirty.store(true, Ordering::Release);
        previous
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Problems preventing resolution, one message per issue.
    ///
    /// Every required entry needs a directive; every directive must name a
    /// declared entry.
    pub fn validate(&self) -> Vec<String> {
        let directives = self.directives.read();
        let mut issues: Vec<String> = self
            .descriptors
            .iter()
            .filter(|d| d.required && !directives.contains_key(&d.key))
            .map(|d| format!("required context entry [{}] has no directive", d.key))
            .collect();
        let mut unknown: Vec<&String> = directives
            .keys()
            .filter(|k| self.descriptor(k).is_none())
            .collect();
        unknown.sort();
        issues.extend(
            unknown
                .into_iter()
                .map(|k| format!("context directive [{}] does not match a declared entry", k)),
        );
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::ValueDirective;

    #[test]
    fn test_required_entries_need_directives() {
        let model = ContextModel::new(
            vec![
                EntryDescriptor::required("name", "string"),
                EntryDescriptor::optional("port", "int"),
            ],
            HashMap::new(),
        );
        let issues = model.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("[name]"));

        model.set_entry_directive("name", Some(EntryDirective::Value(ValueDirective::new("demo"))));
        assert!(model.is_dirty());
        assert!(model.validate().is_empty());
        model.mark_clean();
        assert!(!model.is_dirty());
    }

    #[test]
    fn test_unknown_directive_reported() {
        let mut directives = HashMap::new();
        directives.insert("colour".to_string(), EntryDirective::Value(ValueDirective::new("red")));
        let model = ContextModel::new(Vec::new(), directives);
        assert_eq!(model.validate().len(), 1);
    }
}
