//! Component logging channels.
//!
//! Every component receives a [`Logger`] named after its context path with
//! `/` replaced by `.`. Effective levels are looked up in the runtime's
//! [`LoggingLevels`] registry by longest dotted prefix, so a category
//! directive on a component also governs its sub-categories. Records are
//! emitted as `tracing` events carrying the category as a field.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::policy::Priority;

/// Hierarchical level registry shared by all loggers of a runtime
#[derive(Debug)]
pub struct LoggingLevels {
    default: Priority,
    levels: RwLock<HashMap<String, Priority>>,
}

impl LoggingLevels {
    pub fn new(default: Priority) -> Self {
        Self {
            default,
            levels: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the level for a category and everything beneath it.
    pub fn set(&self, category: impl Into<String>, priority: Priority) {
        self.levels.write().insert(category.into(), priority);
    }

    /// Removes an explicit level.
    pub fn clear(&self, category: &str) {
        self.levels.write().remove(category);
    }

    /// Effective level of a category.
    pub fn level(&self, category: &str) -> Priority {
        let levels = self.levels.read();
        let mut candidate = category;
        loop {
            if let Some(priority) = levels.get(candidate) {
                return *priority;
            }
            match candidate.rfind('.') {
                Some(index) => candidate = &candidate[..index],
                None => return self.default,
            }
        }
    }
}

impl Default for LoggingLevels {
    fn default() -> Self {
        Self::new(Priority::Info)
    }
}

/// Converts a context path into a logging category.
pub fn category_for_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

/// Leveled logging channel bound to one category
#[derive(Clone)]
pub struct Logger {
    category: Arc<str>,
    levels: Arc<LoggingLevels>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("category", &self.category).finish()
    }
}

impl Logger {
    pub fn new(category: impl Into<String>, levels: Arc<LoggingLevels>) -> Self {
        let category: String = category.into();
        Self {
            category: Arc::from(category),
            levels,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Returns a logger for a sub-category.
    pub fn child(&self, name: &str) -> Logger {
        Logger {
            category: Arc::from(format!("{}.{}", self.category, name)),
            levels: self.levels.clone(),
        }
    }

    pub fn is_enabled(&self, priority: Priority) -> bool {
        priority >= self.levels.level(&self.category)
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.is_enabled(Priority::Debug)
    }

    pub fn trace(&self, message: impl fmt::Display) {
        if self.is_enabled(Priority::Trace) {
            tracing::trace!(category = %self.category, "{}", message);
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.is_enabled(Priority::Debug) {
            tracing::debug!(category = %self.category, "{}", message);
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        if self.is_enabled(Priority::Info) {
            tracing::info!(category = %self.category, "{}", message);
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        if self.is_enabled(Priority::Warn) {
            tracing::warn!(category = %self.category, "{}", message);
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        if self.is_enabled(Priority::Error) {
            tracing::error!(category = %self.category, "{}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_inherit_by_prefix() {
        let levels = Arc::new(LoggingLevels::new(Priority::Warn));
        levels.set("app.server", Priority::Debug);

        assert_eq!(levels.level("app"), Priority::Warn);
        assert_eq!(levels.level("app.server"), Priority::Debug);
        assert_eq!(levels.level("app.server.http"), Priority::Debug);
        assert_eq!(levels.level("app.serverless"), Priority::Warn);

        let logger = Logger::new("app.server", levels.clone()).child("http");
        assert_eq!(logger.category(), "app.server.http");
        assert!(logger.is_debug_enabled());
        assert!(!logger.is_enabled(Priority::Trace));

        levels.clear("app.server");
        assert!(!logger.is_debug_enabled());
    }

    #[test]
    fn test_category_for_path() {
        assert_eq!(category_for_path("/app/server"), "app.server");
        assert_eq!(category_for_path("/"), "root");
    }
}
