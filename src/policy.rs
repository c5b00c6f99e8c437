//! Activation, lifestyle and collection policies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// When a component instance is created
///
/// - **Startup**: eagerly, while the handler is commissioned
/// - **Demand**: lazily, on the first provider request
/// - **System**: deferred to the runtime configuration default
///
/// # Examples
///
/// ```rust
/// use ferrous_metro::ActivationPolicy;
///
/// let policy = ActivationPolicy::System.resolve(ActivationPolicy::Demand);
/// assert_eq!(policy, ActivationPolicy::Demand);
/// assert_eq!(ActivationPolicy::Startup.resolve(ActivationPolicy::Demand), ActivationPolicy::Startup);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPolicy {
    /// Instantiate while commissioning
    Startup,
    /// Instantiate on first request
    Demand,
    /// Use the runtime default
    System,
}

impl ActivationPolicy {
    /// Resolves `System` against the supplied default.
    pub fn resolve(self, default: ActivationPolicy) -> ActivationPolicy {
        match self {
            ActivationPolicy::System => match default {
                ActivationPolicy::System => ActivationPolicy::Demand,
                other => other,
            },
            other => other,
        }
    }
}

/// Instance cardinality rule
///
/// Selects the holder a component handler uses to map provider requests to
/// live instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifestylePolicy {
    /// Zero or one instance shared by every caller
    ///
    /// Retention follows the component's collection policy, so an idle
    /// singleton may be reclaimed and transparently re-created.
    Singleton,
    /// A new instance per provider request
    ///
    /// Instances are tracked weakly for disposal only, never reused.
    Transient,
    /// Zero or one instance per calling thread
    ///
    /// Each thread's instance is disposed when that thread exits.
    Thread,
}

/// Reference strength used to retain a singleton instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionPolicy {
    /// Retained until the handler is decommissioned
    Hard,
    /// Retained until the runtime reclaims idle instances
    Soft,
    /// Retained only while a caller holds the provider
    Weak,
    /// Hard at the root of a component tree, soft when nested
    System,
}

impl CollectionPolicy {
    /// Resolves `System` to the configured root or nested strength.
    pub fn resolve(self, has_parent: bool, root: CollectionPolicy, nested: CollectionPolicy) -> CollectionPolicy {
        match self {
            CollectionPolicy::System => {
                let chosen = if has_parent { nested } else { root };
                match chosen {
                    CollectionPolicy::System if has_parent => CollectionPolicy::Soft,
                    CollectionPolicy::System => CollectionPolicy::Hard,
                    other => other,
                }
            }
            other => other,
        }
    }
}

/// Logging priority for component categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

macro_rules! policy_display {
    ($ty:ty { $($variant:ident => $text:literal),* $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($text),)*
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)*
                    other => Err(format!("unknown {} [{}]", stringify!($ty), other)),
                }
            }
        }
    };
}

policy_display!(ActivationPolicy { Startup => "startup", Demand => "demand", System => "system" });
policy_display!(LifestylePolicy { Singleton => "singleton", Transient => "transient", Thread => "thread" });
policy_display!(CollectionPolicy { Hard => "hard", Soft => "soft", Weak => "weak", System => "system" });
policy_display!(Priority { Trace => "trace", Debug => "debug", Info => "info", Warn => "warn", Error => "error" });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_collection_resolution() {
        let hard = CollectionPolicy::Hard;
        let soft = CollectionPolicy::Soft;
        assert_eq!(CollectionPolicy::System.resolve(false, hard, soft), CollectionPolicy::Hard);
        assert_eq!(CollectionPolicy::System.resolve(true, hard, soft), CollectionPolicy::Soft);
        assert_eq!(CollectionPolicy::Weak.resolve(false, hard, soft), CollectionPolicy::Weak);
        assert_eq!(CollectionPolicy::System.resolve(true, hard, CollectionPolicy::Weak), CollectionPolicy::Weak);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("STARTUP".parse::<ActivationPolicy>().unwrap(), ActivationPolicy::Startup);
        assert_eq!("thread".parse::<LifestylePolicy>().unwrap(), LifestylePolicy::Thread);
        assert!("sometimes".parse::<CollectionPolicy>().is_err());
        assert_eq!(Priority::Warn.to_string(), "warn");
    }
}
