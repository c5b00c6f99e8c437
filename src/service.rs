//! Service identities and version compliance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three-part service version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self { major, minor, micro }
    }

    /// Returns true when a provider at `self` satisfies a request for `requested`.
    ///
    /// Major versions must match exactly; the provided minor/micro pair must
    /// not be lower than the requested one.
    pub fn complies(&self, requested: &Version) -> bool {
        self.major == requested.major && (self.minor, self.micro) >= (requested.minor, requested.micro)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty version".to_string());
        }
        let mut parts = [0u32; 3];
        for (i, segment) in trimmed.split('.').enumerate() {
            if i >= 3 {
                return Err(format!("too many version segments in [{}]", s));
            }
            parts[i] = segment
                .parse()
                .map_err(|_| format!("invalid version segment [{}] in [{}]", segment, s))?;
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

/// A requested service: classname plus an optional minimum version
///
/// # Examples
///
/// ```rust
/// use ferrous_metro::{Service, Version};
///
/// let service: Service = "acme.Greeter#1.2".parse().unwrap();
/// assert_eq!(service.classname, "acme.Greeter");
/// assert_eq!(service.version, Some(Version::new(1, 2, 0)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    pub classname: String,
    #[serde(default)]
    pub version: Option<Version>,
}

impl Service {
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// True when a provided service (classname, version) satisfies this request.
    pub fn matches(&self, classname: &str, provided: Option<&Version>) -> bool {
        if self.classname != classname {
            return false;
        }
        match (&self.version, provided) {
            (None, _) => true,
            (Some(requested), Some(provided)) => provided.complies(requested),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}#{}", self.classname, version),
            None => f.write_str(&self.classname),
        }
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((classname, version)) => Ok(Service::new(classname).with_version(version.parse()?)),
            None => Ok(Service::new(s)),
        }
    }
}
