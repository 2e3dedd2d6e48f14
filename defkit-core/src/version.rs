//! Dotted numeric versions used by package metadata

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("version \"{0}\" has more than four components")]
    TooManyComponents(String),

    #[error("invalid version component \"{component}\" in \"{version}\"")]
    InvalidComponent { version: String, component: String },
}

/// Version with up to four components: `major.minor[.patch[.build]]`
///
/// Missing components compare as zero, so `1.2` and `1.2.0.0` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    components: [u32; 4],
    len: usize,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            components: [major, minor, patch, 0],
            len: 3,
        }
    }

    pub fn major(&self) -> u32 {
        self.components[0]
    }

    pub fn minor(&self) -> u32 {
        self.components[1]
    }

    pub fn patch(&self) -> u32 {
        self.components[2]
    }

    pub fn build(&self) -> u32 {
        self.components[3]
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut components = [0u32; 4];
        let mut len = 0;
        for component in text.split('.') {
            if len == components.len() {
                return Err(VersionError::TooManyComponents(text.to_string()));
            }
            components[len] = component.parse().map_err(|_| VersionError::InvalidComponent {
                version: text.to_string(),
                component: component.to_string(),
            })?;
            len += 1;
        }

        Ok(Self { components, len: len.max(2) })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components[..self.len].iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}
