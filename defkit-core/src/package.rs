//! Package metadata
//!
//! A package is a versioned, independently authored unit of content. Its
//! metadata document declares what it depends on and what it cannot be
//! enabled alongside.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::serializer::Document;
use crate::version::Version;

/// Reference from one package to another, by name and creator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Creator", default)]
    pub creator: String,
    #[serde(rename = "ModVersion", default)]
    pub version: Version,
}

impl PackageDependency {
    pub fn new(name: impl Into<String>, creator: impl Into<String>, version: Version) -> Self {
        Self {
            id: None,
            name: name.into(),
            creator: creator.into(),
            version,
        }
    }

    /// Whether `package` is the one this entry refers to
    pub fn matches(&self, package: &Package) -> bool {
        self.name == package.name && self.creator == package.creator
    }

    /// How the found package's version compares to the required one
    pub fn version_compare(&self, package: &Package) -> Ordering {
        package.own_version.cmp(&self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Creator", default)]
    pub creator: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "ModVersion", default)]
    pub own_version: Version,
    /// Host version this package was built against
    #[serde(rename = "GameVersion", default)]
    pub compatible_version: Version,
    #[serde(rename = "Dependencies", default)]
    pub dependencies: Vec<PackageDependency>,
    #[serde(rename = "Incompatible", default)]
    pub incompatibilities: Vec<PackageDependency>,
    #[serde(rename = "Local", default)]
    pub local: bool,

    /// Names of definitions this package committed
    #[serde(skip)]
    pub definitions: Vec<String>,
    /// Extension modules activated for this package
    #[serde(skip)]
    pub extensions: Vec<String>,
}

impl Package {
    pub fn new(id: impl Into<String>, name: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            creator: creator.into(),
            description: String::new(),
            own_version: Version::default(),
            compatible_version: Version::default(),
            dependencies: Vec::new(),
            incompatibilities: Vec::new(),
            local: false,
            definitions: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        Package::deserialize(doc)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// How the host version compares to the version this package targets
    pub fn version_compare(&self, host: &Version) -> Ordering {
        host.cmp(&self.compatible_version)
    }
}

/// Package ids from a mod list, one per line
pub fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Mod list for `packages`, one id per line
pub fn format_list<'a>(packages: impl IntoIterator<Item = &'a Package>) -> String {
    packages
        .into_iter()
        .map(|package| package.id.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_document() {
        let doc = json!({
            "ID": "addon",
            "Name": "Addon",
            "Creator": "someone",
            "Description": "More heroes",
            "ModVersion": "1.1.0",
            "GameVersion": "1.0",
            "Dependencies": [{"Name": "Base", "Creator": "defkit", "ModVersion": "1.0.0"}],
            "Incompatible": [],
            "Local": true
        });
        let package = Package::from_document(&doc).unwrap();

        assert_eq!(package.id, "addon");
        assert_eq!(package.own_version, Version::new(1, 1, 0));
        assert_eq!(package.dependencies[0].name, "Base");
        assert!(package.local);
        assert!(package.definitions.is_empty());
    }

    #[test]
    fn test_optional_metadata_defaults() {
        let package = Package::from_json(r#"{"ID": "tiny", "Name": "Tiny"}"#).unwrap();
        assert_eq!(package.creator, "");
        assert!(package.dependencies.is_empty());
        assert_eq!(package.compatible_version, Version::default());
    }

    #[test]
    fn test_dependency_matching_and_versions() {
        let mut base = Package::new("base", "Base", "defkit");
        base.own_version = Version::new(1, 2, 0);

        let dependency = PackageDependency::new("Base", "defkit", Version::new(1, 0, 0));
        assert!(dependency.matches(&base));
        assert_eq!(dependency.version_compare(&base), Ordering::Greater);
        assert!(!PackageDependency::new("Base", "other", Version::new(1, 0, 0)).matches(&base));
    }

    #[test]
    fn test_host_version_compare() {
        let mut package = Package::new("p", "P", "c");
        package.compatible_version = Version::new(2, 0, 0);
        assert_eq!(package.version_compare(&Version::new(1, 0, 0)), Ordering::Less);
        assert_eq!(package.version_compare(&Version::new(2, 0, 0)), Ordering::Equal);
    }

    #[test]
    fn test_mod_list_round_trip() {
        let packages = vec![Package::new("base", "Base", "c"), Package::new("addon", "Addon", "c")];
        let text = format_list(&packages);
        assert_eq!(text, "base\naddon");
        assert_eq!(parse_list("base\r\n\naddon\n"), vec!["base", "addon"]);
    }
}
