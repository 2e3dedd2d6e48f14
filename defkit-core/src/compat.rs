//! Compatibility check over a working set of packages
//!
//! Produces advisory reports for a package browser. Nothing here fails a
//! load; severities only describe what the user should look at.

use std::cmp::Ordering;

use crate::package::Package;
use crate::version::Version;

/// Severity of a report, ordered `None < Warning < Error`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    None,
    Warning,
    Error,
}

/// Findings for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatReport {
    pub package_id: String,
    pub severity: Severity,
    pub messages: Vec<(Severity, String)>,
}

impl CompatReport {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            severity: Severity::None,
            messages: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into());
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.severity = self.severity.max(severity);
        self.messages.push((severity, message));
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|(severity, _)| *severity == Severity::Error)
            .map(|(_, message)| message.as_str())
    }
}

/// Enabled and disabled packages the user is choosing between
#[derive(Debug, Clone, Copy)]
pub struct WorkingSet<'a> {
    pub enabled: &'a [Package],
    pub disabled: &'a [Package],
}

impl<'a> WorkingSet<'a> {
    pub fn new(enabled: &'a [Package], disabled: &'a [Package]) -> Self {
        Self { enabled, disabled }
    }

    fn iter(&self) -> impl Iterator<Item = (&'a Package, bool)> {
        let (enabled, disabled) = (self.enabled, self.disabled);
        enabled
            .iter()
            .map(|package| (package, true))
            .chain(disabled.iter().map(|package| (package, false)))
    }
}

fn direction(ordering: Ordering, older: &'static str, newer: &'static str) -> &'static str {
    if ordering == Ordering::Less {
        older
    } else {
        newer
    }
}

/// Check every package in the working set, enabled packages first
pub fn check(set: &WorkingSet<'_>, host_version: &Version) -> Vec<CompatReport> {
    set.iter()
        .map(|(package, enabled)| {
            let mut report = CompatReport::new(&package.id);

            let ordering = package.version_compare(host_version);
            if ordering != Ordering::Equal {
                report.warn(format!(
                    "Current host version {host_version} is {}",
                    direction(ordering, "older", "newer")
                ));
            }

            for dependency in &package.dependencies {
                match set.iter().find(|(candidate, _)| dependency.matches(candidate)) {
                    None => report.error(format!(
                        "Dependency {} by {} is missing",
                        dependency.name, dependency.creator
                    )),
                    Some((found, found_enabled)) => {
                        if enabled && !found_enabled {
                            report.error(format!(
                                "Dependency {} by {} is not enabled",
                                dependency.name, dependency.creator
                            ));
                        }
                        let ordering = dependency.version_compare(found);
                        if ordering != Ordering::Equal {
                            report.warn(format!(
                                "Dependency {} by {} is {} version ({}), requires version {}",
                                dependency.name,
                                dependency.creator,
                                direction(ordering, "an older", "a newer"),
                                found.own_version,
                                dependency.version
                            ));
                        }
                    }
                }
            }

            for incompatible in &package.incompatibilities {
                if set.enabled.iter().any(|candidate| incompatible.matches(candidate)) {
                    report.error(format!(
                        "Incompatible package {} by {} enabled",
                        incompatible.name, incompatible.creator
                    ));
                }
            }

            report
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageDependency;

    fn package(id: &str, version: Version) -> Package {
        let mut package = Package::new(id, id.to_uppercase(), "defkit");
        package.own_version = version;
        package.compatible_version = Version::new(1, 0, 0);
        package
    }

    fn depends_on(mut package: Package, name: &str, version: Version) -> Package {
        package.dependencies.push(PackageDependency::new(name, "defkit", version));
        package
    }

    fn host() -> Version {
        Version::new(1, 0, 0)
    }

    #[test]
    fn test_clean_set_has_no_findings() {
        let enabled = vec![
            package("q", Version::new(1, 0, 0)),
            depends_on(package("p", Version::new(1, 0, 0)), "Q", Version::new(1, 0, 0)),
        ];
        let reports = check(&WorkingSet::new(&enabled, &[]), &host());
        assert!(reports.iter().all(|report| report.severity == Severity::None));
    }

    #[test]
    fn test_missing_dependency_is_one_error() {
        let enabled = vec![depends_on(package("p", Version::new(1, 0, 0)), "Q", Version::new(1, 0, 0))];
        let reports = check(&WorkingSet::new(&enabled, &[]), &host());

        assert_eq!(reports[0].severity, Severity::Error);
        let errors: Vec<&str> = reports[0].errors().collect();
        assert_eq!(errors, vec!["Dependency Q by defkit is missing"]);
    }

    #[test]
    fn test_disabled_dependency_is_an_error() {
        let enabled = vec![depends_on(package("p", Version::new(1, 0, 0)), "Q", Version::new(1, 0, 0))];
        let disabled = vec![package("q", Version::new(1, 0, 0))];
        let reports = check(&WorkingSet::new(&enabled, &disabled), &host());

        assert_eq!(reports[0].errors().collect::<Vec<_>>(), vec!["Dependency Q by defkit is not enabled"]);
        assert_eq!(reports[1].package_id, "q");
        assert_eq!(reports[1].severity, Severity::None);
    }

    #[test]
    fn test_dependency_version_direction() {
        let enabled = vec![
            package("q", Version::new(1, 0, 0)),
            depends_on(package("p", Version::new(1, 0, 0)), "Q", Version::new(2, 0, 0)),
            depends_on(package("r", Version::new(1, 0, 0)), "Q", Version::new(0, 5, 0)),
        ];
        let reports = check(&WorkingSet::new(&enabled, &[]), &host());

        assert_eq!(reports[1].severity, Severity::Warning);
        assert_eq!(
            reports[1].messages[0].1,
            "Dependency Q by defkit is an older version (1.0.0), requires version 2.0.0"
        );
        assert_eq!(
            reports[2].messages[0].1,
            "Dependency Q by defkit is a newer version (1.0.0), requires version 0.5.0"
        );
    }

    #[test]
    fn test_host_version_direction() {
        let enabled = vec![package("p", Version::new(1, 0, 0))];
        let older = check(&WorkingSet::new(&enabled, &[]), &Version::new(0, 9, 0));
        let newer = check(&WorkingSet::new(&enabled, &[]), &Version::new(1, 1, 0));

        assert_eq!(older[0].messages, vec![(Severity::Warning, "Current host version 0.9.0 is older".to_string())]);
        assert_eq!(newer[0].messages[0].1, "Current host version 1.1.0 is newer");
    }

    #[test]
    fn test_incompatible_only_counts_when_enabled() {
        let mut p = package("p", Version::new(1, 0, 0));
        p.incompatibilities.push(PackageDependency::new("Q", "defkit", Version::new(1, 0, 0)));
        let q = package("q", Version::new(1, 0, 0));

        let both = vec![p.clone(), q.clone()];
        let reports = check(&WorkingSet::new(&both, &[]), &host());
        assert_eq!(reports[0].errors().collect::<Vec<_>>(), vec!["Incompatible package Q by defkit enabled"]);

        let reports = check(&WorkingSet::new(std::slice::from_ref(&p), std::slice::from_ref(&q)), &host());
        assert_eq!(reports[0].severity, Severity::None);
    }

    #[test]
    fn test_severity_never_downgrades() {
        let mut report = CompatReport::new("p");
        report.error("broken");
        report.warn("also odd");
        assert_eq!(report.severity, Severity::Error);
        assert_eq!(report.messages.len(), 2);
    }
}
