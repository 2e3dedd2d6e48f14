//! Extension modules contributed by packages
//!
//! Loading extension code is left to an [`ExtensionHost`]. The registry only
//! invokes the entry points the host hands back, one package at a time.

use std::fmt;

use tracing::{info, warn};

use crate::instance::HostError;
use crate::package::Package;
use crate::value::Value;

type EntryFn = Box<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;

/// Function to run once a package has been loaded, with its declared arguments
pub struct EntryPoint {
    pub name: String,
    pub args: Vec<Value>,
    run: EntryFn,
}

impl EntryPoint {
    pub fn new<F>(name: impl Into<String>, args: Vec<Value>, run: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            args,
            run: Box::new(run),
        }
    }

    pub fn invoke(&self) -> anyhow::Result<()> {
        (self.run)(&self.args)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ExtensionModule {
    pub name: String,
    pub entry_points: Vec<EntryPoint>,
}

impl ExtensionModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_points: Vec::new(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.entry_points.push(entry_point);
        self
    }
}

/// Loads the extension modules a package ships
pub trait ExtensionHost: Send + Sync {
    fn load_modules(&self, package: &Package) -> Result<Vec<ExtensionModule>, HostError>;
}

/// Extension that could not be loaded or whose entry point failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFailure {
    pub package: String,
    pub module: Option<String>,
    pub message: String,
}

/// Load and run every extension of `package`
///
/// Module names are recorded on the package as they are activated. The first
/// failure stops this package's activation and is returned.
pub fn activate(host: &dyn ExtensionHost, package: &mut Package) -> Option<ExtensionFailure> {
    let modules = match host.load_modules(package) {
        Ok(modules) => modules,
        Err(err) => {
            warn!(package = %package.id, error = %err, "failed to load extension modules");
            return Some(ExtensionFailure {
                package: package.id.clone(),
                module: None,
                message: err.to_string(),
            });
        }
    };

    for module in modules {
        package.extensions.push(module.name.clone());
        for entry_point in &module.entry_points {
            if let Err(err) = entry_point.invoke() {
                warn!(package = %package.id, module = %module.name, entry_point = %entry_point.name, error = %err, "entry point failed");
                return Some(ExtensionFailure {
                    package: package.id.clone(),
                    module: Some(module.name.clone()),
                    message: format!("{}: {err:#}", entry_point.name),
                });
            }
        }
        info!(package = %package.id, module = %module.name, "extension activated");
    }
    None
}
