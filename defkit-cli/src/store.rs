//! Packages read from a mods directory
//!
//! Layout: `<root>/<dir>/meta/Metadata.json` describes a package, and every
//! `*.json` file below `<root>/<dir>/<folder>/` holds one or more definition
//! documents written back to back.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use defkit_core::{Document, HostError, Package, PackageStore};
use tracing::{debug, info, warn};

const METADATA: &str = "meta/Metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid package metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid definition document in {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("package \"{0}\" not found")]
    UnknownPackage(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Package store over a directory with one folder per package
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    /// Package id to package folder, filled by discovery
    folders: Mutex<HashMap<String, PathBuf>>,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folders: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_metadata(folder: &Path) -> Result<Package, StoreError> {
        let path = folder.join(METADATA);
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        Package::from_json(&text).map_err(|source| StoreError::Metadata { path, source })
    }

    /// Package folders under the root, sorted by folder name
    fn scan(&self) -> Result<Vec<(String, PathBuf)>, StoreError> {
        let mut folders: Vec<PathBuf> = fs::read_dir(&self.root)
            .map_err(io_error(&self.root))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.join(METADATA).is_file())
            .collect();
        folders.sort();

        let mut found = Vec::with_capacity(folders.len());
        for folder in folders {
            match Self::read_metadata(&folder) {
                Ok(package) => found.push((package.id, folder)),
                Err(err) => warn!(error = %err, "skipping package folder"),
            }
        }
        Ok(found)
    }

    fn folder_of(&self, id: &str) -> Result<PathBuf, StoreError> {
        let mut folders = self.folders.lock().unwrap_or_else(PoisonError::into_inner);
        if !folders.contains_key(id) {
            folders.extend(self.scan()?);
        }
        folders
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownPackage(id.to_string()))
    }

    fn read_documents(path: &Path, out: &mut Vec<Document>) -> Result<(), StoreError> {
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        for doc in serde_json::Deserializer::from_str(&text).into_iter::<Document>() {
            out.push(doc.map_err(|source| StoreError::Document {
                path: path.to_path_buf(),
                source,
            })?);
        }
        Ok(())
    }
}

/// Every `*.json` file below `dir`, depth first in name order
fn json_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

impl PackageStore for DirectoryStore {
    fn available(&self) -> Vec<String> {
        match self.scan() {
            Ok(found) => {
                let ids = found.iter().map(|(id, _)| id.clone()).collect();
                self.folders
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(found);
                ids
            }
            Err(err) => {
                warn!(error = %err, "cannot list packages");
                Vec::new()
            }
        }
    }

    fn metadata(&self, id: &str) -> Result<Package, HostError> {
        let folder = self.folder_of(id)?;
        Ok(Self::read_metadata(&folder)?)
    }

    fn documents(&self, package: &Package, folders: &[&str]) -> Result<Vec<Document>, HostError> {
        let root = self.folder_of(&package.id)?;
        let mut documents = Vec::new();
        for folder in folders {
            let dir = root.join(folder);
            if !dir.is_dir() {
                info!(package = %package.id, folder = %folder, "no definition folder, skipping");
                continue;
            }
            let mut files = Vec::new();
            json_files(&dir, &mut files).map_err(io_error(&dir))?;
            for file in &files {
                Self::read_documents(file, &mut documents)?;
            }
            debug!(package = %package.id, folder = %folder, files = files.len(), "read definition files");
        }
        Ok(documents)
    }
}
