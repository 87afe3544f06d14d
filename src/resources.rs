//! The resource table: logical resource paths and their content fingerprints.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::key::ROOT_KEY;

/// Fingerprints keyed by logical path, as persisted in the manifest record.
pub type Fingerprints = BTreeMap<String, String>;

/// Accepted on-disk layouts for a resource table file.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    Full {
        resources: Fingerprints,
        #[serde(default)]
        core: Vec<String>,
    },
    Bare(Fingerprints),
}

/// Immutable table of application resources baked in at build time, plus the
/// core shell that has to be staged before install succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTable {
    resources: Fingerprints,
    core: Vec<String>,
}

impl ResourceTable {
    /// Builds a table, validating keys and the core shell list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Manifest`] if a key is empty, absolute, or carries an
    /// origin, and [`Error::UnknownCoreResource`] if a core entry is missing
    /// from `resources`.
    pub fn new(resources: Fingerprints, core: Vec<String>) -> Result<Self> {
        if let Some(bad) = resources.keys().find(|k| !is_normalized(k)) {
            return Err(Error::Manifest(format!("resource key {bad:?} is not normalized")));
        }
        if let Some(missing) = core.iter().find(|k| !resources.contains_key(*k)) {
            return Err(Error::UnknownCoreResource(missing.clone()));
        }
        let mut seen = HashSet::new();
        let core = core.into_iter().filter(|k| seen.insert(k.clone())).collect();
        Ok(Self { resources, core })
    }

    /// Parses a table from JSON.
    ///
    /// Accepts either a bare `{"path": "fingerprint"}` object (no core shell)
    /// or `{"resources": {...}, "core": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        match serde_json::from_str(json)? {
            TableFile::Full { resources, core } => Self::new(resources, core),
            TableFile::Bare(resources) => Self::new(resources, Vec::new()),
        }
    }

    /// Loads a table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Returns the fingerprint for `key`, if the table contains it.
    #[must_use]
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.resources.get(key).map(String::as_str)
    }

    /// Returns true if `key` is a known resource.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    /// Iterates over all logical keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Returns the core shell keys in declaration order.
    #[must_use]
    pub fn core(&self) -> &[String] {
        &self.core
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the table has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Returns the fingerprint map.
    #[must_use]
    pub const fn fingerprints(&self) -> &Fingerprints {
        &self.resources
    }

    /// Serializes the fingerprint map in the persisted manifest format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_manifest(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.resources)?)
    }

    /// Returns true if `manifest` lists exactly this table's fingerprints.
    #[must_use]
    pub fn matches(&self, manifest: &Fingerprints) -> bool {
        &self.resources == manifest
    }
}

/// Parses a persisted manifest record body.
///
/// # Errors
///
/// Returns [`Error::Manifest`] if the body is not a JSON object of strings.
pub fn parse_manifest(body: &[u8]) -> Result<Fingerprints> {
    serde_json::from_slice(body).map_err(|e| Error::Manifest(format!("persisted manifest: {e}")))
}

fn is_normalized(key: &str) -> bool {
    key == ROOT_KEY || !(key.is_empty() || key.starts_with('/') || key.contains("://"))
}
