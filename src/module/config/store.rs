//! Scoped Parameter Store
//!
//! Holds the contents of one `Config.toml` as a flat mapping from section
//! paths to key/value tables, together with the scope the file belongs to.
//! Loading only rejects what the TOML grammar rejects; whether a key is
//! recognized is checked later by the schema module, so new optional keys
//! never require a parser change.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml::{Table, Value};

/// One nesting level at which parameters may be declared.
///
/// Ordered by increasing precedence: a Trial value overrides a Participant
/// value, which overrides a Session value, which overrides the built-in
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    BuiltinDefault,
    Session,
    Participant,
    Trial,
}

impl Scope {
    /// Convert a scope to its display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::BuiltinDefault => "builtin-default",
            Scope::Session => "session",
            Scope::Participant => "participant",
            Scope::Trial => "trial",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The dotted address of a nested parameter table, e.g.
/// `calibration.calculate.extrinsics.board`. The empty path addresses the
/// top level of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionPath(Vec<String>);

impl SectionPath {
    /// The top-level path.
    pub fn root() -> Self {
        SectionPath(Vec::new())
    }

    /// Build a path from its dotted form, e.g. `"filtering.butterworth"`.
    pub fn from_dotted(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        SectionPath(dotted.split('.').map(str::to_string).collect())
    }

    /// The path of a subsection one level below this one.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        SectionPath(segments)
    }

    /// The section names, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The segments below `prefix`, or `None` if this path does not start
    /// with it. `strip_prefix` of a path against itself yields `&[]`.
    pub fn strip_prefix(&self, prefix: &SectionPath) -> Option<&[String]> {
        if self.0.len() < prefix.0.len() || self.0[..prefix.0.len()] != prefix.0[..] {
            return None;
        }
        Some(&self.0[prefix.0.len()..])
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// The key/value pairs declared directly inside one section.
pub type KeyMap = BTreeMap<String, Value>;

/// Errors raised while loading a parameter file.
///
/// A failure here is fatal to the affected trial's resolution only; sibling
/// trials in a batch are unaffected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

/// The contents of one parameter file, flattened per section path.
///
/// Every table in the file gets its own entry, however deep; arrays of
/// tables (the skeleton `children` syntax) are kept as a single list value
/// under their key so they round-trip losslessly and merge as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedParameterStore {
    pub scope: Scope,
    pub source_location: PathBuf,
    tree: BTreeMap<SectionPath, KeyMap>,
}

impl ScopedParameterStore {
    /// Load a parameter file from disk.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the `Config.toml` to read.
    /// * `scope` - The scope the file belongs to.
    pub fn load(path: &Path, scope: Scope) -> Result<Self, ConfigError> {
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_str(&text, scope, path)
    }

    /// Parse parameter file contents held in memory.
    pub fn from_str(text: &str, scope: Scope, source: &Path) -> Result<Self, ConfigError> {
        let root: Table =
            toml::from_str(text).map_err(|e| ConfigError::Parse(source.to_path_buf(), e))?;
        let mut tree = BTreeMap::new();
        flatten(&root, SectionPath::root(), &mut tree);
        Ok(ScopedParameterStore {
            scope,
            source_location: source.to_path_buf(),
            tree,
        })
    }

    /// Iterate over the sections of this store in path order.
    pub fn sections(&self) -> impl Iterator<Item = (&SectionPath, &KeyMap)> {
        self.tree.iter()
    }

    /// Look up one key under one section path.
    pub fn get(&self, path: &SectionPath, key: &str) -> Option<&Value> {
        self.tree.get(path).and_then(|keys| keys.get(key))
    }

    /// A store with no keys contributes nothing to a merge.
    pub fn is_empty(&self) -> bool {
        self.tree.values().all(|keys| keys.is_empty())
    }
}

/// Flatten a TOML table into per-section key maps. Sub-tables become their
/// own section entries (empty ones included); everything else, arrays of
/// tables included, stays a leaf value under the current path.
fn flatten(table: &Table, path: SectionPath, tree: &mut BTreeMap<SectionPath, KeyMap>) {
    let mut keys = KeyMap::new();
    let mut subsections = Vec::new();
    for (key, value) in table {
        match value {
            Value::Table(sub) => subsections.push((key, sub)),
            other => {
                keys.insert(key.clone(), other.clone());
            }
        }
    }
    tree.entry(path.clone()).or_default().extend(keys);
    for (key, sub) in subsections {
        flatten(sub, path.child(key), tree);
    }
}
