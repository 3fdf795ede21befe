//! Parameter Resolver
//!
//! Walks the scope chain of a trial directory (Session, then Participant,
//! then the Trial itself), deep-merges each scope's `Config.toml` on top of
//! the built-in defaults, and produces one fully-resolved parameter set
//! together with the scope that supplied each value.
//!
//! The merge is key-level, never whole-section: a Trial overriding one key
//! inside `filtering.butterworth` leaves sibling keys set at Session scope
//! untouched. Each section path, however deep, is its own merge target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use toml::{Table, Value};

use super::defaults;
use super::store::{ConfigError, KeyMap, Scope, ScopedParameterStore, SectionPath};
use crate::module::util::path as pathutil;

/// One fully-resolved parameter set.
///
/// Every key that exists in the built-in defaults is guaranteed present;
/// `provenance` records, per section path and key, the most specific scope
/// that set the value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedParameterSet {
    values: BTreeMap<SectionPath, KeyMap>,
    provenance: BTreeMap<(SectionPath, String), Scope>,
}

impl ResolvedParameterSet {
    /// An empty set. Callers normally start from [`defaults::default_set`]
    /// instead, which pre-populates every recognized key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-merge one scope's store on top of this set.
    ///
    /// A key present in the store overrides the accumulated value and takes
    /// over its provenance, even when the value is identical (the more
    /// specific scope deterministically wins). A key absent from the store
    /// survives with its previous value and provenance. Sections unknown so
    /// far are inserted wholesale under the incoming scope.
    pub fn merge_store(&mut self, store: &ScopedParameterStore) {
        for (path, keys) in store.sections() {
            let section = self.values.entry(path.clone()).or_default();
            for (key, value) in keys {
                section.insert(key.clone(), value.clone());
                self.provenance
                    .insert((path.clone(), key.clone()), store.scope);
            }
        }
    }

    /// Look up one resolved value.
    pub fn get(&self, path: &SectionPath, key: &str) -> Option<&Value> {
        self.values.get(path).and_then(|keys| keys.get(key))
    }

    /// The scope that supplied the resolved value of one key.
    pub fn provenance(&self, path: &SectionPath, key: &str) -> Option<Scope> {
        self.provenance.get(&(path.clone(), key.to_string())).copied()
    }

    /// The key/value pairs declared directly inside one section.
    pub fn section(&self, path: &SectionPath) -> Option<&KeyMap> {
        self.values.get(path)
    }

    /// Iterate over all sections in path order.
    pub fn sections(&self) -> impl Iterator<Item = (&SectionPath, &KeyMap)> {
        self.values.iter()
    }

    /// Rebuild one section and its descendants as a nested TOML table.
    /// Used to hand the `pose.<MODEL>` subtree to the skeleton builder.
    pub fn section_as_table(&self, path: &SectionPath) -> Option<Table> {
        self.values.get(path)?;
        let mut table = Table::new();
        'section: for (sub_path, keys) in &self.values {
            let Some(rel) = sub_path.strip_prefix(path) else {
                continue;
            };
            let mut cursor = &mut table;
            for segment in rel {
                cursor = match cursor
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Table(Table::new()))
                    .as_table_mut()
                {
                    Some(sub) => sub,
                    // A leaf key shadows a same-named subsection; keep the leaf.
                    None => continue 'section,
                };
            }
            for (key, value) in keys {
                cursor.insert(key.clone(), value.clone());
            }
        }
        Some(table)
    }

    /// The configured pose model name, when resolved to a string.
    pub fn pose_model(&self) -> Option<&str> {
        self.get(&SectionPath::from_dotted("pose"), "pose_model")
            .and_then(Value::as_str)
    }
}

/// The scope chain of a trial directory, in merge order: the enclosing
/// Session directory first, then the Participant directory, then the Trial
/// itself. Levels without a parent directory are dropped.
pub fn scope_chain(trial_dir: &Path) -> Vec<(Scope, PathBuf)> {
    let mut chain = Vec::new();
    if let Some(participant) = trial_dir.parent() {
        if let Some(session) = participant.parent() {
            chain.push((Scope::Session, session.to_path_buf()));
        }
        chain.push((Scope::Participant, participant.to_path_buf()));
    }
    chain.push((Scope::Trial, trial_dir.to_path_buf()));
    chain
}

/// Resolve the parameters that apply to one trial directory.
///
/// Starts from the built-in defaults and merges each scope with a
/// `Config.toml` in increasing precedence order; scopes without a parameter
/// file contribute nothing. A parse failure at any scope aborts this
/// trial's resolution only.
///
/// # Arguments
///
/// * `trial_dir` - The trial's own directory; its parent and grandparent
///   are taken as the Participant and Session directories.
pub fn resolve(trial_dir: &Path) -> Result<ResolvedParameterSet, ConfigError> {
    let mut set = defaults::default_set();
    for (scope, dir) in scope_chain(trial_dir) {
        let Some(file) = pathutil::config_file(&dir) else {
            continue;
        };
        let store = ScopedParameterStore::load(&file, scope)?;
        if store.is_empty() {
            // Equivalent to the scope being absent
            log::debug!("empty parameter file at {}", file.display());
            continue;
        }
        log::debug!("merging {} parameters from {}", scope, file.display());
        set.merge_store(&store);
    }
    Ok(set)
}

/// The trials a session excludes from batch processing, as
/// `<participant_dir>/<trial_dir>` relative paths. Read from the Session
/// scope's `project.exclude_from_batch` before any per-trial resolution.
/// An unreadable session file yields no exclusions (the per-trial
/// resolutions will report it themselves).
pub fn excluded_trials(session_dir: &Path) -> Vec<String> {
    let Some(file) = pathutil::config_file(session_dir) else {
        return Vec::new();
    };
    let store = match ScopedParameterStore::load(&file, Scope::Session) {
        Ok(store) => store,
        Err(e) => {
            log::warn!("could not read exclusion list: {}", e);
            return Vec::new();
        }
    };
    store
        .get(&SectionPath::from_dotted("project"), "exclude_from_batch")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve every trial under a session directory.
///
/// Trials are the second-level subdirectories (`participant/trial`) in
/// sorted order. Excluded trials are skipped before resolution; a failure
/// in one trial never affects its siblings. At most `trial_count` trials
/// are resolved when a limit is given.
pub fn resolve_batch(
    session_dir: &Path,
    trial_count: Option<usize>,
) -> Vec<(String, Result<ResolvedParameterSet, ConfigError>)> {
    let excluded = excluded_trials(session_dir);
    let mut results = Vec::new();
    'discovery: for participant in pathutil::subdirectories(session_dir) {
        for trial in pathutil::subdirectories(&participant) {
            if trial_count.is_some_and(|n| results.len() >= n) {
                break 'discovery;
            }
            let relative = format!(
                "{}/{}",
                pathutil::dir_name(&participant),
                pathutil::dir_name(&trial)
            );
            if excluded.contains(&relative) {
                log::info!("excluded from batch: {}", relative);
                continue;
            }
            let result = resolve(&trial);
            if let Err(e) = &result {
                log::error!("resolution failed for {}: {}", relative, e);
            }
            results.push((relative, result));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::define;
    use std::fs;

    /// Lay out a session/participant/trial hierarchy under /tmp and write
    /// the given per-scope Config.toml contents.
    fn write_scopes(
        case: &str,
        session: Option<&str>,
        participant: Option<&str>,
        trial: Option<&str>,
    ) -> PathBuf {
        let session_dir = PathBuf::from("/tmp/trialpipetest").join(case);
        let participant_dir = session_dir.join("P00_Participant");
        let trial_dir = participant_dir.join("T00_Trial");
        let _ = fs::remove_dir_all(&session_dir);
        fs::create_dir_all(&trial_dir).unwrap();
        for (dir, text) in [
            (&session_dir, session),
            (&participant_dir, participant),
            (&trial_dir, trial),
        ] {
            if let Some(text) = text {
                fs::write(dir.join(define::path::CONF_FILE), text).unwrap();
            }
        }
        trial_dir
    }

    #[test]
    fn test_precedence_and_key_level_isolation() {
        let trial_dir = write_scopes(
            "precedence",
            Some("[filtering.butterworth]\norder = 4\ncut_off_frequency = 6\n"),
            None,
            Some("[filtering.butterworth]\ncut_off_frequency = 10\n"),
        );
        let set = resolve(&trial_dir).unwrap();
        let path = SectionPath::from_dotted("filtering.butterworth");

        // The trial override wins; the sibling key survives at session scope
        assert_eq!(set.get(&path, "cut_off_frequency"), Some(&Value::Integer(10)));
        assert_eq!(set.get(&path, "order"), Some(&Value::Integer(4)));
        assert_eq!(set.provenance(&path, "cut_off_frequency"), Some(Scope::Trial));
        assert_eq!(set.provenance(&path, "order"), Some(Scope::Session));

        // The section holds exactly the default keys, no more
        let section = set.section(&path).unwrap();
        assert_eq!(section.len(), 2);
    }

    #[test]
    fn test_completeness_against_defaults() {
        let trial_dir = write_scopes(
            "completeness",
            Some("[pose]\nmode = 'performance'\n"),
            None,
            None,
        );
        let set = resolve(&trial_dir).unwrap();
        for (path, keys) in defaults::default_set().sections() {
            for key in keys.keys() {
                assert!(
                    set.get(path, key).is_some(),
                    "default key {}.{} resolved to absent",
                    path,
                    key
                );
            }
        }
    }

    #[test]
    fn test_sibling_subsections_merge_independently() {
        // One scope sets ...extrinsics.scene, another ...extrinsics.board;
        // neither wipes the other out.
        let trial_dir = write_scopes(
            "siblings",
            Some("[calibration.calculate.extrinsics.board]\nextrinsics_square_size = 80\n"),
            None,
            Some("[calibration.calculate.extrinsics.scene]\nextrinsics_extension = 'jpg'\n"),
        );
        let set = resolve(&trial_dir).unwrap();
        let board = SectionPath::from_dotted("calibration.calculate.extrinsics.board");
        let scene = SectionPath::from_dotted("calibration.calculate.extrinsics.scene");
        assert_eq!(
            set.get(&board, "extrinsics_square_size"),
            Some(&Value::Integer(80))
        );
        assert_eq!(set.provenance(&board, "extrinsics_square_size"), Some(Scope::Session));
        assert_eq!(
            set.get(&scene, "extrinsics_extension"),
            Some(&Value::String("jpg".to_string()))
        );
        assert_eq!(set.provenance(&scene, "extrinsics_extension"), Some(Scope::Trial));
        // Defaults in the sibling sections are untouched
        assert_eq!(set.get(&board, "show_reprojection_error"), Some(&Value::Boolean(true)));
        assert_eq!(
            set.provenance(&board, "show_reprojection_error"),
            Some(Scope::BuiltinDefault)
        );
    }

    #[test]
    fn test_identical_value_still_updates_provenance() {
        let trial_dir = write_scopes(
            "identical",
            Some("[filtering]\ntype = 'kalman'\n"),
            None,
            Some("[filtering]\ntype = 'kalman'\n"),
        );
        let set = resolve(&trial_dir).unwrap();
        let path = SectionPath::from_dotted("filtering");
        assert_eq!(set.provenance(&path, "type"), Some(Scope::Trial));
    }

    #[test]
    fn test_empty_file_equivalent_to_absent_scope() {
        let with_empty = write_scopes(
            "empty_file",
            Some("[pose]\nmode = 'lightweight'\n"),
            Some(""),
            None,
        );
        let without = write_scopes(
            "absent_scope",
            Some("[pose]\nmode = 'lightweight'\n"),
            None,
            None,
        );
        assert_eq!(resolve(&with_empty).unwrap(), resolve(&without).unwrap());
    }

    #[test]
    fn test_idempotence() {
        let trial_dir = write_scopes(
            "idempotence",
            Some("[triangulation]\nmin_cameras_for_triangulation = 3\n"),
            Some("[filtering]\ntype = 'gaussian'\n"),
            Some("[filtering.gaussian]\nsigma_kernel = 3\n"),
        );
        assert_eq!(resolve(&trial_dir).unwrap(), resolve(&trial_dir).unwrap());
    }

    #[test]
    fn test_parse_failure_reports_scope_file() {
        let trial_dir = write_scopes(
            "parse_failure",
            None,
            Some("[filtering\ntype = 'butterworth'"),
            None,
        );
        let err = resolve(&trial_dir).unwrap_err();
        assert!(err
            .to_string()
            .contains(&format!("P00_Participant/{}", define::path::CONF_FILE)));
    }

    #[test]
    fn test_section_as_table_rebuilds_subtree() {
        let trial_dir = write_scopes(
            "custom_section",
            Some(concat!(
                "[pose.CUSTOM]\nname = 'Hip'\nid = 19\n",
                "[[pose.CUSTOM.children]]\nname = 'RHip'\nid = 12\n",
            )),
            None,
            None,
        );
        let set = resolve(&trial_dir).unwrap();
        let table = set
            .section_as_table(&SectionPath::from_dotted("pose.CUSTOM"))
            .unwrap();
        assert_eq!(table.get("name"), Some(&Value::String("Hip".to_string())));
        let children = table.get("children").and_then(Value::as_array).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(set.pose_model(), Some("HALPE_26"));
    }

    #[test]
    fn test_batch_exclusion_and_isolation() {
        let session_dir = PathBuf::from("/tmp/trialpipetest/batch");
        let _ = fs::remove_dir_all(&session_dir);
        for trial in ["P00/T00", "P00/T01", "P01/T00"] {
            fs::create_dir_all(session_dir.join(trial)).unwrap();
        }
        fs::write(
            session_dir.join(define::path::CONF_FILE),
            "[project]\nexclude_from_batch = ['P00/T01']\n",
        )
        .unwrap();
        // P01/T00 carries a broken file; it must not take the others down
        fs::write(
            session_dir.join("P01/T00").join(define::path::CONF_FILE),
            "[pose\nmode = 'balanced'",
        )
        .unwrap();

        let results = resolve_batch(&session_dir, None);
        let names: Vec<&str> = results.iter().map(|(rel, _)| rel.as_str()).collect();
        assert_eq!(names, ["P00/T00", "P01/T00"]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn test_batch_trial_count_limit() {
        let session_dir = PathBuf::from("/tmp/trialpipetest/batch_limit");
        let _ = fs::remove_dir_all(&session_dir);
        for trial in ["P00/T00", "P00/T01", "P00/T02"] {
            fs::create_dir_all(session_dir.join(trial)).unwrap();
        }
        let results = resolve_batch(&session_dir, Some(2));
        assert_eq!(results.len(), 2);
    }
}
