//! This module defines the main functionality of trialpipe, the parameter
//! resolution front end of a video-based motion-capture pipeline.

pub mod module; // Import the module submodule that contains other modules

use std::io::{self, BufRead};

use crate::module::config::defaults;
use crate::module::config::resolver::{self, ResolvedParameterSet};
use crate::module::config::schema::{self, Severity};
use crate::module::config::store::SectionPath;
use crate::module::define;
use crate::module::skeleton::{self, SkeletonTree};
use crate::module::wizard::{RunMode, SetupSettings, SetupWizard};

// The main function of trialpipe
pub fn main() {
    // Initialize the logging system with the working directory and the system name
    init_log(".", define::system::NAME);
    log::info!("Starting trialpipe...");

    // Collect the run settings from the operator
    let Some(settings) = run_wizard() else {
        log::error!("Setup aborted before completion.");
        std::process::exit(1);
    };
    log::info!(
        "Processing participant `{}` under {}",
        settings.participant_name,
        settings.target_directory.display()
    );

    // A fresh project gets a starter Config.toml to edit
    if let Err(e) = defaults::write_template(&settings.target_directory) {
        log::warn!("could not write starter Config.toml: {}", e);
    }

    let failed = match settings.run_mode {
        RunMode::Single => run_single(&settings),
        RunMode::Batch { trial_count } => run_batch(&settings, trial_count),
    };
    if failed {
        std::process::exit(1);
    }
}

/// Drive the setup state machine from stdin prompts. Returns `None` if the
/// input ends before the sequence completes.
fn run_wizard() -> Option<SetupSettings> {
    let mut wizard = SetupWizard::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while !wizard.is_complete() {
        println!("{}", wizard.prompt());
        let line = lines.next()?.ok()?;
        if let Err(e) = wizard.answer(&line) {
            println!("{}", e);
        }
    }
    wizard.settings()
}

/// Resolve and validate the target directory as a single trial. Returns
/// true when the run must stop with a failure.
fn run_single(settings: &SetupSettings) -> bool {
    match resolver::resolve(&settings.target_directory) {
        Ok(set) => report(&settings.target_directory.display().to_string(), &set),
        Err(e) => {
            log::error!("resolution failed: {}", e);
            true
        }
    }
}

/// Resolve every discovered trial under the session directory, up to the
/// requested count. A failed trial is skipped; the batch continues.
fn run_batch(settings: &SetupSettings, trial_count: usize) -> bool {
    let results = resolver::resolve_batch(&settings.target_directory, Some(trial_count));
    let mut failed = false;
    for (relative, result) in &results {
        match result {
            Ok(set) => {
                failed |= report(relative, set);
            }
            Err(_) => {
                // Already logged by the resolver; keep going with siblings
                failed = true;
            }
        }
    }
    log::info!(
        "batch complete: {} of {} trials resolved",
        results.iter().filter(|(_, r)| r.is_ok()).count(),
        results.len()
    );
    failed
}

/// Log the validation findings and the selected skeleton for one resolved
/// trial. Returns true when validation reported errors.
fn report(label: &str, set: &ResolvedParameterSet) -> bool {
    let findings = schema::validate(set);
    let mut errors = 0;
    for finding in &findings {
        match finding.severity {
            Severity::Warning => log::warn!("{}: {}", label, finding),
            Severity::Error => {
                errors += 1;
                log::error!("{}: {}", label, finding);
            }
        }
    }
    match trial_skeleton(set) {
        Some(tree) => {
            log::info!(
                "{}: pose model `{}` with {} joints",
                label,
                set.pose_model().unwrap_or("?"),
                tree.joint_count()
            );
            // The association stage tracks one stable keypoint; check it
            // exists in the selected skeleton and log its kinematic chain.
            let tracked = set
                .get(
                    &SectionPath::from_dotted("personAssociation.single_person"),
                    "tracked_keypoint",
                )
                .and_then(toml::Value::as_str);
            if let Some(tracked) = tracked {
                match tree.find_by_name(tracked) {
                    Ok(joint) => {
                        let chain: Vec<&str> = tree
                            .ancestors(joint)
                            .iter()
                            .map(|j| j.name.as_str())
                            .collect();
                        log::debug!("{}: tracked keypoint chain: {}", label, chain.join(" < "));
                    }
                    Err(e) => log::warn!("{}: tracked keypoint: {}", label, e),
                }
            }
        }
        None => log::warn!("{}: no skeleton for the configured pose model", label),
    }
    errors > 0
}

/// The skeleton tree for a trial's configured pose model: one of the
/// built-in models, or a tree built from the resolved `pose.<MODEL>`
/// section for custom models.
fn trial_skeleton(set: &ResolvedParameterSet) -> Option<SkeletonTree> {
    let model = set.pose_model()?;
    if let Some(tree) = skeleton::by_model_name(model) {
        return Some(tree.clone());
    }
    let section = SectionPath::from_dotted("pose").child(model);
    let table = set.section_as_table(&section)?;
    match SkeletonTree::build(&toml::Value::Table(table)) {
        Ok(tree) => Some(tree),
        Err(e) => {
            log::error!("invalid `{}` skeleton description: {}", model, e);
            None
        }
    }
}

/// This function initializes the logger system using the log4rs crate.
///
/// # Arguments
/// * `dir` - A string slice that holds the directory where the log file will be stored
/// * `name` - A string slice that holds the name of the logger and the log file
fn init_log(dir: &str, name: &str) {
    use crate::module::util::path::join;
    use log::LevelFilter;
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({d} - {l}: {m}{n})}")))
        .build(join(&[
            dir,
            define::path::LOG_DIR,
            &format!("{}.log", name),
        ]))
        .unwrap();

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(LevelFilter::Info))
        .unwrap();
    log4rs::init_config(config).unwrap();
}
