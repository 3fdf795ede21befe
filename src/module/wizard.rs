//! Setup Wizard Module
//!
//! The initial setup sequence collects the run settings from the operator:
//! language, participant name, parent directory, process mode, and the
//! number of trials when running in batch mode. The sequence is an explicit
//! state machine decoupled from any rendering, so the same steps can drive
//! a text prompt loop or a scripted input source.

use std::path::PathBuf;

use thiserror::Error;

/// Interface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Fr,
}

impl Language {
    /// Convert a string to a language.
    pub fn from_string(s: &str) -> Option<Language> {
        match s {
            "en" => Some(Language::En),
            "fr" => Some(Language::Fr),
            _ => None,
        }
    }

    /// French support is announced but not implemented yet.
    pub fn is_implemented(&self) -> bool {
        matches!(self, Language::En)
    }
}

/// Whether one directory or a whole session is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Single,
    Batch { trial_count: usize },
}

/// The steps of the setup sequence, in order. Batch mode adds the
/// `TrialCount` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupStep {
    #[default]
    Language,
    ParticipantName,
    ParentDirectory,
    ProcessMode,
    TrialCount,
    Done,
}

/// Errors raised by one setup answer. The wizard stays on the current step
/// so the caller can re-prompt.
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error("unknown language `{0}`")]
    UnknownLanguage(String),

    #[error("{0:?} language support is not implemented yet")]
    UnsupportedLanguage(Language),

    #[error("unknown process mode `{0}` (expected `single` or `batch`)")]
    UnknownMode(String),

    #[error("the number of trials must be an integer of at least 1, got `{0}`")]
    InvalidTrialCount(String),

    #[error("setup is already complete")]
    AlreadyComplete,
}

/// The settings a completed setup produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupSettings {
    pub language: Language,
    pub participant_name: String,
    pub target_directory: PathBuf,
    pub run_mode: RunMode,
}

/// The setup state machine. Feed it one answer per step with [`answer`];
/// once `Done`, [`settings`] yields the collected settings.
///
/// [`answer`]: SetupWizard::answer
/// [`settings`]: SetupWizard::settings
#[derive(Debug, Default)]
pub struct SetupWizard {
    step: SetupStep,
    language: Option<Language>,
    participant_name: Option<String>,
    parent_directory: Option<PathBuf>,
    run_mode: Option<RunMode>,
}

impl SetupWizard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current step.
    pub fn step(&self) -> SetupStep {
        self.step
    }

    /// The prompt text for the current step.
    pub fn prompt(&self) -> &'static str {
        match self.step() {
            SetupStep::Language => "Select language (en/fr):",
            SetupStep::ParticipantName => "Enter the participant name:",
            SetupStep::ParentDirectory => "Enter the parent directory:",
            SetupStep::ProcessMode => "Select process mode (single/batch):",
            SetupStep::TrialCount => "Enter the number of trials:",
            SetupStep::Done => "",
        }
    }

    /// Apply one answer to the current step and return the next step. On
    /// error the step is unchanged and the same prompt applies again.
    pub fn answer(&mut self, input: &str) -> Result<SetupStep, SetupError> {
        let input = input.trim();
        let next = match self.step() {
            SetupStep::Language => {
                let lang = Language::from_string(input)
                    .ok_or_else(|| SetupError::UnknownLanguage(input.to_string()))?;
                if !lang.is_implemented() {
                    return Err(SetupError::UnsupportedLanguage(lang));
                }
                self.language = Some(lang);
                SetupStep::ParticipantName
            }
            SetupStep::ParticipantName => {
                // An empty name falls back to a generic one
                let name = if input.is_empty() { "Participant" } else { input };
                self.participant_name = Some(name.to_string());
                SetupStep::ParentDirectory
            }
            SetupStep::ParentDirectory => {
                let dir = if input.is_empty() { "." } else { input };
                self.parent_directory = Some(PathBuf::from(dir));
                SetupStep::ProcessMode
            }
            SetupStep::ProcessMode => match input {
                "single" => {
                    self.run_mode = Some(RunMode::Single);
                    SetupStep::Done
                }
                "batch" => SetupStep::TrialCount,
                other => return Err(SetupError::UnknownMode(other.to_string())),
            },
            SetupStep::TrialCount => {
                let trial_count = input
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n >= 1)
                    .ok_or_else(|| SetupError::InvalidTrialCount(input.to_string()))?;
                self.run_mode = Some(RunMode::Batch { trial_count });
                SetupStep::Done
            }
            SetupStep::Done => return Err(SetupError::AlreadyComplete),
        };
        self.step = next;
        Ok(next)
    }

    pub fn is_complete(&self) -> bool {
        self.step() == SetupStep::Done
    }

    /// The collected settings, once the sequence is complete.
    pub fn settings(&self) -> Option<SetupSettings> {
        if !self.is_complete() {
            return None;
        }
        Some(SetupSettings {
            language: self.language?,
            participant_name: self.participant_name.clone()?,
            target_directory: self.parent_directory.clone()?,
            run_mode: self.run_mode?,
        })
    }
}
