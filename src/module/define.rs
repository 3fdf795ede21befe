//! Module for Constants and Paths Definitions
//!
//! This module defines various constants and paths used throughout the application.

/// System Constants
pub mod system {
    /// Name of the system
    pub const NAME: &str = "trialpipe";
}

/// File Paths
pub mod path {

    // Per-scope parameter file, looked for in every Session, Participant
    // and Trial directory
    pub const CONF_FILE: &str = "Config.toml";

    // Log Directory
    pub const LOG_DIR: &str = "log";
}
