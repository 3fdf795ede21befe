//! Parameter Configuration Module
//!
//! Pipeline parameters live in `Config.toml` files at three nested scopes:
//! a Session directory, its Participant subdirectories, and their Trial
//! subdirectories. A key left unset at one scope falls back to the value
//! declared at the next-enclosing scope, down to the built-in defaults.

pub mod defaults; // Built-in default parameter set
pub mod resolver; // Scope-chain walk and deep merge
pub mod schema; // Validation of a resolved set against the recognized keys
pub mod store; // One parameter file held in memory, with its scope
