//! This module contains all the sub-modules of the project.

pub mod config; // Configuration module: Scoped parameter stores, defaults, resolution and validation.
pub mod define; // Definition module: Contains definitions and constants used throughout the project.
pub mod skeleton; // Skeleton module: Named joint trees for the supported pose models.
pub mod util; // Utility module: Provides various utility functions and helpers.
pub mod wizard; // Wizard module: Initial setup sequence producing the run settings.
