//! This module provides miscellaneous utilities.

pub mod path; // Path module
