//! Testing utilities for dubflow stages.
//!
//! This module provides:
//! - A scripted service set with deterministic, observable transforms
//! - A series fixture that wires config, store and context over one directory

mod fixtures;
mod scripted;

pub use fixtures::TestSeries;
pub use scripted::ScriptedServices;
