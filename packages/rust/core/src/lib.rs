//! Core pipeline orchestration for absorber.
//!
//! This crate ties acquisition and extraction together into a batch run
//! ([`Orchestrator::run`]), then compares the normalized sources for
//! conflicting claims and renders the text report.

pub mod conflicts;
pub mod orchestrator;
pub mod report;

pub use conflicts::{ConflictStrategy, HeuristicDetector};
pub use orchestrator::{Orchestrator, ProgressReporter, SilentProgress};
pub use report::render_text;
