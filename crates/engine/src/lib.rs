//! External tool invocation for the reconstruction pipeline.
//!
//! [`tools`] declares the catalog of external programs with their fixed
//! required-parameter sets and argument templates; [`supervisor`] spawns
//! and supervises them, streaming output and supporting best-effort
//! termination. A deterministic replay mode substitutes canned transcripts
//! so the test suite never depends on the real tools being installed.

pub mod supervisor;
pub mod tools;

pub use supervisor::{EngineMode, Invocation, ProcessHandle, SupervisedRun, Supervisor};
pub use tools::Tool;
