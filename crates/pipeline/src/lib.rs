//! Pipeline construction.
//!
//! [`build_pipeline`] is a pure function from a task's request shape to a
//! declarative, ordered list of [`StageSpec`]s. It is fully decoupled
//! from execution so pipeline composition can be unit-tested without
//! spawning anything.

pub mod builder;
pub mod stage;

pub use builder::{build_pipeline, PipelineContext, TestHooks};
pub use stage::StageSpec;
