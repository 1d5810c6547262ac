//! HTTP intake for the terranode orchestration service.
//!
//! Thin glue only: request parsing, error mapping, and the middleware
//! stack. All task behavior lives in `terranode-task`.

pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
