//! debug-collector - a local log collection endpoint for debugging sessions.
//!
//! Instrumented code posts structured log entries tagged with a session id;
//! the collector appends each one as a JSON line to that session's file under
//! `<project>/.debug/`.

pub mod api;
pub mod config;
pub mod guard;
pub mod server;
pub mod session;
pub mod sink;
