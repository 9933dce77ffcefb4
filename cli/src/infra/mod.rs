//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, SSH and
//! docker sessions, artifact inspection, HTTP probes, and configuration
//! loading.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod artifacts;
pub mod command_runner;
pub mod config;
pub mod http;
pub mod registry;
pub mod ssh;
