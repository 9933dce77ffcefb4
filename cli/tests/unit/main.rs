//! Unit tests for shipyard CLI
//!
//! These tests use mocked ports and run fast without external I/O.

mod architecture;
mod mocks;
mod property_tests;
mod version_resolver;
