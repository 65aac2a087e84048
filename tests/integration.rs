//! Integration tests entry point
//!
//! This file serves as the entry point for all integration tests.
//! It includes the integration_tests module which contains:
//! - End-to-end pipeline tests
//! - Error scenario tests

mod common;
mod integration_tests;
