//! Integration test suite entry point.

mod classification_tests;
mod config_tests;
mod protocol_tests;
mod workflow_tests;
