//! sieve - interactive multi-bucket relevance feedback over a fixed corpus.
//!
//! A user sorts suggested items into buckets; each bucket retrains a linear
//! classifier on its members and suggests more items like them, blended
//! with nearest-neighbour and exploratory suggestions.

pub mod app;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod session;
pub mod test_utils;

pub use error::{Result, SieveError};
