//! Shared fixtures for the ShelfDB benchmarks.

pub mod utils;
