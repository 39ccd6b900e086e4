//! Panoforge - panorama derivative builder
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod manifest;
pub mod scheduler;
