//! Configuration module for ripfleet
//!
//! Handles loading the coordinator and worker JSON config files and the
//! shared transcode policy types carried on the wire.

pub mod config;

pub use config::*;
