//! Warden Common Library
//!
//! This crate provides shared types, defaults and configuration loading
//! utilities for the warden supervisor and its tooling.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and the top-level `WardenConfig`
//! - [`service`] - Service descriptors, statuses and info snapshots
//! - [`consts`] - System-wide defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust,no_run
//! use warden_common::config::{ConfigLoader, WardenConfig};
//! use std::path::Path;
//!
//! let config = WardenConfig::load(Path::new("warden.toml")).unwrap();
//! config.validate().unwrap();
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod service;
