//! # courier-settings
//!
//! Layered configuration for the courier relay.
//!
//! Settings are loaded from these layers (in priority order):
//! 1. **Compiled defaults**: [`CourierSettings::default()`]
//! 2. **Settings file**: `~/.courier/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `COURIER_*` overrides
//!
//! The binary applies command-line flags on top.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
    validate,
};
pub use types::*;
