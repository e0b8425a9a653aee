//! # nsboot-settings
//!
//! Layered configuration for the NSBoot dashboard client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DashboardSettings::default()`]
//! 2. **User file**: `~/.nsboot/dashboard.json` (deep-merged over defaults)
//! 3. **Environment variables**: `NSBOOT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings_from_path, load_with, settings_path};
pub use types::{DashboardSettings, LoggingSettings, RealtimeSettings};
