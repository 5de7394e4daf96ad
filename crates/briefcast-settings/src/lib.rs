//! # briefcast-settings
//!
//! Layered configuration for the briefcast server.
//!
//! Settings come from three layers, lowest priority first:
//! 1. **Compiled defaults**: [`BriefcastSettings::default()`]
//! 2. **Settings file**: `$BRIEFCAST_SETTINGS` or `~/.briefcast/settings.json`,
//!    deep-merged over the defaults
//! 3. **Environment**: `BRIEFCAST_*` overrides
//!
//! Settings are loaded once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{BriefcastSettings, BusBackend, BusSettings, LoggingSettings, ServerSettings};
