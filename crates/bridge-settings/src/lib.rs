//! # bridge-settings
//!
//! Layered configuration for the session bridge.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **Settings file**: `~/.bridge/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `BRIDGE_*` overrides
//!
//! The result is validated before it is returned. Nothing is cached
//! globally; callers pass the loaded value down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, load_with_env,
    settings_path,
};
pub use types::{BridgeSettings, CommandSettings, LoggingSettings, ServerSettings, SessionSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_points_into_dot_bridge() {
        let path = settings_path();
        assert!(path.ends_with(".bridge/settings.json"));
    }
}
