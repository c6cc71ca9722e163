//! # relay-settings
//!
//! Configuration for the relay, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `$RELAY_CONFIG` or `~/.relay/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `PORT` and `RELAY_*` overrides
//!
//! The binary applies its command-line flags on top of the loaded value,
//! then validates once.
//!
//! # Usage
//!
//! ```no_run
//! let path = relay_settings::settings_path();
//! let loaded = relay_settings::load_settings(&path, |name| std::env::var(name).ok())?;
//! loaded.settings.validate()?;
//! println!("listening on port {}", loaded.settings.server.port);
//! # Ok::<(), relay_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    LoadedSettings, RejectedOverride, apply_overrides, deep_merge, load_settings, settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = RelaySettings::default();
        let _path = settings_path();
    }

    #[test]
    fn deep_merge_re_exported() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"y": 2});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
