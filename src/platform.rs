//! Platform-specific directories.
//!
//! All functions fall back to a usable path when the platform directory
//! can't be determined, so callers never have to handle `None`.

use std::path::PathBuf;

const APP_DIR: &str = "invscan";

/// Returns the cache directory for invscan.
///
/// Platform-specific locations:
/// - Linux: `~/.cache/invscan/`
/// - macOS: `~/Library/Caches/invscan/`
/// - Windows: `%LOCALAPPDATA%\invscan\`
///
/// Falls back to `/tmp/invscan/` if no cache directory can be determined.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join(APP_DIR)
}

/// Returns the configuration directory for invscan.
///
/// Platform-specific locations:
/// - Linux: `~/.config/invscan/`
/// - macOS: `~/Library/Application Support/invscan/`
/// - Windows: `%APPDATA%\invscan\`
///
/// Falls back to `./invscan/` if no config directory can be determined.
pub fn config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// Path of the persisted OSV response cache.
pub fn vuln_cache_path() -> PathBuf {
    cache_dir().join("osv.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_end_with_app_name() {
        assert!(cache_dir().ends_with(APP_DIR));
        assert!(config_dir().ends_with(APP_DIR));
        assert!(vuln_cache_path().starts_with(cache_dir()));
    }
}
