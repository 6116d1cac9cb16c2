//! Where k6hub keeps its files.
//!
//! Two locations matter to the hub: the user configuration read by
//! `k6hub serve` and the SQLite database that holds the agent fleet and
//! task queue. Both follow the XDG base directory layout so a daemon
//! started from a service manager and an operator's shell agree on paths.

use std::path::PathBuf;

/// File name of the SQLite database inside [`data_dir`].
pub const DATABASE_FILE: &str = "k6hub.db";

/// File name of the user configuration inside [`config_dir`].
pub const CONFIG_FILE: &str = "config.toml";

const APP_DIR: &str = "k6hub";

/// Resolve `$<env_var>/k6hub`, falling back to `<home>/<home_suffix>/k6hub`.
///
/// An empty variable counts as unset, as the XDG spec requires.
fn xdg_dir(env_var: &str, home_suffix: &str) -> PathBuf {
    match std::env::var_os(env_var) {
        Some(base) if !base.is_empty() => PathBuf::from(base).join(APP_DIR),
        _ => dirs::home_dir()
            .unwrap_or_default()
            .join(home_suffix)
            .join(APP_DIR),
    }
}

/// Directory holding [`CONFIG_FILE`]: `$XDG_CONFIG_HOME/k6hub` or `~/.config/k6hub`.
///
/// ```
/// let dir = k6hub_paths::config_dir();
/// assert!(dir.ends_with("k6hub"));
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// The user-level configuration file merged under any project file.
pub fn config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Directory holding the fleet database: `$XDG_DATA_HOME/k6hub` or `~/.local/share/k6hub`.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Database used when `[storage] database` is not configured.
///
/// The directory may not exist yet; `k6hub serve` creates it before
/// opening the store.
pub fn default_database_path() -> PathBuf {
    data_dir().join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
        unsafe {
            std::env::set_var(key, value);
        }
        let out = f();
        unsafe {
            std::env::remove_var(key);
        }
        out
    }

    #[test]
    #[serial]
    fn test_database_lives_under_xdg_data_home() {
        let path = with_env("XDG_DATA_HOME", "/srv/state", default_database_path);
        assert_eq!(path, PathBuf::from("/srv/state/k6hub/k6hub.db"));
    }

    #[test]
    #[serial]
    fn test_config_file_under_xdg_config_home() {
        let path = with_env("XDG_CONFIG_HOME", "/etc/xdg", config_file);
        assert_eq!(path, PathBuf::from("/etc/xdg/k6hub/config.toml"));
    }

    #[test]
    #[serial]
    fn test_empty_xdg_variable_falls_back_to_home() {
        let path = with_env("XDG_DATA_HOME", "", data_dir);
        assert!(path.ends_with(".local/share/k6hub"));
    }

    #[test]
    #[serial]
    fn test_default_database_path_is_inside_data_dir() {
        let path = default_database_path();
        assert!(path.starts_with(data_dir()));
        assert!(path.ends_with(DATABASE_FILE));
    }
}
