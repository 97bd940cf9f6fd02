//! Application and UI configuration, loaded from TOML.
//!
//! Replaces the original's `AppConfig`/`UiConfig` process-wide singletons
//! with a single value threaded through construction (`SPEC_FULL.md` §9):
//! unknown keys are dropped on load, known keys silently keep their default
//! on a parse error rather than aborting startup (§7).

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// `app.conf` — backend/profile plumbing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: String,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_attachment_send_type")]
    pub attachment_send_type: String,

    #[serde(default = "default_true")]
    pub attachment_prompt: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            proxy: None,
            cache_enabled: default_true(),
            attachment_send_type: default_attachment_send_type(),
            attachment_prompt: default_true(),
        }
    }
}

/// `ui.conf` — behaviors consumed directly by the UI Model (§4.3).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_true")]
    pub mark_read_on_view: bool,

    #[serde(default)]
    pub mark_read_when_inactive: bool,

    #[serde(default)]
    pub mark_read_any_chat: bool,

    #[serde(default)]
    pub home_fetch_all: bool,

    #[serde(default = "default_true")]
    pub typing_status_share: bool,

    /// Terminal focused, message arrived in the chat currently on screen.
    #[serde(default = "default_true")]
    pub desktop_notify_active_current: bool,

    /// Terminal focused, message arrived in a chat other than the one on
    /// screen.
    #[serde(default = "default_true")]
    pub desktop_notify_active_noncurrent: bool,

    #[serde(default = "default_true")]
    pub desktop_notify_inactive: bool,

    #[serde(default)]
    pub terminal_bell_active: bool,

    #[serde(default = "default_true")]
    pub terminal_bell_inactive: bool,

    #[serde(default = "default_true")]
    pub undo_clear_input: bool,

    #[serde(default)]
    pub muted_position_by_timestamp: bool,

    #[serde(default = "default_true")]
    pub emoji_enabled: bool,

    #[serde(default = "default_true")]
    pub list_enable_colors: bool,

    /// Lines of history visible at once; drives the fetch-loop formulas.
    #[serde(default = "default_history_lines")]
    pub history_lines: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            mark_read_on_view: default_true(),
            mark_read_when_inactive: false,
            mark_read_any_chat: false,
            home_fetch_all: false,
            typing_status_share: default_true(),
            desktop_notify_active_current: default_true(),
            desktop_notify_active_noncurrent: default_true(),
            desktop_notify_inactive: default_true(),
            terminal_bell_active: false,
            terminal_bell_inactive: default_true(),
            undo_clear_input: default_true(),
            muted_position_by_timestamp: false,
            emoji_enabled: default_true(),
            list_enable_colors: default_true(),
            history_lines: default_history_lines(),
        }
    }
}

/// Command templates for external programs (§4.5): opening links and
/// attachments, the pager, the editor and the spell-checker. `%1` is
/// substituted with the target path or URL; a template ending in `&` backs
/// the command off into the background instead of suspending the terminal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalConfig {
    #[serde(default = "default_link_command")]
    pub link_command: String,

    #[serde(default = "default_attachment_command")]
    pub attachment_command: String,

    #[serde(default = "default_pager_command")]
    pub pager_command: String,

    #[serde(default = "default_editor_command")]
    pub editor_command: String,

    #[serde(default = "default_spellcheck_command")]
    pub spellcheck_command: String,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            link_command: default_link_command(),
            attachment_command: default_attachment_command(),
            pager_command: default_pager_command(),
            editor_command: default_editor_command(),
            spellcheck_command: default_spellcheck_command(),
        }
    }
}

fn default_link_command() -> String {
    "xdg-open %1 &".to_string()
}

fn default_attachment_command() -> String {
    "xdg-open %1 &".to_string()
}

fn default_pager_command() -> String {
    std::env::var("PAGER").map(|pager| format!("{pager} %1")).unwrap_or_else(|_| "less %1".to_string())
}

fn default_editor_command() -> String {
    std::env::var("EDITOR").map(|editor| format!("{editor} %1")).unwrap_or_else(|_| "vi %1".to_string())
}

fn default_spellcheck_command() -> String {
    "aspell -c %1".to_string()
}

/// Combined configuration threaded through the app shell and Model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub ui: UiConfig,

    #[serde(default)]
    pub external: ExternalConfig,
}

fn default_true() -> bool {
    true
}

fn default_profiles_dir() -> String {
    "profiles".to_string()
}

fn default_attachment_send_type() -> String {
    "file".to_string()
}

fn default_history_lines() -> usize {
    20
}

impl Config {
    /// Resolution order: `NCHAT_CONFIG` env var, `./nchat.toml`,
    /// `~/.config/nchat/nchat.toml`, else built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`]/[`ConfigError::ParseError`] only if a
    /// *located* file cannot be read or parsed; a missing file at any
    /// location is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("NCHAT_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                return Self::load_from(p);
            }
        }

        let local = PathBuf::from("nchat.toml");
        if local.exists() {
            return Self::load_from(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config/nchat/nchat.toml");
            if user_config.exists() {
                return Self::load_from(user_config);
            }
        }

        Ok(Self::default())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if `path` cannot be read, or
    /// [`ConfigError::ParseError`] if it is not valid TOML.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert!(config.ui.mark_read_on_view);
        assert!(!config.ui.mark_read_any_chat);
        assert!(!config.ui.home_fetch_all);
        assert_eq!(config.ui.history_lines, 20);
    }

    #[test]
    fn unknown_keys_are_silently_dropped() {
        let toml = r#"
[ui]
mark_read_on_view = false
this_key_does_not_exist = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.ui.mark_read_on_view);
    }

    #[test]
    fn partial_section_keeps_remaining_defaults() {
        let toml = r#"
[ui]
home_fetch_all = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.ui.home_fetch_all);
        assert!(config.ui.mark_read_on_view); // default retained
    }

    #[test]
    fn load_from_nonexistent_file_errors() {
        let result = Config::load_from("/nonexistent/nchat.toml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }

    #[test]
    fn external_commands_substitute_percent_one() {
        let config = ExternalConfig::default();
        assert!(config.link_command.contains("%1"));
        assert!(config.attachment_command.ends_with('&'));
    }

    #[test]
    fn external_pager_command_prefers_env_var() {
        // SAFETY: test runs single-threaded; no other test reads PAGER.
        unsafe {
            std::env::set_var("PAGER", "most");
        }
        assert_eq!(default_pager_command(), "most %1");
        unsafe {
            std::env::remove_var("PAGER");
        }
    }

    #[test]
    fn load_from_invalid_toml_errors() {
        use std::io::Write;
        let path = std::env::temp_dir().join("nchat_invalid_config_test.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[ui]\nhome_fetch_all = [").unwrap();
        drop(file);

        let result = Config::load_from(&path);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
        std::fs::remove_file(&path).ok();
    }
}
