//! Persisted application state
//!
//! Loaded once at startup and saved after each user action that changes it:
//! - last selected view
//! - theme preference
//! - per-provider API keys entered by the user (plain text, not secured)

use crate::credentials::CredentialPool;
use crate::playground::KeyStatus;
use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Home,
    Chat,
    Explorer,
    Comparison,
    Calculator,
    Benchmarks,
    Playground,
    Learn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("Unknown theme '{}'. Use dark or light.", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub current_view: View,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub provider_keys: BTreeMap<ProviderKind, String>,
    /// Outcome of the last check of each stored key
    #[serde(default)]
    pub key_status: BTreeMap<ProviderKind, KeyStatus>,
}

impl AppState {
    /// Load state from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from));

        match parsed {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable state file");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "Saved application state");
        Ok(())
    }

    pub fn set_view(&mut self, view: View) {
        self.current_view = view;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    /// Store a key; an empty key removes the entry
    pub fn set_key(&mut self, provider: ProviderKind, key: &str) {
        let key = key.trim();
        if key.is_empty() {
            self.provider_keys.remove(&provider);
            self.key_status.remove(&provider);
        } else {
            self.provider_keys.insert(provider, key.to_string());
            self.key_status.insert(provider, KeyStatus::for_key(key));
        }
    }

    pub fn key(&self, provider: ProviderKind) -> Option<&str> {
        self.provider_keys.get(&provider).map(String::as_str)
    }

    pub fn key_status(&self, provider: ProviderKind) -> KeyStatus {
        self.key_status
            .get(&provider)
            .copied()
            .unwrap_or(KeyStatus::Idle)
    }

    /// Update the stored key's status after a playground run.
    /// Runs on environment keys leave the status untouched.
    pub fn record_run(&mut self, provider: ProviderKind, succeeded: bool) -> KeyStatus {
        let Some(key) = self.provider_keys.get(&provider) else {
            return KeyStatus::Idle;
        };
        let status = KeyStatus::after_run(key, succeeded);
        self.key_status.insert(provider, status);
        status
    }

    /// Credentials for a playground run: the stored key, or the
    /// provider's environment keys when none was entered
    pub fn pool_for(&self, provider: ProviderKind) -> CredentialPool {
        match self.key(provider) {
            Some(key) => CredentialPool::new([key]),
            None => CredentialPool::from_env(provider.key_env()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::load_from(&dir.path().join("state.json"));
        assert_eq!(state, AppState::default());
        assert_eq!(state.theme, Theme::Dark);
        assert_eq!(state.current_view, View::Home);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = AppState::default();
        state.set_view(View::Playground);
        state.toggle_theme();
        state.set_key(ProviderKind::Anthropic, " sk-ant-abcdefghijk ");
        state.save_to(&path).unwrap();

        let loaded = AppState::load_from(&path);
        assert_eq!(loaded.current_view, View::Playground);
        assert_eq!(loaded.theme, Theme::Light);
        assert_eq!(loaded.key(ProviderKind::Anthropic), Some("sk-ant-abcdefghijk"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"anthropic\""));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(AppState::load_from(&path), AppState::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"theme":"light"}"#).unwrap();

        let state = AppState::load_from(&path);
        assert_eq!(state.theme, Theme::Light);
        assert_eq!(state.current_view, View::Home);
        assert!(state.provider_keys.is_empty());
    }

    #[test]
    fn test_empty_key_removes_entry() {
        let mut state = AppState::default();
        state.set_key(ProviderKind::Groq, "gsk_0123456789");
        state.set_key(ProviderKind::Groq, "  ");
        assert_eq!(state.key(ProviderKind::Groq), None);
    }

    #[test]
    fn test_stored_key_pool() {
        let mut state = AppState::default();
        state.set_key(ProviderKind::Mistral, "mistral-key-0123456");
        let pool = state.pool_for(ProviderKind::Mistral);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(0), Some("mistral-key-0123456"));
    }

    #[test]
    fn test_failed_run_marks_key_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = AppState::default();
        state.set_key(ProviderKind::Groq, "gsk_0123456789");
        assert_eq!(state.key_status(ProviderKind::Groq), KeyStatus::Valid);

        assert_eq!(state.record_run(ProviderKind::Groq, false), KeyStatus::Invalid);
        state.save_to(&path).unwrap();
        let loaded = AppState::load_from(&path);
        assert_eq!(loaded.key_status(ProviderKind::Groq), KeyStatus::Invalid);

        // Entering a new key starts over
        state.set_key(ProviderKind::Groq, "gsk_9876543210");
        assert_eq!(state.key_status(ProviderKind::Groq), KeyStatus::Valid);

        // No stored key: nothing recorded
        assert_eq!(state.record_run(ProviderKind::OpenAi, false), KeyStatus::Idle);
        assert!(!state.key_status.contains_key(&ProviderKind::OpenAi));
    }

    #[test]
    fn test_theme_parsing() {
        assert_eq!("LIGHT".parse::<Theme>(), Ok(Theme::Light));
        assert!("blue".parse::<Theme>().is_err());
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }
}
