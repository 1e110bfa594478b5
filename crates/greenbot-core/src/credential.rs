//! Credential storage
//!
//! A single opaque API key. The store is injected so the core never
//! assumes where the key lives.

use anyhow::{Result, anyhow};
use std::path::PathBuf;

use crate::config::Config;

/// Environment variables checked before the store, in order
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

pub trait CredentialStore: Send {
    fn get(&self) -> Result<Option<String>>;
    fn set(&mut self, value: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    Store,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Env => "env",
            CredentialSource::Store => "config",
        }
    }
}

/// Keeps the key in the `api_key` field of the JSON config file
#[derive(Debug, Clone)]
pub struct ConfigCredentialStore {
    path: PathBuf,
}

impl ConfigCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn get(&self) -> Result<Option<String>> {
        let config = Config::load_from(&self.path)?;
        Ok(config.api_key.filter(|key| !key.trim().is_empty()))
    }

    fn set(&mut self, value: &str) -> Result<()> {
        let key = normalize(value)?;
        let mut config = Config::load_from(&self.path)?;
        config.api_key = Some(key);
        config.save_to(&self.path)
    }

    fn clear(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut config = Config::load_from(&self.path)?;
        config.api_key = None;
        config.save_to(&self.path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    value: Option<String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.value.clone())
    }

    fn set(&mut self, value: &str) -> Result<()> {
        self.value = Some(normalize(value)?);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.value = None;
        Ok(())
    }
}

fn normalize(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Environment first, then the store
pub fn resolve_credential(store: &dyn CredentialStore) -> Result<Option<(String, CredentialSource)>> {
    let from_env = CREDENTIAL_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty());
    if let Some(key) = from_env {
        return Ok(Some((key, CredentialSource::Env)));
    }

    Ok(store.get()?.map(|key| (key, CredentialSource::Store)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = ConfigCredentialStore::new(path.clone());

        assert_eq!(store.get().unwrap(), None);
        store.set("  secret-key \n").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("secret-key"));

        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn test_config_store_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            chat_model: Some("gemini-2.0-flash".to_string()),
            ..Config::new()
        };
        config.save_to(&path).unwrap();

        let mut store = ConfigCredentialStore::new(path.clone());
        store.set("k").unwrap();
        store.clear().unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.chat_model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(loaded.api_key, None);
    }

    #[test]
    fn test_set_keeps_unreadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = ConfigCredentialStore::new(path.clone());
        assert!(store.set("k").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut store = MemoryCredentialStore::new();
        assert!(store.set("   ").is_err());
        assert_eq!(store.get().unwrap(), None);
    }

    // Only test in the crate that touches these variables
    #[test]
    fn test_resolve_prefers_env() {
        let saved: Vec<(&str, Option<String>)> = CREDENTIAL_ENV_VARS
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect();

        let mut store = MemoryCredentialStore::new();
        store.set("stored-key").unwrap();

        std::env::set_var("GEMINI_API_KEY", "env-key");
        let (key, source) = resolve_credential(&store).unwrap().unwrap();
        assert_eq!((key.as_str(), source), ("env-key", CredentialSource::Env));

        for name in CREDENTIAL_ENV_VARS {
            std::env::remove_var(name);
        }
        let (key, source) = resolve_credential(&store).unwrap().unwrap();
        assert_eq!((key.as_str(), source), ("stored-key", CredentialSource::Store));

        store.clear().unwrap();
        assert!(resolve_credential(&store).unwrap().is_none());

        for (name, value) in saved {
            if let Some(value) = value {
                std::env::set_var(name, value);
            }
        }
    }

    #[test]
    fn test_clear_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigCredentialStore::new(dir.path().join("missing.json"));
        store.clear().unwrap();
        assert!(!dir.path().join("missing.json").exists());
    }
}
