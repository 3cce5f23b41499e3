// ABOUTME: Credential resolution for repository remotes
// Secrets come from an injected store (system keychain via keyring, or in-memory)
// and are resolved once per RepositoryKey into a shared callback

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DEFAULT_SERVICE_NAME: &str = "gitvfs";

/// Identity of a remote repository and the names of the secrets that unlock it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryKey {
    pub url: String,
    pub is_public: bool,
    pub read_secret: Option<String>,
    pub write_secret: Option<String>,
}

impl RepositoryKey {
    pub fn new(url: impl Into<String>, is_public: bool) -> Self {
        Self {
            url: url.into(),
            is_public,
            read_secret: None,
            write_secret: None,
        }
    }

    pub fn with_secrets(mut self, read: Option<String>, write: Option<String>) -> Self {
        self.read_secret = read;
        self.write_secret = write;
        self
    }

    /// Secret ids ordered strongest to weakest
    pub fn secret_keys(&self) -> Vec<String> {
        self.write_secret
            .iter()
            .chain(self.read_secret.iter())
            .cloned()
            .collect()
    }
}

/// A stored secret. The username is optional; most token hosts accept any user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub username: Option<String>,
    pub value: String,
}

/// Kind of credential the engine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    UserPass,
    SshKey,
    Default,
}

impl From<git2::CredentialType> for CredentialKind {
    fn from(allowed: git2::CredentialType) -> Self {
        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            CredentialKind::UserPass
        } else if allowed.contains(git2::CredentialType::SSH_KEY) {
            CredentialKind::SshKey
        } else {
            CredentialKind::Default
        }
    }
}

/// Resolved credentials handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

/// `(url, user, kind) -> credentials`, shared by fetch, pull, push and clone
pub type CredentialCallback =
    Arc<dyn Fn(&str, Option<&str>, CredentialKind) -> Option<Credentials> + Send + Sync>;

/// Source of named secrets
pub trait SecretStore: Send + Sync {
    /// Return the secret for the first key that has one
    fn try_get_secret(&self, keys: &[String]) -> Result<Option<Secret>>;
}

/// Secrets kept in the system keychain, serialised as JSON
pub struct KeyringSecretStore {
    service_name: String,
}

impl KeyringSecretStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn store_secret(&self, key: &str, secret: &Secret) -> Result<()> {
        if secret.value.is_empty() {
            return Err(anyhow::anyhow!("Secret value cannot be empty"));
        }
        let entry =
            Entry::new(&self.service_name, key).context("Failed to create keyring entry")?;
        let payload = serde_json::to_string(secret)?;
        entry
            .set_password(&payload)
            .context("Failed to store secret in keychain")?;

        tracing::info!("Stored secret: {}", key);
        Ok(())
    }

    pub fn delete_secret(&self, key: &str) -> Result<()> {
        let entry =
            Entry::new(&self.service_name, key).context("Failed to create keyring entry")?;

        match entry.delete_credential() {
            Ok(()) => {
                tracing::info!("Deleted secret: {}", key);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to delete secret: {}", e)),
        }
    }

    fn get_secret(&self, key: &str) -> Result<Option<Secret>> {
        let entry =
            Entry::new(&self.service_name, key).context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(payload) => {
                tracing::debug!("Retrieved secret: {}", key);
                // Plain tokens stored by other tools are accepted as-is
                let secret = serde_json::from_str(&payload).unwrap_or(Secret {
                    username: None,
                    value: payload,
                });
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No secret found for: {}", key);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Failed to retrieve secret {}: {}", key, e);
                Err(anyhow::anyhow!("Failed to retrieve secret: {}", e))
            }
        }
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl SecretStore for KeyringSecretStore {
    fn try_get_secret(&self, keys: &[String]) -> Result<Option<Secret>> {
        for key in keys {
            if let Some(secret) = self.get_secret(key)? {
                return Ok(Some(secret));
            }
        }
        Ok(None)
    }
}

/// In-process secret store
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, secret: Secret) {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.insert(key.into(), secret);
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn try_get_secret(&self, keys: &[String]) -> Result<Option<Secret>> {
        let secrets = self
            .secrets
            .lock()
            .map_err(|_| anyhow::anyhow!("Secret store lock poisoned"))?;
        Ok(keys.iter().find_map(|key| secrets.get(key).cloned()))
    }
}

/// Builds the per-repository credential callback
pub struct CredentialResolver;

impl CredentialResolver {
    /// Resolve the secret for `key` once and capture it in a callback
    pub fn for_key(key: &RepositoryKey, store: &dyn SecretStore) -> CredentialCallback {
        let keys = key.secret_keys();
        if keys.is_empty() {
            if !key.is_public {
                tracing::warn!("Private repository {} has no secret ids configured", key.url);
            }
            return Self::anonymous();
        }

        let secret = match store.try_get_secret(&keys) {
            Ok(secret) => secret,
            Err(e) => {
                tracing::warn!("Secret lookup failed for {}: {}", key.url, e);
                None
            }
        };

        let Some(secret) = secret else {
            tracing::debug!("No secret available for {}", key.url);
            return Self::anonymous();
        };

        let url_user = username_from_url(&key.url);
        Arc::new(move |_url: &str, user: Option<&str>, _kind: CredentialKind| {
            let username = secret
                .username
                .clone()
                .or_else(|| url_user.clone())
                .or_else(|| user.map(str::to_string))
                .unwrap_or_else(|| "git".to_string());
            Some(Credentials {
                username,
                secret: secret.value.clone(),
            })
        })
    }

    /// Callback that never supplies credentials
    pub fn anonymous() -> CredentialCallback {
        Arc::new(|_: &str, _: Option<&str>, _: CredentialKind| -> Option<Credentials> { None })
    }
}

fn username_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let user = parsed.username();
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}
