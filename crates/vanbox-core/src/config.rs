//! Client configuration.
//!
//! `VanboxConfig` carries the public Supabase endpoint and anon key plus the
//! knobs of the entry lifecycle. Secret credentials must never be stored here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{AuthResult, OAuthRedirect, SessionPersistence, SupabaseAuthClient};
use crate::controller::LifecycleConfig;
use crate::error::StoreResult;
use crate::models::MAX_CONTENT_CHARS;
use crate::store::{SupabaseEntryStore, DEFAULT_ENTRIES_TABLE};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_OAUTH_PROVIDER: &str = "google";
const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config field '{field}' {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VanboxConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub site_url: String,
    #[serde(default = "default_entries_table")]
    pub entries_table: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_oauth_provider")]
    pub oauth_provider: String,
    #[serde(default = "default_callback_path")]
    pub auth_callback_path: String,
}

fn default_entries_table() -> String {
    DEFAULT_ENTRIES_TABLE.to_string()
}

const fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

const fn default_max_content_chars() -> usize {
    MAX_CONTENT_CHARS
}

fn default_oauth_provider() -> String {
    DEFAULT_OAUTH_PROVIDER.to_string()
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

impl VanboxConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()
    }

    /// Normalize fields and reject unusable values.
    pub fn validate(self) -> Result<Self, ConfigError> {
        let supabase_url = normalize_http_url(self.supabase_url, "supabase_url")?;
        let site_url = normalize_http_url(self.site_url, "site_url")?;
        let supabase_anon_key = required(self.supabase_anon_key, "supabase_anon_key")?;
        let entries_table = required(self.entries_table, "entries_table")?;
        let oauth_provider = required(self.oauth_provider, "oauth_provider")?;
        let auth_callback_path = required(self.auth_callback_path, "auth_callback_path")?;
        if !auth_callback_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "auth_callback_path",
                reason: "must start with '/'",
            });
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "history_limit",
                reason: "must be at least 1",
            });
        }
        if self.max_content_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "max_content_chars",
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            site_url,
            entries_table,
            history_limit: self.history_limit,
            max_content_chars: self.max_content_chars,
            oauth_provider,
            auth_callback_path,
        })
    }

    #[must_use]
    pub const fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            history_limit: self.history_limit,
            max_content_chars: self.max_content_chars,
        }
    }

    #[must_use]
    pub fn oauth_redirect(&self) -> OAuthRedirect {
        OAuthRedirect {
            provider: self.oauth_provider.clone(),
            site_url: self.site_url.clone(),
            callback_path: self.auth_callback_path.clone(),
        }
    }

    pub fn entry_store(&self) -> StoreResult<SupabaseEntryStore> {
        SupabaseEntryStore::new(
            &self.supabase_url,
            self.supabase_anon_key.clone(),
            self.entries_table.clone(),
        )
    }

    pub fn auth_client<S: SessionPersistence>(
        &self,
        persistence: S,
    ) -> AuthResult<SupabaseAuthClient<S>> {
        Ok(
            SupabaseAuthClient::new(&self.supabase_url, self.supabase_anon_key.clone(), persistence)?
                .with_redirect(self.oauth_redirect()),
        )
    }
}

fn required(raw: String, field: &'static str) -> Result<String, ConfigError> {
    normalize_text_option(Some(raw)).ok_or(ConfigError::Invalid {
        field,
        reason: "is required",
    })
}

fn normalize_http_url(raw: String, field: &'static str) -> Result<String, ConfigError> {
    let value = required(raw, field)?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must include http:// or https://",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemorySessionStore;

    const MINIMAL: &str = r#"
    {
      "supabase_url": "https://project.supabase.co/",
      "supabase_anon_key": " anon ",
      "site_url": "https://vanbox.app"
    }
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = VanboxConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.supabase_url, "https://project.supabase.co");
        assert_eq!(config.supabase_anon_key, "anon");
        assert_eq!(config.entries_table, "entries");
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.max_content_chars, 5000);
        assert_eq!(config.oauth_provider, "google");
        assert_eq!(config.auth_callback_path, "/auth/callback");
    }

    #[test]
    fn rejects_unknown_fields() {
        let payload = r#"
        {
          "supabase_url": "https://project.supabase.co",
          "supabase_anon_key": "anon",
          "site_url": "https://vanbox.app",
          "service_role_key": "nope"
        }
        "#;
        let error = VanboxConfig::from_json(payload).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_url_without_scheme() {
        let payload = r#"
        {
          "supabase_url": "project.supabase.co",
          "supabase_anon_key": "anon",
          "site_url": "https://vanbox.app"
        }
        "#;
        let error = VanboxConfig::from_json(payload).unwrap_err();
        assert!(error.to_string().contains("supabase_url"));
    }

    #[test]
    fn rejects_zero_history_limit() {
        let payload = r#"
        {
          "supabase_url": "https://project.supabase.co",
          "supabase_anon_key": "anon",
          "site_url": "https://vanbox.app",
          "history_limit": 0
        }
        "#;
        assert!(matches!(
            VanboxConfig::from_json(payload),
            Err(ConfigError::Invalid {
                field: "history_limit",
                ..
            })
        ));
    }

    #[test]
    fn builds_clients_from_config() {
        let config = VanboxConfig::from_json(MINIMAL).unwrap();
        let store = config.entry_store().unwrap();
        assert_eq!(store.table_url(), "https://project.supabase.co/rest/v1/entries");

        let auth = config.auth_client(MemorySessionStore::default()).unwrap();
        let url = auth.authorize_url("/").unwrap();
        assert!(url.starts_with("https://project.supabase.co/auth/v1/authorize?provider=google"));

        assert_eq!(config.lifecycle().history_limit, 20);
    }
}
