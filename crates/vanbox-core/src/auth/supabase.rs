//! Supabase auth client: OAuth redirect, callback session, refresh, sign-out.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{AuthError, AuthResult, AuthSession, AuthUser, SessionPersistence};
use crate::util::normalize_base_url;

/// Where the identity provider sends the browser back after sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRedirect {
    pub provider: String,
    pub site_url: String,
    pub callback_path: String,
}

#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    auth_url: String,
    anon_key: String,
    redirect: Option<OAuthRedirect>,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            redirect: None,
            client: Client::builder().build()?,
            store,
        })
    }

    #[must_use]
    pub fn with_redirect(mut self, redirect: OAuthRedirect) -> Self {
        self.redirect = Some(redirect);
        self
    }

    /// URL the browser should navigate to in order to sign in.
    ///
    /// After the provider round-trip the user lands on the callback path with
    /// `next=<return_path>` so the host can resume where sign-in started.
    pub fn authorize_url(&self, return_path: &str) -> AuthResult<String> {
        let redirect = self.redirect.as_ref().ok_or(AuthError::NotConfigured)?;
        let site_url = normalize_base_url(&redirect.site_url).ok_or(
            AuthError::InvalidConfiguration("Site URL must include http:// or https://"),
        )?;
        let return_path = if return_path.starts_with('/') {
            return_path
        } else {
            "/"
        };
        let redirect_to = format!(
            "{site_url}{}?next={}",
            redirect.callback_path,
            urlencoding::encode(return_path)
        );
        Ok(format!(
            "{}/authorize?provider={}&redirect_to={}",
            self.auth_url,
            urlencoding::encode(&redirect.provider),
            urlencoding::encode(&redirect_to)
        ))
    }

    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    /// Complete sign-in from the URL fragment the provider redirected back with.
    pub async fn session_from_redirect(&self, fragment: &str) -> AuthResult<AuthSession> {
        let tokens = RedirectTokens::parse(fragment)?;
        let user = self.get_user(&tokens.access_token).await?;
        let session = AuthSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            user,
        };

        self.store.save_session(&session)?;
        Ok(session)
    }

    pub async fn get_user(&self, access_token: &str) -> AuthResult<AuthUser> {
        let request = self
            .client
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<SupabaseUser>().await?.into())
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        let session = response
            .json::<SupabaseAuthResponse>()
            .await?
            .into_session()?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let request = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);

        let response = request.send().await?;
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        self.store.clear_session()?;
        Ok(())
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let base = normalize_base_url(url).ok_or(AuthError::InvalidConfiguration(
        "Supabase URL must include http:// or https://",
    ))?;
    if base.ends_with("/auth/v1") {
        Ok(base)
    } else {
        Ok(format!("{base}/auth/v1"))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct RedirectTokens {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

impl RedirectTokens {
    fn parse(fragment: &str) -> AuthResult<Self> {
        let fragment = fragment.trim().trim_start_matches('#');
        let mut access_token = None;
        let mut refresh_token = None;
        let mut expires_at = None;
        let mut expires_in = None;
        let mut error_description = None;

        for pair in fragment.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(&value.replace('+', " "))
                .map_err(|_| AuthError::Api("Redirect fragment is not valid UTF-8".to_string()))?
                .into_owned();
            match key {
                "access_token" => access_token = Some(value),
                "refresh_token" => refresh_token = Some(value),
                "expires_at" => expires_at = value.parse::<i64>().ok(),
                "expires_in" => expires_in = value.parse::<i64>().ok(),
                "error_description" => error_description = Some(value),
                _ => {}
            }
        }

        if let Some(description) = error_description {
            return Err(AuthError::Api(description));
        }

        let expires_at = expires_at.or_else(|| {
            expires_in.map(|expires_in| chrono::Utc::now().timestamp().saturating_add(expires_in))
        });

        match (access_token, refresh_token, expires_at) {
            (Some(access_token), Some(refresh_token), Some(expires_at)) => Ok(Self {
                access_token,
                refresh_token,
                expires_at,
            }),
            _ => Err(AuthError::Api(
                "Redirect did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

impl SupabaseAuthResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|expires_in| chrono::Utc::now().timestamp().saturating_add(expires_in))
        });

        match (self.access_token, self.refresh_token, expires_at, self.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user: user.into(),
                })
            }
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<SupabaseUserMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct SupabaseUserMetadata {
    full_name: Option<String>,
    avatar_url: Option<String>,
}

impl From<SupabaseUser> for AuthUser {
    fn from(value: SupabaseUser) -> Self {
        let metadata = value.user_metadata.unwrap_or_default();
        Self {
            id: value.id,
            email: value.email,
            full_name: metadata.full_name,
            avatar_url: metadata.avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
