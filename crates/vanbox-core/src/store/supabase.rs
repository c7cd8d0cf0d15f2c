//! Supabase (PostgREST) entry store.

use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::{DeleteReport, EntryQuery, EntryStore, SortOrder};
use crate::auth::AuthSession;
use crate::error::{StoreError, StoreResult};
use crate::models::{Entry, EntryId, NewEntry};
use crate::util::{compact_text, normalize_base_url};

/// Table holding entries unless configured otherwise.
pub const DEFAULT_ENTRIES_TABLE: &str = "entries";

const ENTRY_COLUMNS: &str = "id,content,created_at_user_tz,created_at_utc";

/// HTTP client for the entries table behind Supabase's REST API.
#[derive(Debug, Clone)]
pub struct SupabaseEntryStore {
    rest_url: String,
    anon_key: String,
    table: String,
    client: reqwest::Client,
}

impl SupabaseEntryStore {
    pub fn new(
        url: impl AsRef<str>,
        anon_key: impl Into<String>,
        table: impl Into<String>,
    ) -> StoreResult<Self> {
        let rest_url = normalize_rest_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(StoreError::InvalidConfiguration(
                "Supabase anon key must not be empty".to_string(),
            ));
        }
        let table = table.into().trim().to_string();
        if table.is_empty() {
            return Err(StoreError::InvalidConfiguration(
                "entries table name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            rest_url,
            anon_key,
            table,
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Returns the table endpoint this store talks to.
    pub fn table_url(&self) -> String {
        format!("{}/{}", self.rest_url, self.table)
    }

    fn authorized(&self, request: RequestBuilder, session: &AuthSession) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
    }
}

impl EntryStore for SupabaseEntryStore {
    async fn insert(&self, session: &AuthSession, entry: &NewEntry) -> StoreResult<Entry> {
        let row = InsertRow {
            user_id: &session.user.id,
            content: &entry.content,
            created_at_user_tz: &entry.created_at_user_tz,
        };
        let request = self
            .authorized(self.client.post(self.table_url()), session)
            .query(&[("select", ENTRY_COLUMNS)])
            .header("Prefer", "return=representation")
            .json(&row);

        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;
        let mut rows = serde_json::from_str::<Vec<Entry>>(&body)?;
        if rows.is_empty() {
            return Err(StoreError::Api {
                status: 201,
                message: "insert returned no row".to_string(),
            });
        }
        Ok(rows.swap_remove(0))
    }

    async fn select(&self, session: &AuthSession, query: EntryQuery) -> StoreResult<Vec<Entry>> {
        let request = self
            .authorized(self.client.get(self.table_url()), session)
            .query(&select_params(&session.user.id, query));

        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn delete(&self, session: &AuthSession, id: &EntryId) -> StoreResult<DeleteReport> {
        let request = self
            .authorized(self.client.delete(self.table_url()), session)
            .query(&delete_params(&session.user.id, id))
            .header("Prefer", "return=representation");

        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;
        let removed = serde_json::from_str::<Vec<serde_json::Value>>(&body)?.len();
        if removed == 0 {
            tracing::warn!("Delete of entry {} matched no rows", id);
        }
        Ok(DeleteReport { removed })
    }
}

/// Normalize a project URL into its REST endpoint.
pub fn normalize_rest_url(url: &str) -> StoreResult<String> {
    let base = normalize_base_url(url).ok_or_else(|| {
        StoreError::InvalidConfiguration(
            "Supabase URL must include http:// or https://".to_string(),
        )
    })?;
    if base.ends_with("/rest/v1") {
        Ok(base)
    } else {
        Ok(format!("{base}/rest/v1"))
    }
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    content: &'a str,
    created_at_user_tz: &'a str,
}

fn select_params(user_id: &str, query: EntryQuery) -> Vec<(&'static str, String)> {
    let order = match query.order {
        SortOrder::NewestFirst => "created_at_utc.desc",
        SortOrder::OldestFirst => "created_at_utc.asc",
    };
    let mut params = vec![
        ("select", ENTRY_COLUMNS.to_string()),
        ("user_id", format!("eq.{user_id}")),
        ("order", order.to_string()),
    ];
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

fn delete_params(user_id: &str, id: &EntryId) -> Vec<(&'static str, String)> {
    vec![
        ("id", format!("eq.{id}")),
        ("user_id", format!("eq.{user_id}")),
    ]
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

async fn ensure_success(response: Response) -> StoreResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status,
        message: parse_api_error(&body),
    })
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestError>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            return compact_text(&message);
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed
    }
}
