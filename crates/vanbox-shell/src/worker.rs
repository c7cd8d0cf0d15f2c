//! Shell worker lifecycle: install, fetch handling, activation.
//!
//! Install is all-or-nothing: every precache path must load with a success
//! status before anything is written. Fetches are answered cache-first for
//! `GET`, then from the network; a navigation that cannot reach the network
//! gets the offline page. Activation drops every cache but the current one.

use std::sync::{Mutex, MutexGuard, PoisonError};

use http::{Method, StatusCode};

use crate::error::{ShellError, ShellResult};
use crate::manifest::ShellManifest;
use crate::network::Network;
use crate::request::{CachedResponse, ShellRequest};
use crate::storage::CacheStorage;

/// Served to navigations when the cached offline page is missing too.
const FALLBACK_OFFLINE_PAGE: &str = "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head><meta charset=\"utf-8\"><title>Vanbox - Offline</title></head>\n\
<body><h1>You are offline</h1><p>Reconnect to keep writing notes.</p></body>\n\
</html>\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker will never control pages
    Redundant,
}

pub struct ShellWorker<C: CacheStorage, N: Network> {
    manifest: ShellManifest,
    caches: C,
    network: N,
    state: Mutex<WorkerState>,
}

impl<C: CacheStorage, N: Network> ShellWorker<C, N> {
    pub fn new(manifest: ShellManifest, caches: C, network: N) -> Self {
        Self {
            manifest,
            caches,
            network,
            state: Mutex::new(WorkerState::Parsed),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.lock_state()
    }

    pub const fn manifest(&self) -> &ShellManifest {
        &self.manifest
    }

    pub const fn caches(&self) -> &C {
        &self.caches
    }

    /// Fetch every precache path and store them under the current cache name.
    pub async fn install(&self) -> ShellResult<()> {
        self.transition(WorkerState::Parsed, WorkerState::Installing, "install")?;
        let cache_name = self.manifest.cache_name();
        tracing::info!("Installing shell cache {cache_name}");

        let mut fetched = Vec::new();
        for path in self.manifest.precache_paths() {
            match self.precache_one(path).await {
                Ok(response) => fetched.push((path.to_string(), response)),
                Err(error) => {
                    tracing::error!("Shell install failed on {path}: {error}");
                    self.set_state(WorkerState::Redundant);
                    return Err(error);
                }
            }
        }

        tracing::debug!("Precached {} paths into {cache_name}", fetched.len());
        self.caches.put_all(&cache_name, fetched);
        self.set_state(WorkerState::Installed);
        Ok(())
    }

    /// Delete every cache other than the current one. Returns the evicted names.
    pub fn activate(&self) -> ShellResult<Vec<String>> {
        self.transition(WorkerState::Installed, WorkerState::Activating, "activate")?;

        let mut evicted = Vec::new();
        for name in self.caches.cache_names() {
            if self.manifest.is_current(&name) {
                continue;
            }
            if self.caches.delete_cache(&name) {
                evicted.push(name);
            }
        }
        if !evicted.is_empty() {
            tracing::info!("Evicted stale shell caches: {}", evicted.join(", "));
        }

        self.set_state(WorkerState::Activated);
        Ok(evicted)
    }

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, request: &ShellRequest) -> ShellResult<CachedResponse> {
        if request.method == Method::GET {
            if let Some(hit) = self.caches.match_any(&request.path) {
                tracing::debug!("Cache hit for {}", request.path);
                return Ok(hit);
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => Ok(response),
            Err(error) if request.is_navigation() => {
                tracing::warn!("Navigation to {} failed, serving offline page: {error}", request.path);
                Ok(self.offline_page())
            }
            Err(error) => Err(error),
        }
    }

    fn offline_page(&self) -> CachedResponse {
        self.caches
            .match_any(self.manifest.offline_path())
            .unwrap_or_else(|| {
                CachedResponse::html(StatusCode::SERVICE_UNAVAILABLE, FALLBACK_OFFLINE_PAGE)
            })
    }

    async fn precache_one(&self, path: &str) -> ShellResult<CachedResponse> {
        let response = self.network.fetch(&ShellRequest::get(path)).await?;
        if !response.is_success() {
            return Err(ShellError::BadStatus {
                path: path.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    fn transition(
        &self,
        from: WorkerState,
        to: WorkerState,
        action: &'static str,
    ) -> ShellResult<()> {
        let mut state = self.lock_state();
        if *state != from {
            return Err(ShellError::InvalidState {
                state: *state,
                action,
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, state: WorkerState) {
        *self.lock_state() = state;
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
