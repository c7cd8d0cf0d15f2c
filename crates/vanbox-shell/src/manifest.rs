//! Versioned list of the assets that make up the app shell.

/// Current shell version. Bumping it evicts every older cache on activation.
pub const SHELL_VERSION: &str = "v1";

/// Page served to navigations when the network is gone.
pub const OFFLINE_PATH: &str = "/offline.html";

const CACHE_PREFIX: &str = "vanbox-";

const PRECACHE_PATHS: &[&str] = &[
    "/",
    "/login",
    "/manifest.json",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
    "/icons/maskable-icon.png",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellManifest {
    version: String,
    precache: Vec<String>,
    offline_path: String,
}

impl Default for ShellManifest {
    fn default() -> Self {
        Self::new(SHELL_VERSION)
    }
}

impl ShellManifest {
    /// Default asset list under the given version tag.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            precache: PRECACHE_PATHS.iter().map(|path| (*path).to_string()).collect(),
            offline_path: OFFLINE_PATH.to_string(),
        }
    }

    /// Replace the asset list. The offline page is always precached.
    #[must_use]
    pub fn with_precache<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.precache = paths.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_offline_path(mut self, path: impl Into<String>) -> Self {
        self.offline_path = path.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cache_name(&self) -> String {
        format!("{CACHE_PREFIX}{}", self.version)
    }

    pub fn offline_path(&self) -> &str {
        &self.offline_path
    }

    /// Every path fetched at install time, offline page last.
    pub fn precache_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::with_capacity(self.precache.len() + 1);
        for path in &self.precache {
            if !paths.contains(&path.as_str()) {
                paths.push(path);
            }
        }
        if !paths.contains(&self.offline_path.as_str()) {
            paths.push(&self.offline_path);
        }
        paths
    }

    pub fn is_current(&self, cache_name: &str) -> bool {
        cache_name == self.cache_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_manifest() {
        let manifest = ShellManifest::default();
        assert_eq!(manifest.version(), "v1");
        assert_eq!(manifest.cache_name(), "vanbox-v1");
        assert_eq!(
            manifest.precache_paths(),
            vec![
                "/",
                "/login",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
                "/icons/maskable-icon.png",
                "/offline.html",
            ]
        );
    }

    #[test]
    fn offline_page_is_always_precached_once() {
        let manifest = ShellManifest::new("v2").with_precache(["/", "/offline.html", "/"]);
        assert_eq!(manifest.precache_paths(), vec!["/", "/offline.html"]);

        let manifest = ShellManifest::new("v2").with_precache(Vec::<String>::new());
        assert_eq!(manifest.precache_paths(), vec!["/offline.html"]);
    }

    #[test]
    fn only_own_cache_is_current() {
        let manifest = ShellManifest::new("v2");
        assert!(manifest.is_current("vanbox-v2"));
        assert!(!manifest.is_current("vanbox-v1"));
        assert!(!manifest.is_current("other"));
    }
}
