//! Third-party package pre-fetching.
//!
//! Packages named by `require` but not present in the provided file map are
//! fetched from a module CDN exactly once per run, *before* the entry script
//! executes. Fetch progress is logged through the host; an individual
//! failure does not abort the run — the package simply stays unavailable and
//! surfaces as "module not found" only if actually required.

use rover_core::{LogKind, RunHost};
use std::collections::HashMap;
use std::sync::Arc;

/// Where package sources come from. Implementations are blocking; the
/// engine moves them off the event loop with `spawn_blocking`.
pub trait PackageSource: Send + Sync {
    /// Fetches the Lua source of `name`.
    ///
    /// # Errors
    ///
    /// A human-readable description of why the package is unavailable.
    fn fetch(&self, name: &str) -> Result<String, String>;
}

/// Default CDN base URL for package resolution.
pub const DEFAULT_CDN_BASE: &str = "https://unpkg.com";

/// Fetches `{base}/{name}/init.lua` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPackageSource {
    base: String,
    agent: ureq::Agent,
}

impl HttpPackageSource {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            agent: ureq::Agent::new(),
        }
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}/init.lua", self.base.trim_end_matches('/'), name)
    }
}

impl Default for HttpPackageSource {
    fn default() -> Self {
        Self::new(DEFAULT_CDN_BASE)
    }
}

impl PackageSource for HttpPackageSource {
    fn fetch(&self, name: &str) -> Result<String, String> {
        let url = self.url(name);
        tracing::debug!(%url, "fetching package");
        let response = self.agent.get(&url).call().map_err(|e| e.to_string())?;
        response.into_string().map_err(|e| e.to_string())
    }
}

/// In-memory source for tests and offline runs.
#[derive(Debug, Default, Clone)]
pub struct StaticPackageSource {
    modules: HashMap<String, String>,
}

impl StaticPackageSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(name.into(), source.into());
        self
    }
}

impl PackageSource for StaticPackageSource {
    fn fetch(&self, name: &str) -> Result<String, String> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| format!("package '{name}' not in static source"))
    }
}

/// Fetches every named package, tolerating individual failures.
///
/// Returns the sources that succeeded; failures are logged and dropped.
pub async fn prefetch(
    names: &[String],
    source: Arc<dyn PackageSource>,
    host: &dyn RunHost,
) -> HashMap<String, String> {
    let mut fetched = HashMap::new();
    for name in names {
        host.log(LogKind::User, &format!("fetching package '{name}'..."));
        let src = Arc::clone(&source);
        let spec = name.clone();
        let result = tokio::task::spawn_blocking(move || src.fetch(&spec)).await;
        match result {
            Ok(Ok(text)) => {
                host.log(LogKind::User, &format!("fetched package '{name}'"));
                fetched.insert(name.clone(), text);
            }
            Ok(Err(reason)) => {
                tracing::warn!(package = %name, %reason, "package fetch failed");
                host.log(
                    LogKind::User,
                    &format!("failed to fetch package '{name}': {reason}"),
                );
            }
            Err(join_err) => {
                tracing::warn!(package = %name, error = %join_err, "package fetch task failed");
                host.log(LogKind::User, &format!("failed to fetch package '{name}'"));
            }
        }
    }
    fetched
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_core::testing::RecordingHost;

    #[tokio::test]
    async fn prefetch_tolerates_individual_failures() {
        let source = Arc::new(
            StaticPackageSource::new().with("inspect", "return function(v) return tostring(v) end"),
        );
        let host = RecordingHost::new();

        let fetched = prefetch(
            &["inspect".to_string(), "missing".to_string()],
            source,
            &host,
        )
        .await;

        assert!(fetched.contains_key("inspect"));
        assert!(!fetched.contains_key("missing"));
        assert!(host.logged("fetched package 'inspect'"));
        assert!(host.logged("failed to fetch package 'missing'"));
    }

    #[test]
    fn http_source_builds_cdn_urls() {
        let source = HttpPackageSource::new("https://cdn.example/");
        assert_eq!(source.url("dkjson"), "https://cdn.example/dkjson/init.lua");
    }
}
