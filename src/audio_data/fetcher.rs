use crate::error::{Result, StemflowError};
use std::io::Read;
use std::path::PathBuf;

/// First half of the asset pipeline: URL to encoded bytes.
///
/// Implementations are called from loader threads, one call per asset.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Reads assets from the local filesystem, resolving URLs relative to `root`.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = url.trim_start_matches("file://").trim_start_matches('/');
        self.root.join(path)
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.resolve(url);
        std::fs::read(&path).map_err(|e| {
            StemflowError::Fetch(format!("Failed to read {}: {}", path.display(), e))
        })
    }
}

/// Fetches assets over HTTP(S). Relative URLs are joined onto `base_url`.
pub struct HttpFetcher {
    agent: ureq::Agent,
    base_url: Option<String>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(url);
        let response = self
            .agent
            .get(&resolved)
            .call()
            .map_err(|e| StemflowError::Fetch(format!("GET {} failed: {}", resolved, e)))?;

        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
