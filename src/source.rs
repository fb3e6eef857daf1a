//! Where card content comes from.

use std::{
    future::Future,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use reqwest::{Client, Url};

use crate::error::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves the raw document (markdown or HTML) stored at a card path.
pub trait ContentSource: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Reads cards from files under a root directory. Card `/a/b.md` is the file
/// `<root>/a/b.md`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a card path to a file, refusing anything that climbs out of the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(Error::fetch(path, "path is outside the card root"));
        }
        Ok(self.root.join(relative))
    }
}

impl ContentSource for DirectorySource {
    async fn fetch(&self, path: &str) -> Result<String> {
        let file = self.resolve(path)?;
        tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| Error::fetch(path, e))
    }
}

/// Fetches cards over HTTP: card `/a/b.md` is `GET <base_url>/a/b.md`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: Url,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            Error::Config(format!("invalid base URL '{base_url}': {e}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("deckdb/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::fetch(path, e))
    }
}

impl ContentSource for HttpSource {
    async fn fetch(&self, path: &str) -> Result<String> {
        let url = self.url_for(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::fetch(path, e))?;
        response.text().await.map_err(|e| Error::fetch(path, e))
    }
}
