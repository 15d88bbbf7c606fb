//! Remote file server access.
//!
//! The pipeline talks to the server only through [`Remote`], which reports the
//! raw HTTP status of each request. Deciding what a status means (created,
//! already there, retry, give up) is left to the provisioning and upload
//! phases. [`WebDavClient`] is the production implementation.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use reqwest::blocking::{Body, Client};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Connection settings for the WebDAV server.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Collection all buckets are created under, e.g.
    /// `https://cloud.example.com/remote.php/dav/files/alice/Photos`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification. On by default so self-signed
    /// private deployments work; this trusts any certificate presented.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

fn default_accept_invalid_certs() -> bool {
    true
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// A request that never produced an HTTP status.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("cannot read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot build URL below {0}")]
    Url(String),
}

/// Operations the pipeline needs from the file server.
pub trait Remote: Send + Sync {
    /// Create the collection at `path` (slash separated, relative to the base).
    fn create_collection(&self, path: &str) -> std::result::Result<StatusCode, RemoteError>;

    /// Store the local file as `{dir}/{file_name}`, overwriting any existing copy.
    fn put_file(
        &self,
        dir: &str,
        file_name: &str,
        local: &Path,
    ) -> std::result::Result<StatusCode, RemoteError>;
}

/// WebDAV client (MKCOL / PUT with Basic auth) over a blocking reqwest client.
pub struct WebDavClient {
    client: Client,
    base: Url,
    username: String,
    password: String,
    mkcol: Method,
}

impl WebDavClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|err| Error::Config(format!("invalid base URL {:?}: {}", config.base_url, err)))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base URL must be http(s): {}",
                config.base_url
            )));
        }
        let mkcol = Method::from_bytes(b"MKCOL").map_err(|err| Error::Config(err.to_string()))?;

        if config.accept_invalid_certs {
            warn!(url = %base, "TLS certificate verification is disabled");
        }
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            mkcol,
        })
    }

    /// Append percent-encoded segments to the base URL.
    pub fn url_for<'a, I>(&self, segments: I) -> std::result::Result<Url, RemoteError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Url(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments.into_iter().filter(|s| !s.is_empty()));
        Ok(url)
    }
}

impl Remote for WebDavClient {
    fn create_collection(&self, path: &str) -> std::result::Result<StatusCode, RemoteError> {
        let url = self.url_for(path.split('/'))?;
        let response = self
            .client
            .request(self.mkcol.clone(), url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()?;
        debug!(%url, status = %response.status(), "MKCOL");
        Ok(response.status())
    }

    fn put_file(
        &self,
        dir: &str,
        file_name: &str,
        local: &Path,
    ) -> std::result::Result<StatusCode, RemoteError> {
        let url = self.url_for(dir.split('/').chain(std::iter::once(file_name)))?;
        let file_error = |source: io::Error| RemoteError::File {
            path: local.to_path_buf(),
            source,
        };
        let file = File::open(local).map_err(file_error)?;
        let len = file.metadata().map_err(file_error)?.len();

        let response = self
            .client
            .put(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .body(Body::sized(file, len))
            .send()?;
        debug!(%url, status = %response.status(), bytes = len, "PUT");
        Ok(response.status())
    }
}
