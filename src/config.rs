use std::env;
use std::time::Duration;

use crate::errors::AdapterError;

/// Connection settings for a Nextcloud server.
///
/// `webdav_url` is the full WebDAV endpoint the credential supplies, e.g.
/// `https://cloud.example.com/remote.php/webdav`. OCS endpoints live on the
/// server root, which is derived by dropping the DAV mount suffix.
#[derive(Debug, Clone)]
pub struct NextcloudConfig {
    pub webdav_url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
}

impl NextcloudConfig {
    pub fn new(
        webdav_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            webdav_url: webdav_url.into(),
            username: username.into(),
            password: password.into(),
            timeout_seconds: 30,
        }
    }

    /// Reads the configuration from environment variables (a `.env` file is
    /// honored when present).
    pub fn from_env() -> Result<Self, AdapterError> {
        dotenvy::dotenv().ok();

        let require = |name: &str| {
            env::var(name).map_err(|_| AdapterError::Config(format!("{} must be set", name)))
        };

        Ok(Self {
            webdav_url: require("NEXTCLOUD_WEBDAV_URL")?,
            username: require("NEXTCLOUD_USERNAME")?,
            password: require("NEXTCLOUD_PASSWORD")?,
            timeout_seconds: env::var("NEXTCLOUD_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.webdav_url.is_empty() {
            return Err(AdapterError::Config("WebDAV URL cannot be empty".into()));
        }
        if !self.webdav_url.starts_with("http://") && !self.webdav_url.starts_with("https://") {
            return Err(AdapterError::Config(
                "WebDAV URL must start with http:// or https://".into(),
            ));
        }
        if self.username.is_empty() {
            return Err(AdapterError::Config("username cannot be empty".into()));
        }
        if self.password.is_empty() {
            return Err(AdapterError::Config("password cannot be empty".into()));
        }
        Ok(())
    }

    /// Base WebDAV URL with at most one trailing slash stripped; request
    /// paths always supply their own leading slash.
    pub fn webdav_base(&self) -> &str {
        self.webdav_url
            .strip_suffix('/')
            .unwrap_or(&self.webdav_url)
    }

    /// Full URL for a WebDAV path. The path is expected to be already
    /// URI-encoded.
    pub fn webdav_url_for(&self, path: &str) -> String {
        format!("{}/{}", self.webdav_base(), path.trim_start_matches('/'))
    }

    /// Server root for OCS endpoints: the WebDAV URL minus its DAV mount
    /// suffix. Both the classic `/remote.php/webdav` mount and the newer
    /// `/remote.php/dav/files/<user>` one are recognized.
    pub fn server_root(&self) -> &str {
        let base = self.webdav_base();
        if let Some(pos) = base.find("/remote.php/dav/files/") {
            &base[..pos]
        } else if let Some(pos) = base.find("/remote.php/webdav") {
            &base[..pos]
        } else {
            base
        }
    }

    pub fn ocs_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.server_root(), endpoint)
    }

    /// Path component of the WebDAV mount, used to relativize the hrefs a
    /// PROPFIND listing returns. For the classic mount this is
    /// `/remote.php/webdav`.
    pub fn webdav_mount_path(&self) -> String {
        url::Url::parse(self.webdav_base())
            .map(|u| u.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
