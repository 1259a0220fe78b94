//! Connection configuration consumed by [`Client`](crate::rpc::Client).

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::error::CoreError;

/// Default streaming endpoint path on the node (`<host>/ws`).
pub const DEFAULT_ENDPOINT: &str = "ws";

/// Connection parameters for a node.
///
/// `host` is `address:port`, optionally followed by a path
/// (`127.0.0.1:8332/wallet/main`). The scheme is derived from `disable_tls`
/// and the transport mode, never taken from `host`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnConfig {
    pub host: String,
    /// Streaming endpoint path, only used in persistent mode.
    pub endpoint: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Bitcoin Core `.cookie` file (`username:password`). Explicit
    /// `user`/`pass` take precedence.
    pub cookie_file: Option<PathBuf>,
    pub disable_tls: bool,
    /// PEM-encoded certificate chain trusted for TLS. Ignored when TLS is
    /// disabled.
    pub certificates: Option<String>,
    /// SOCKS5 proxy, e.g. `socks5://127.0.0.1:9050`.
    pub proxy: Option<String>,
    pub proxy_user: Option<String>,
    pub proxy_pass: Option<String>,
    pub disable_auto_reconnect: bool,
    /// Issue each call as an independent HTTP POST instead of using a
    /// persistent connection. Notifications are only available in
    /// persistent mode.
    pub http_post_mode: bool,
    /// Compatibility toggle for blockchain.info style endpoints, handed to
    /// the stream connector through [`StreamHandshake`].
    pub enable_bcinfo_hacks: bool,
    /// Number of background tasks servicing the HTTP POST queue.
    pub http_workers: usize,
    /// Optional cap on outbound HTTP POSTs per second.
    pub requests_per_second: Option<u32>,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            user: None,
            pass: None,
            cookie_file: None,
            disable_tls: false,
            certificates: None,
            proxy: None,
            proxy_user: None,
            proxy_pass: None,
            disable_auto_reconnect: false,
            http_post_mode: false,
            enable_bcinfo_hacks: false,
            http_workers: 1,
            requests_per_second: None,
        }
    }
}

/// What an external stream connector needs to open the persistent
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandshake {
    pub url: String,
    /// Value for the `Authorization` header, if credentials are configured.
    pub authorization: Option<String>,
    pub enable_bcinfo_hacks: bool,
}

impl ConnConfig {
    /// HTTP POST mode configuration for `host`, with TLS disabled as Bitcoin
    /// Core serves plain HTTP by default.
    pub fn http_post(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http_post_mode: true,
            disable_tls: true,
            ..Self::default()
        }
    }

    /// Persistent-connection configuration for `host`.
    pub fn persistent(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }

    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    pub fn with_http_workers(mut self, workers: usize) -> Self {
        self.http_workers = workers;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.disable_auto_reconnect = !enabled;
        self
    }

    /// Check the fields that can be rejected without touching the network.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::Config("host must not be empty".to_owned()));
        }
        if self.host.contains("://") {
            return Err(CoreError::Config(format!(
                "host `{}` must not include a scheme; use disable_tls to pick http",
                self.host
            )));
        }
        if self.http_post_mode && self.http_workers == 0 {
            return Err(CoreError::Config(
                "http_workers must be at least 1".to_owned(),
            ));
        }
        if self.requests_per_second == Some(0) {
            return Err(CoreError::Config(
                "requests_per_second must be at least 1".to_owned(),
            ));
        }
        match (&self.user, &self.pass) {
            (Some(_), None) | (None, Some(_)) => Err(CoreError::Config(
                "both rpc user and rpc pass must be set together".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    /// URL for HTTP POST calls.
    pub fn http_url(&self) -> String {
        let scheme = if self.disable_tls { "http" } else { "https" };
        format!("{scheme}://{}", self.host)
    }

    /// URL of the streaming endpoint.
    pub fn stream_url(&self) -> Result<String, CoreError> {
        let endpoint = self.endpoint.trim_matches('/');
        if endpoint.is_empty() {
            return Err(CoreError::InvalidEndpoint);
        }
        let scheme = if self.disable_tls { "ws" } else { "wss" };
        Ok(format!("{scheme}://{}/{endpoint}", self.host))
    }

    /// Resolve credentials: explicit user/pass, then cookie file, then none.
    pub fn resolve_auth(&self) -> Result<Option<(String, String)>, CoreError> {
        resolve_auth(
            self.user.as_deref(),
            self.pass.as_deref(),
            self.cookie_file.as_deref(),
        )
    }

    pub fn stream_handshake(&self) -> Result<StreamHandshake, CoreError> {
        let authorization = self
            .resolve_auth()?
            .map(|(user, pass)| format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))));
        Ok(StreamHandshake {
            url: self.stream_url()?,
            authorization,
            enable_bcinfo_hacks: self.enable_bcinfo_hacks,
        })
    }
}

pub(crate) fn resolve_auth(
    user: Option<&str>,
    pass: Option<&str>,
    cookie_file: Option<&Path>,
) -> Result<Option<(String, String)>, CoreError> {
    match (user, pass) {
        (Some(u), Some(p)) => return Ok(Some((u.to_owned(), p.to_owned()))),
        (Some(_), None) | (None, Some(_)) => {
            return Err(CoreError::Config(
                "both rpc user and rpc pass must be set together".to_owned(),
            ));
        }
        (None, None) => {}
    }

    let Some(cookie_file) = cookie_file else {
        return Ok(None);
    };

    let content = std::fs::read_to_string(cookie_file).map_err(|e| {
        CoreError::Config(format!(
            "failed to read rpc cookie file {}: {e}",
            cookie_file.display()
        ))
    })?;
    let line = content
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| {
            CoreError::Config(format!(
                "rpc cookie file {} is empty",
                cookie_file.display()
            ))
        })?;

    let (cookie_user, cookie_pass) = line.split_once(':').ok_or_else(|| {
        CoreError::Config(format!(
            "rpc cookie file {} must contain `username:password`",
            cookie_file.display()
        ))
    })?;
    if cookie_user.is_empty() || cookie_pass.is_empty() {
        return Err(CoreError::Config(format!(
            "rpc cookie file {} must contain non-empty `username:password`",
            cookie_file.display()
        )));
    }

    Ok(Some((cookie_user.to_owned(), cookie_pass.to_owned())))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn http_url_follows_tls_flag() {
        let mut config = ConnConfig::http_post("127.0.0.1:8332");
        assert_eq!(config.http_url(), "http://127.0.0.1:8332");
        config.disable_tls = false;
        assert_eq!(config.http_url(), "https://127.0.0.1:8332");
    }

    #[test]
    fn stream_url_requires_endpoint() {
        let mut config = ConnConfig::persistent("node.example:8334");
        assert_eq!(
            config.stream_url().expect("default endpoint is valid"),
            "wss://node.example:8334/ws"
        );
        config.endpoint = "/".to_owned();
        assert!(matches!(config.stream_url(), Err(CoreError::InvalidEndpoint)));
    }

    #[test]
    fn validate_rejects_scheme_in_host() {
        let err = ConnConfig::http_post("http://127.0.0.1:8332")
            .validate()
            .expect_err("must reject scheme");
        assert!(err.to_string().contains("must not include a scheme"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let err = ConnConfig::http_post("127.0.0.1:8332")
            .with_http_workers(0)
            .validate()
            .expect_err("must reject zero workers");
        assert!(err.to_string().contains("http_workers"));
    }

    #[test]
    fn validate_rejects_zero_rate_limit() {
        let mut config = ConnConfig::http_post("127.0.0.1:8332");
        config.requests_per_second = Some(0);
        let err = config.validate().expect_err("must reject a zero rate");
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("requests_per_second"));

        config.requests_per_second = Some(1);
        config.validate().expect("one request per second is valid");
    }

    #[test]
    fn resolve_auth_rejects_partial_credentials() {
        let err = resolve_auth(Some("user"), None, None).expect_err("must reject partial auth");
        assert!(err.to_string().contains("must be set together"));
    }

    #[test]
    fn resolve_auth_prefers_explicit_credentials() {
        let auth = resolve_auth(Some("alice"), Some("secret"), Some(Path::new("/nonexistent")))
            .expect("auth must parse");
        assert_eq!(auth, Some(("alice".to_owned(), "secret".to_owned())));
    }

    #[test]
    fn resolve_auth_reads_cookie_file() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time must be after unix epoch")
            .as_nanos();
        let cookie_path = std::env::temp_dir().join(format!("coinrpc-cookie-{unique}.txt"));
        fs::write(&cookie_path, "__cookie__:token\n").expect("cookie file must be writable");

        let auth = resolve_auth(None, None, Some(&cookie_path)).expect("cookie must parse");
        assert_eq!(auth, Some(("__cookie__".to_owned(), "token".to_owned())));

        let _ = fs::remove_file(cookie_path);
    }

    #[test]
    fn handshake_carries_basic_auth_and_compat_flag() {
        let mut config = ConnConfig::persistent("127.0.0.1:8334").with_credentials("user", "pass");
        config.enable_bcinfo_hacks = true;
        let handshake = config.stream_handshake().expect("handshake must build");
        assert_eq!(handshake.authorization.as_deref(), Some("Basic dXNlcjpwYXNz"));
        assert!(handshake.enable_bcinfo_hacks);
    }
}
