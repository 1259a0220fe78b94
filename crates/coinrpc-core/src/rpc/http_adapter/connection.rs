use std::time::Duration;

use reqwest::Url;

use crate::config::ConnConfig;
use crate::error::CoreError;

/// Build the shared HTTP client for POST mode.
///
/// Connections are not pooled: every call opens and closes its own.
pub(super) fn build_http_client(config: &ConnConfig) -> Result<reqwest::Client, CoreError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(0)
        .tcp_nodelay(true);

    builder = match parse_proxy(config)? {
        Some(proxy) => builder.proxy(proxy),
        None => builder.no_proxy(),
    };

    if !config.disable_tls {
        if let Some(pem) = config.certificates.as_deref() {
            let certs = reqwest::Certificate::from_pem_bundle(pem.as_bytes())
                .map_err(|e| CoreError::Config(format!("invalid PEM certificates: {e}")))?;
            if certs.is_empty() {
                return Err(CoreError::Config(
                    "certificates contain no PEM blocks".to_owned(),
                ));
            }
            // The configured bundle replaces the system roots.
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
    }

    builder
        .build()
        .map_err(|e| CoreError::Config(format!("build HTTP client: {e}")))
}

fn parse_proxy(config: &ConnConfig) -> Result<Option<reqwest::Proxy>, CoreError> {
    let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let parsed = Url::parse(proxy).map_err(|e| {
        CoreError::Config(format!(
            "invalid proxy `{proxy}`: expected socks5://host:port ({e})"
        ))
    })?;
    match parsed.scheme() {
        "socks5" | "socks5h" => {}
        other => {
            return Err(CoreError::Config(format!(
                "unsupported proxy scheme `{other}`; expected socks5 or socks5h"
            )))
        }
    }

    let mut proxy = reqwest::Proxy::all(parsed)
        .map_err(|e| CoreError::Config(format!("invalid proxy: {e}")))?;
    if let Some(user) = config.proxy_user.as_deref() {
        proxy = proxy.basic_auth(user, config.proxy_pass.as_deref().unwrap_or_default());
    }
    Ok(Some(proxy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_client_builds() {
        build_http_client(&ConnConfig::http_post("127.0.0.1:8332")).expect("client must build");
    }

    #[test]
    fn socks5_proxy_is_accepted() {
        let mut config = ConnConfig::http_post("127.0.0.1:8332");
        config.proxy = Some("socks5://127.0.0.1:9050".to_owned());
        config.proxy_user = Some("tor".to_owned());
        let proxy = parse_proxy(&config).expect("must parse");
        assert!(proxy.is_some());
    }

    #[test]
    fn http_proxy_scheme_is_rejected() {
        let mut config = ConnConfig::http_post("127.0.0.1:8332");
        config.proxy = Some("ftp://example.com".to_owned());
        let err = parse_proxy(&config).expect_err("must reject ftp");
        assert!(err.to_string().contains("unsupported proxy scheme"));
    }

    #[test]
    fn garbage_certificates_are_rejected() {
        let mut config = ConnConfig::http_post("127.0.0.1:8332");
        config.disable_tls = false;
        config.certificates = Some("not a certificate".to_owned());
        assert!(build_http_client(&config).is_err());
    }
}
