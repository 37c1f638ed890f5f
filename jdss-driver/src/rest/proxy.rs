//! HTTP transport against the appliance REST tree.
//!
//! Keeps an ordered host list and a sticky active-host index. Each logical
//! request is tried against the active host first; connection-level failures
//! rotate to the next host. When every host has failed for a single logical
//! call the transport reports `CommunicationFailure`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ErrorEnvelope, RestResponse};
use crate::config::JdssConfig;
use crate::error::{JdssError, Result};

/// REST tree mount point on the appliance.
const API_BASE: &str = "/api/v3";

pub struct RestProxy {
    client: Client,
    hosts: Vec<String>,
    port: u16,
    protocol: String,
    login: String,
    password: String,
    pool: String,
    active: AtomicUsize,
}

impl RestProxy {
    pub fn new(cfg: &JdssConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.rest_timeout_secs))
            .danger_accept_invalid_certs(!cfg.tls_verify)
            .build()
            .map_err(|e| JdssError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            hosts: cfg.san_hosts.clone(),
            port: cfg.san_api_port,
            protocol: cfg.jovian_rest_protocol.clone(),
            login: cfg.san_login.clone(),
            password: cfg.san_password.clone(),
            pool: cfg.jovian_pool.clone(),
            active: AtomicUsize::new(0),
        })
    }

    /// Address of the host the transport currently talks to.
    pub fn active_host(&self) -> &str {
        &self.hosts[self.active.load(Ordering::Relaxed) % self.hosts.len()]
    }

    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    fn url(&self, host: &str, path: &str) -> String {
        format!(
            "{proto}://{host}:{port}{API_BASE}{path}",
            proto = self.protocol,
            port = self.port
        )
    }

    /// Issue a request relative to the API root.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse> {
        let nhosts = self.hosts.len();
        let start = self.active.load(Ordering::Relaxed);

        for attempt in 0..nhosts {
            let idx = (start + attempt) % nhosts;
            let host = &self.hosts[idx];
            let url = self.url(host, path);
            debug!(%method, %url, "rest request");

            let mut req = self
                .client
                .request(method.clone(), &url)
                .basic_auth(&self.login, Some(&self.password));
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) => {
                    self.active.store(idx, Ordering::Relaxed);
                    return Ok(Self::decode(resp).await);
                }
                Err(err) if is_transport_error(&err) => {
                    warn!(host = %host, error = %err, "host unreachable, rotating");
                    continue;
                }
                Err(err) => {
                    warn!(host = %host, error = %err, "request failed");
                    continue;
                }
            }
        }

        Err(JdssError::CommunicationFailure {
            hosts: self.hosts.clone(),
            path: path.to_string(),
        })
    }

    /// Issue a request relative to `/pools/<pool>`.
    pub async fn pool_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse> {
        let full = format!("/pools/{}{}", self.pool, path);
        self.request(method, &full, body).await
    }

    async fn decode(resp: reqwest::Response) -> RestResponse {
        let code = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        if text.is_empty() {
            return RestResponse {
                code,
                error: synthetic_error(code, ""),
                data: None,
            };
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                let error = body
                    .get("error")
                    .filter(|e| !e.is_null())
                    .and_then(|e| serde_json::from_value::<ErrorEnvelope>(e.clone()).ok());
                let data = body.get("data").filter(|d| !d.is_null()).cloned();
                RestResponse { code, error, data }
            }
            Err(_) => RestResponse {
                code,
                error: synthetic_error(code, &text),
                data: None,
            },
        }
    }
}

/// For non-JSON failures (proxies, firmware panics) synthesize an envelope
/// so the classifier still sees the status and body text.
fn synthetic_error(code: u16, text: &str) -> Option<ErrorEnvelope> {
    if (200..300).contains(&code) {
        return None;
    }
    Some(ErrorEnvelope {
        class: Some(
            StatusCode::from_u16(code)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| code.to_string()),
        ),
        code: None,
        errno: None,
        message: if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        },
    })
}

fn is_transport_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> RestProxy {
        let mut cfg = JdssConfig::default();
        cfg.san_hosts = vec!["172.16.0.220".into(), "172.16.0.221".into()];
        cfg.san_api_port = 82;
        cfg.jovian_pool = "Pool-2".into();
        RestProxy::new(&cfg).unwrap()
    }

    #[test]
    fn test_url_building() {
        let p = proxy();
        assert_eq!(
            p.url("172.16.0.220", "/pools/Pool-2/volumes"),
            "https://172.16.0.220:82/api/v3/pools/Pool-2/volumes"
        );
    }

    #[test]
    fn test_active_host_starts_first() {
        let p = proxy();
        assert_eq!(p.active_host(), "172.16.0.220");
    }

    #[test]
    fn test_synthetic_error_only_on_failure() {
        assert!(synthetic_error(204, "").is_none());
        let env = synthetic_error(502, "Bad Gateway").unwrap();
        assert_eq!(env.message.as_deref(), Some("Bad Gateway"));
    }
}
