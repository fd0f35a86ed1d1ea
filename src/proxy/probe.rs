//! Geolocation probe: one request to the IP-info service, optionally through a proxy

use crate::proxy::geo::GeoInfo;
use crate::proxy::models::{FailureKind, ProbeOutcome, ProxyCandidate};
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default timeout for a probe in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 12;

/// Default IP-info endpoint
pub const DEFAULT_ENDPOINT: &str = "https://ipinfo.io/json";

/// Default user agent for probe requests
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Fragments of transport error messages, lowercased, by failure kind
const PROXY_MARKERS: &[&str] = &["tunnel", "proxy"];
const TLS_MARKERS: &[&str] = &["certificate", "tls", "ssl", "handshake"];
const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout"];

/// Configuration for the geolocation probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// URL of the IP-info endpoint
    pub endpoint: String,
    /// User agent for probe requests
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Anything that can look up where a request egresses from
#[async_trait]
pub trait GeoProbe: Send + Sync {
    /// Probe the service directly (`None`) or through `proxy`.
    ///
    /// Never fails: every fault is folded into the returned outcome.
    async fn probe(&self, proxy: Option<&ProxyCandidate>, timeout: Duration) -> ProbeOutcome;
}

/// Probe backed by an ipinfo.io-compatible JSON endpoint
#[derive(Debug, Clone, Default)]
pub struct IpInfoProbe {
    config: ProbeConfig,
}

impl IpInfoProbe {
    /// Create a new probe with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new probe with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Create a reqwest client routed through the proxy, or direct
    fn create_client(
        &self,
        proxy: Option<&ProxyCandidate>,
        timeout: Duration,
    ) -> reqwest::Result<Client> {
        let builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(&self.config.user_agent);

        let builder = match proxy {
            Some(candidate) => {
                let mut reqwest_proxy = ReqwestProxy::all(candidate.proxy_url())?;
                if let Some(auth) = &candidate.auth {
                    reqwest_proxy = reqwest_proxy.basic_auth(&auth.username, &auth.password);
                }
                builder.proxy(reqwest_proxy)
            }
            None => builder.no_proxy(),
        };

        builder.build()
    }

    async fn fetch(&self, client: Client, via_proxy: bool) -> Result<GeoInfo, FailureKind> {
        let response = client
            .get(&self.config.endpoint)
            .send()
            .await
            .map_err(|e| classify_error(&e, via_proxy))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FailureKind::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_error(&e, via_proxy))?;

        GeoInfo::from_json(&body)
            .map_err(|e| FailureKind::Other(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl GeoProbe for IpInfoProbe {
    async fn probe(&self, proxy: Option<&ProxyCandidate>, timeout: Duration) -> ProbeOutcome {
        let target = proxy.map_or_else(|| "direct".to_string(), ProxyCandidate::display);
        let start = Instant::now();

        let result = match self.create_client(proxy, timeout) {
            Ok(client) => {
                match tokio::time::timeout(timeout, self.fetch(client, proxy.is_some())).await {
                    Ok(result) => result,
                    Err(_) => Err(FailureKind::Timeout),
                }
            }
            Err(e) => Err(FailureKind::Other(error_chain(&e))),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(geo) => {
                debug!(%target, ip = %geo.ip, latency_ms, "probe succeeded");
                ProbeOutcome::success(geo, latency_ms)
            }
            Err(kind) => {
                debug!(%target, %kind, latency_ms, "probe failed");
                ProbeOutcome::failure(kind, latency_ms)
            }
        }
    }
}

/// Map a transport error onto a failure kind
pub(crate) fn classify_error(error: &reqwest::Error, via_proxy: bool) -> FailureKind {
    if let Some(status) = error.status() {
        return FailureKind::HttpStatus(status.as_u16());
    }

    let chain = error_chain(error);
    classify_message(&chain, error.is_timeout(), error.is_connect(), via_proxy)
}

fn classify_message(chain: &str, is_timeout: bool, is_connect: bool, via_proxy: bool) -> FailureKind {
    let lowered = chain.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| lowered.contains(m));

    if is_timeout || mentions(TIMEOUT_MARKERS) {
        FailureKind::Timeout
    } else if mentions(TLS_MARKERS) {
        FailureKind::Tls
    } else if mentions(PROXY_MARKERS) || (is_connect && via_proxy) {
        FailureKind::Proxy
    } else {
        FailureKind::Other(chain.to_string())
    }
}

/// Render an error and all of its sources on one line
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, refused_addr, serve, serve_stalled};

    const TOKYO_BODY: &str =
        r#"{"ip":"203.0.113.7","city":"Tokyo","country":"JP","timezone":"Asia/Tokyo"}"#;

    fn probe_for(endpoint: String) -> IpInfoProbe {
        IpInfoProbe::with_config(ProbeConfig::new().with_endpoint(endpoint))
    }

    fn candidate_at(addr: std::net::SocketAddr) -> ProxyCandidate {
        ProxyCandidate::new(addr.ip().to_string(), addr.port())
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.user_agent.starts_with("proxy-geotz/"));
    }

    #[test]
    fn test_probe_config_builder() {
        let config = ProbeConfig::new()
            .with_endpoint("http://example.com/json".to_string())
            .with_user_agent("Custom Agent".to_string());
        assert_eq!(config.endpoint, "http://example.com/json");
        assert_eq!(config.user_agent, "Custom Agent");
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(
            classify_message("operation timed out", false, false, true),
            FailureKind::Timeout
        );
        assert_eq!(
            classify_message("invalid peer certificate: UnknownIssuer", false, false, false),
            FailureKind::Tls
        );
        assert_eq!(
            classify_message("unsuccessful tunnel", false, false, true),
            FailureKind::Proxy
        );
        assert_eq!(
            classify_message("tcp connect error: Connection refused", false, true, true),
            FailureKind::Proxy
        );
        assert_eq!(
            classify_message("tcp connect error: Connection refused", false, true, false),
            FailureKind::Other("tcp connect error: Connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn test_direct_probe_success() {
        let (addr, mut requests) = serve(http_response("200 OK", TOKYO_BODY)).await;
        let probe = probe_for(format!("http://{}/json", addr));

        let outcome = probe.probe(None, Duration::from_secs(5)).await;
        match outcome {
            ProbeOutcome::Success { geo, .. } => {
                assert_eq!(geo, GeoInfo::new("203.0.113.7", "JP", "Asia/Tokyo"));
            }
            other => panic!("expected success, got {:?}", other),
        }

        let head = requests.recv().await.unwrap();
        assert!(head.starts_with("GET /json HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_probe_through_proxy_sends_credentials() {
        let (addr, mut requests) = serve(http_response("200 OK", TOKYO_BODY)).await;
        let probe = probe_for("http://geo.test/json".to_string());
        let proxy = ProxyCandidate::with_auth(
            addr.ip().to_string(),
            addr.port(),
            "user".to_string(),
            "pa:ss".to_string(),
        );

        let outcome = probe.probe(Some(&proxy), Duration::from_secs(5)).await;
        assert!(outcome.is_success());

        let head = requests.recv().await.unwrap();
        assert!(head.starts_with("GET http://geo.test/json HTTP/1.1"));
        assert!(head.to_lowercase().contains("proxy-authorization: basic"));
    }

    #[tokio::test]
    async fn test_missing_fields_still_succeed() {
        let (addr, _requests) = serve(http_response("200 OK", r#"{"ip":"198.51.100.2"}"#)).await;
        let probe = probe_for(format!("http://{}/json", addr));

        match probe.probe(None, Duration::from_secs(5)).await {
            ProbeOutcome::Success { geo, .. } => {
                assert_eq!(geo.ip, "198.51.100.2");
                assert_eq!(geo.country, "-");
                assert_eq!(geo.timezone, "-");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_proxy_auth_required_is_http_status() {
        let (addr, _requests) =
            serve(http_response("407 Proxy Authentication Required", "")).await;
        let probe = probe_for("http://geo.test/json".to_string());

        let outcome = probe.probe(Some(&candidate_at(addr)), Duration::from_secs(5)).await;
        match outcome {
            ProbeOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::HttpStatus(407)),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_other_failure() {
        let (addr, _requests) = serve(http_response("200 OK", "<html>captcha</html>")).await;
        let probe = probe_for(format!("http://{}/json", addr));

        match probe.probe(None, Duration::from_secs(5)).await {
            ProbeOutcome::Failure { kind: FailureKind::Other(detail), .. } => {
                assert!(detail.contains("invalid response body"));
            }
            other => panic!("expected other failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refused_proxy_is_proxy_error() {
        let addr = refused_addr().await;
        let probe = probe_for("http://geo.test/json".to_string());

        let outcome = probe.probe(Some(&candidate_at(addr)), Duration::from_secs(5)).await;
        match outcome {
            ProbeOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Proxy),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_server_times_out_with_latency() {
        let addr = serve_stalled().await;
        let probe = probe_for(format!("http://{}/json", addr));
        let timeout = Duration::from_millis(300);

        let outcome = probe.probe(None, timeout).await;
        match outcome {
            ProbeOutcome::Failure { kind, latency_ms } => {
                assert_eq!(kind, FailureKind::Timeout);
                assert!(latency_ms >= 250, "latency {}ms", latency_ms);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
