//! Proxy-list provider for pulling a flat `ip:port` list from one endpoint

use crate::proxy::parser::ProxyParser;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default timeout for provider requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// ProxyScrape free list, plain text, one `ip:port` per line
pub const DEFAULT_PROVIDER_URL: &str = "https://api.proxyscrape.com/v4/free-proxy-list/get?request=display_proxies&proxy_format=ipport&format=text&timeout=5000";

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

/// Failure to obtain the provider list. No partial list is ever returned.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Configuration for the provider client
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// URL of the provider list
    pub url: String,
    /// Timeout for the whole request
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Honour HTTP_PROXY / HTTPS_PROXY from the environment
    pub system_proxy: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROVIDER_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            system_proxy: true,
        }
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.system_proxy = enabled;
        self
    }
}

/// Client for the bulk proxy-list provider
pub struct ProviderClient {
    config: ProviderConfig,
    client: Client,
}

impl ProviderClient {
    /// Create a provider client with default configuration
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_config(ProviderConfig::default())
    }

    /// Create a provider client with custom configuration
    pub fn with_config(config: ProviderConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Fetch the provider list as trimmed, non-blank lines
    pub async fn fetch_list(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.client.get(&self.config.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %self.config.url, status = status.as_u16(), "provider fetch rejected");
            return Err(ProviderError::Status(status.as_u16()));
        }

        let content = response.text().await?;
        let lines = parse_listing(&content);
        info!(url = %self.config.url, count = lines.len(), "fetched provider list");
        Ok(lines)
    }
}

/// Split a provider body into entries.
///
/// The body is expected to be one entry per line; when no line looks like
/// `ip:port` (an HTML error page, say) the addresses are pulled out with a
/// regex instead.
pub fn parse_listing(content: &str) -> Vec<String> {
    let lines: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if lines.iter().any(|line| ProxyParser::parse_line(line).is_some()) {
        return lines;
    }

    extract_with_regex(content)
}

/// Extract IPv4:PORT pairs embedded anywhere in the text
fn extract_with_regex(content: &str) -> Vec<String> {
    IP_PORT_REGEX
        .captures_iter(content)
        .filter_map(|cap| {
            let host = cap.get(1)?.as_str();
            let port: u16 = cap.get(2)?.as_str().parse().ok()?;

            let valid_octets = host
                .split('.')
                .all(|part| part.parse::<u32>().map_or(false, |num| num <= 255));
            if !valid_octets || port == 0 {
                return None;
            }

            Some(format!("{}:{}", host, port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, refused_addr, serve};

    #[test]
    fn test_provider_config_default() {
        let config = ProviderConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.url, DEFAULT_PROVIDER_URL);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.system_proxy);
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new()
            .with_url("http://example.com/list.txt".to_string())
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("Custom Agent".to_string());

        assert_eq!(config.url, "http://example.com/list.txt");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "Custom Agent");
    }

    #[test]
    fn test_parse_listing_plain_lines() {
        let content = "192.168.1.1:8080\r\n\r\n  10.0.0.1:3128  \n";
        assert_eq!(parse_listing(content), vec!["192.168.1.1:8080", "10.0.0.1:3128"]);
    }

    #[test]
    fn test_parse_listing_keeps_order_and_duplicates() {
        let content = "2.2.2.2:80\n1.1.1.1:80\n2.2.2.2:80\n";
        assert_eq!(parse_listing(content).len(), 3);
    }

    #[test]
    fn test_parse_listing_falls_back_to_regex() {
        let content = "<html><td>Some text with 10.0.0.1:3128 embedded</td></html>";
        assert_eq!(parse_listing(content), vec!["10.0.0.1:3128"]);
    }

    #[test]
    fn test_extract_rejects_invalid_entries() {
        assert!(extract_with_regex("Invalid IP: 999.999.999.999:8080").is_empty());
        assert!(extract_with_regex("Zero port: 192.168.1.1:0").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_list_ok() {
        let body = "1.2.3.4:80\n5.6.7.8:3128\n";
        let (addr, _requests) = serve(http_response("200 OK", body)).await;
        let client = ProviderClient::with_config(
            ProviderConfig::new()
                .with_url(format!("http://{}/list", addr))
                .with_system_proxy(false),
        )
        .unwrap();

        let lines = client.fetch_list().await.unwrap();
        assert_eq!(lines, vec!["1.2.3.4:80", "5.6.7.8:3128"]);
    }

    #[tokio::test]
    async fn test_fetch_list_non_200_is_single_error() {
        let (addr, _requests) = serve(http_response("503 Service Unavailable", "1.2.3.4:80")).await;
        let client = ProviderClient::with_config(
            ProviderConfig::new()
                .with_url(format!("http://{}/list", addr))
                .with_system_proxy(false),
        )
        .unwrap();

        match client.fetch_list().await {
            Err(ProviderError::Status(code)) => assert_eq!(code, 503),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_list_transport_error() {
        let addr = refused_addr().await;
        let client = ProviderClient::with_config(
            ProviderConfig::new()
                .with_url(format!("http://{}/list", addr))
                .with_timeout(Duration::from_secs(2))
                .with_system_proxy(false),
        )
        .unwrap();

        assert!(matches!(
            client.fetch_list().await,
            Err(ProviderError::Transport(_))
        ));
    }
}
