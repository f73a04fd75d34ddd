//! Public IPv6 address discovery
//!
//! Asks a list of "what is my IP" services in order and takes the first
//! answer that parses as an IPv6 address.

use crate::ProvisionError;
use reqwest::Client;
use serde::Serialize;
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::debug;

/// Services queried by default, in order
pub const DEFAULT_FINDERS: [&str; 3] = [
    "https://api6.ipify.org/",
    "https://www.trackip.net/ip",
    "https://ipapi.co/ip",
];

/// Per-request timeout
const FINDER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct FinderFailure {
    api: String,
    output: String,
}

/// IPv6 address finder
pub struct IpFinder {
    client: Client,
    urls: Vec<String>,
}

impl IpFinder {
    /// Finder using [`DEFAULT_FINDERS`]
    pub fn new() -> Result<Self, ProvisionError> {
        Self::with_urls(DEFAULT_FINDERS.iter().map(|u| u.to_string()).collect())
    }

    /// Finder using custom services (useful for testing)
    pub fn with_urls(urls: Vec<String>) -> Result<Self, ProvisionError> {
        let client = Client::builder().timeout(FINDER_TIMEOUT).build()?;
        Ok(Self { client, urls })
    }

    /// Discover the public IPv6 address
    pub async fn discover(&self) -> Result<Ipv6Addr, ProvisionError> {
        let mut failures = Vec::new();

        for url in &self.urls {
            let body = match self.fetch(url).await {
                Ok(body) => body,
                Err(e) => {
                    debug!("IP finder {} failed: {}", url, e);
                    failures.push(FinderFailure {
                        api: url.clone(),
                        output: e.to_string(),
                    });
                    continue;
                }
            };

            match body.trim().parse::<Ipv6Addr>() {
                Ok(ip) => {
                    debug!("IP finder {} answered {}", url, ip);
                    return Ok(ip);
                }
                Err(_) => failures.push(FinderFailure {
                    api: url.clone(),
                    output: body,
                }),
            }
        }

        Err(ProvisionError::IpDiscovery(serde_json::to_string_pretty(
            &failures,
        )?))
    }

    async fn fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client.get(url).send().await?.text().await
    }
}
