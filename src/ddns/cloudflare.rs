//! Cloudflare v4 API client
//!
//! Only the zone and DNS record endpoints the DDNS agent needs. Every
//! response is wrapped in Cloudflare's `{success, errors, result}` envelope.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AAAA, DnsProvider, DnsRecord, RecordRequest, Zone};
use crate::ProvisionError;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

/// Cloudflare DNS provider
pub struct CloudflareClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl CloudflareClient {
    /// Client against the public API
    pub fn new(token: Option<String>) -> Result<Self, ProvisionError> {
        Self::with_base_url(CLOUDFLARE_API_URL, token)
    }

    /// Client against a custom base URL (useful for testing)
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        match &token {
            Some(token) => debug!("CLOUDFLARE_API_TOKEN: length {}", token.len()),
            None => warn!("CLOUDFLARE_API_TOKEN not set, requests will be unauthenticated"),
        }

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ProvisionError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            ProvisionError::dns(what, format!("{} - unreadable response: {}", status, e))
        })?;

        if !envelope.success {
            let errors: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} {}", e.code, e.message))
                .collect();
            return Err(ProvisionError::dns(
                what,
                format!("{} - api call failed: {}", status, errors.join("; ")),
            ));
        }

        envelope
            .result
            .ok_or_else(|| ProvisionError::dns(what, "api call returned no result"))
    }
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    fn name(&self) -> &'static str {
        "Cloudflare"
    }

    async fn find_zones(&self, name: &str) -> Result<Vec<Zone>, ProvisionError> {
        let request = self.client.get(self.url("/zones")).query(&[("name", name)]);
        self.send(request, name).await
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Zone, ProvisionError> {
        let request = self.client.get(self.url(&format!("/zones/{}", zone_id)));
        self.send(request, zone_id).await
    }

    async fn list_aaaa(&self, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>, ProvisionError> {
        let request = self
            .client
            .get(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .query(&[("name", name), ("match", "all"), ("type", AAAA)]);
        self.send(request, name).await
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordRequest,
    ) -> Result<DnsRecord, ProvisionError> {
        let request = self
            .client
            .put(self.url(&format!("/zones/{}/dns_records/{}", zone_id, record_id)))
            .json(record);
        self.send(request, &record.name).await
    }

    async fn create_record(
        &self,
        zone_id: &str,
        record: &RecordRequest,
    ) -> Result<DnsRecord, ProvisionError> {
        let request = self
            .client
            .post(self.url(&format!("/zones/{}/dns_records", zone_id)))
            .json(record);
        self.send(request, &record.name).await
    }
}
