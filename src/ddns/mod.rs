//! Dynamic DNS updates over IPv6
//!
//! Publishes the machine's public IPv6 address as `AAAA` records. Each host
//! is reconciled independently: a matching record is left alone, a stale one
//! is updated in place, and a missing one is created.

pub mod cloudflare;
pub mod hosts;
pub mod ipv6;
pub mod mock;

pub use cloudflare::CloudflareClient;
pub use ipv6::IpFinder;

use crate::ProvisionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use tracing::{debug, info, warn};

/// Record type managed by the agent
pub const AAAA: &str = "AAAA";

/// TTL for newly created records, in seconds
pub const CREATED_RECORD_TTL: u32 = 60;

/// A DNS zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// A DNS record as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl DnsRecord {
    /// Whether the record already points at `ip`
    pub fn points_to(&self, ip: &Ipv6Addr) -> bool {
        self.content
            .parse::<Ipv6Addr>()
            .map(|current| current == *ip)
            .unwrap_or(false)
    }
}

/// Body for creating or replacing a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl RecordRequest {
    /// Replacement for an existing record, keeping its proxied state
    pub fn update(name: &str, ip: &Ipv6Addr, proxied: bool) -> Self {
        Self {
            name: name.to_string(),
            record_type: AAAA.to_string(),
            content: ip.to_string(),
            proxied: Some(proxied),
            ttl: None,
        }
    }

    /// New record with the short DDNS TTL
    pub fn create(name: &str, ip: &Ipv6Addr) -> Self {
        Self {
            name: name.to_string(),
            record_type: AAAA.to_string(),
            content: ip.to_string(),
            proxied: None,
            ttl: Some(CREATED_RECORD_TTL),
        }
    }
}

/// Result of reconciling one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Record already pointed at the address
    Unchanged,
    /// Record was changed from the previous content
    Updated { from: String },
    /// No record existed and one was created
    Created,
}

impl std::fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateOutcome::Unchanged => write!(f, "UNCHANGED"),
            UpdateOutcome::Updated { from } => write!(f, "UPDATED (from {})", from),
            UpdateOutcome::Created => write!(f, "CREATED"),
        }
    }
}

/// Trait for DNS providers
///
/// Cloudflare is the production implementation; tests use
/// [`mock::MockDnsProvider`].
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Name of this provider (e.g., "Cloudflare")
    fn name(&self) -> &'static str;

    /// Zones matching a name
    async fn find_zones(&self, name: &str) -> Result<Vec<Zone>, ProvisionError>;

    /// Look up a zone by identifier
    async fn get_zone(&self, zone_id: &str) -> Result<Zone, ProvisionError>;

    /// All `AAAA` records for a name
    async fn list_aaaa(&self, zone_id: &str, name: &str) -> Result<Vec<DnsRecord>, ProvisionError>;

    /// Replace an existing record
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &RecordRequest,
    ) -> Result<DnsRecord, ProvisionError>;

    /// Create a new record
    async fn create_record(
        &self,
        zone_id: &str,
        record: &RecordRequest,
    ) -> Result<DnsRecord, ProvisionError>;
}

/// Resolve a zone name to its identifier; exactly one zone must match
pub async fn resolve_zone(dns: &dyn DnsProvider, zone_name: &str) -> Result<String, ProvisionError> {
    let zones = dns.find_zones(zone_name).await?;
    match zones.as_slice() {
        [] => Err(ProvisionError::dns(zone_name, "zone not found")),
        [zone] => {
            debug!("Zone {} has id {}", zone_name, zone.id);
            Ok(zone.id.clone())
        }
        _ => Err(ProvisionError::dns(
            zone_name,
            format!("api call returned {} items", zones.len()),
        )),
    }
}

/// Bring the `AAAA` records of one host in line with `ip`
pub async fn reconcile_host(
    dns: &dyn DnsProvider,
    zone_id: &str,
    name: &str,
    ip: &Ipv6Addr,
) -> Result<UpdateOutcome, ProvisionError> {
    let records = dns.list_aaaa(zone_id, name).await?;

    let mut outcome = None;
    for record in &records {
        if record.points_to(ip) {
            info!("UNCHANGED: {} {}", name, ip);
            outcome.get_or_insert(UpdateOutcome::Unchanged);
            continue;
        }

        dns.update_record(zone_id, &record.id, &RecordRequest::update(name, ip, record.proxied))
            .await?;
        verify(dns, zone_id, name, ip, "Record was not updated").await?;

        info!("UPDATED: {} {} -> {}", name, record.content, ip);
        outcome = Some(UpdateOutcome::Updated {
            from: record.content.clone(),
        });
    }

    if let Some(outcome) = outcome {
        return Ok(outcome);
    }

    dns.create_record(zone_id, &RecordRequest::create(name, ip)).await?;
    verify(dns, zone_id, name, ip, "Record was not created").await?;

    info!("CREATED: {} {}", name, ip);
    Ok(UpdateOutcome::Created)
}

async fn verify(
    dns: &dyn DnsProvider,
    zone_id: &str,
    name: &str,
    ip: &Ipv6Addr,
    failure: &str,
) -> Result<(), ProvisionError> {
    let records = dns.list_aaaa(zone_id, name).await?;
    match records.first() {
        Some(record) if record.points_to(ip) => Ok(()),
        _ => Err(ProvisionError::dns(name, failure)),
    }
}

/// Updates a set of hosts to the machine's current IPv6 address
pub struct DdnsAgent<'a> {
    dns: &'a dyn DnsProvider,
    finder: &'a IpFinder,
}

impl<'a> DdnsAgent<'a> {
    pub fn new(dns: &'a dyn DnsProvider, finder: &'a IpFinder) -> Self {
        Self { dns, finder }
    }

    /// Reconcile every host, continuing past per-host failures
    ///
    /// All hosts share the zone of the first one.
    pub async fn run(&self, hosts: &[String]) -> Result<Vec<(String, UpdateOutcome)>, ProvisionError> {
        let Some(first) = hosts.first() else {
            return Err(ProvisionError::Config(
                "No DDNS Host specified or set to a proper FQDN".to_string(),
            ));
        };

        let ip = self.finder.discover().await?;
        info!("MY IP: {}", ip);
        info!("HOSTS TO UPDATE: {:?}", hosts);

        let zone_name = hosts::zone_name(first);
        let zone_id = resolve_zone(self.dns, &zone_name).await?;

        let mut outcomes = Vec::new();
        let mut errors = Vec::new();
        for host in hosts {
            match reconcile_host(self.dns, &zone_id, host, &ip).await {
                Ok(outcome) => outcomes.push((host.clone(), outcome)),
                Err(e) => {
                    warn!("Failed to update {}: {}", host, e);
                    errors.push(format!("Error Updating {}: {}", host, e));
                }
            }
        }

        if !errors.is_empty() {
            return Err(ProvisionError::UpdateFailed(errors));
        }

        Ok(outcomes)
    }
}
